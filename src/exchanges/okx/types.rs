use serde::{Deserialize, Serialize};

/// OKX API standard response wrapper
#[derive(Debug, Deserialize, Serialize)]
pub struct OkxResponse<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    /// Absent on some error bodies
    #[serde(default)]
    pub data: T,
}

/// OKX instrument as returned by `/market/instruments`
///
/// Every field is string-encoded on the wire and many are empty for
/// instrument types they do not apply to.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OkxInstrument {
    pub inst_type: String,          // SPOT, MARGIN, SWAP, FUTURES, OPTION
    pub inst_id: String,            // e.g., BTC-USD-240628
    pub uly: Option<String>,        // Underlying (for derivatives)
    pub base_ccy: Option<String>,   // Base currency (spot only)
    pub quote_ccy: Option<String>,  // Quote currency (spot only)
    pub settle_ccy: Option<String>, // Settlement currency
    pub ct_val: Option<String>,     // Contract value
    pub ct_mult: Option<String>,    // Contract multiplier
    pub opt_type: Option<String>,   // Option type (C/P)
    pub stk: Option<String>,        // Strike price
    pub exp_time: Option<String>,   // Expiry time, unix ms
    pub lever: Option<String>,      // Max leverage
    pub tick_sz: Option<String>,    // Tick size
    pub lot_sz: Option<String>,     // Lot size
    pub min_sz: Option<String>,     // Minimum order size
    pub ct_type: Option<String>,    // linear, inverse
    pub state: Option<String>,      // live, suspend, preopen, test
}

/// OKX WebSocket request
#[derive(Debug, Serialize, Clone)]
pub struct OkxWsRequest {
    pub op: &'static str,  // Operation: subscribe, unsubscribe
    pub args: Vec<String>, // Channel arguments
}

impl OkxWsRequest {
    pub fn subscribe(channel: String) -> Self {
        Self {
            op: "subscribe",
            args: vec![channel],
        }
    }
}
