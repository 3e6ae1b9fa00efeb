use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// JSON-RPC 2.0 request frame
#[derive(Debug, Serialize, Clone)]
pub struct DeribitRequest<P> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: P,
    pub id: u64,
}

impl<P> DeribitRequest<P> {
    pub const fn new(method: &'static str, params: P, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// `public/auth` parameters for the client-credentials grant
#[derive(Debug, Serialize, Clone)]
pub struct DeribitAuthParams<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// `public/subscribe` and `private/subscribe` parameters
#[derive(Debug, Serialize, Clone)]
pub struct DeribitSubscribeParams {
    pub channels: Vec<String>,
}

/// Result of a successful `public/auth`
#[derive(Debug, Deserialize, Clone)]
pub struct DeribitAuthResult {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Entry of `public/get_instruments`
#[derive(Debug, Deserialize, Clone)]
pub struct DeribitInstrument {
    pub instrument_name: String,
    /// future, option, spot, future_combo, option_combo
    pub kind: String,
    #[serde(default)]
    pub base_currency: String,
    #[serde(default)]
    pub quote_currency: String,
    #[serde(default)]
    pub settlement_currency: String,
    #[serde(default, deserialize_with = "decimal_from_json")]
    pub tick_size: Decimal,
    #[serde(default, deserialize_with = "decimal_from_json")]
    pub min_trade_amount: Decimal,
    #[serde(default, deserialize_with = "decimal_from_json")]
    pub contract_size: Decimal,
    #[serde(default)]
    pub max_leverage: Option<u32>,
    /// linear or reversed
    #[serde(default)]
    pub instrument_type: String,
    #[serde(default)]
    pub expiration_timestamp: Option<i64>,
    #[serde(default, deserialize_with = "decimal_from_json")]
    pub strike: Decimal,
    #[serde(default)]
    pub option_type: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Accepts JSON numbers and numeric strings without going through `f64`
fn decimal_from_json<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => {
            let text = number.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(de::Error::custom)
        }
        Value::String(text) => Decimal::from_str(&text).map_err(de::Error::custom),
        Value::Null => Ok(Decimal::ZERO),
        other => Err(de::Error::custom(format!(
            "expected a decimal, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instrument_decimals_keep_precision() {
        let instrument: DeribitInstrument = serde_json::from_value(json!({
            "instrument_name": "BTC-PERPETUAL",
            "kind": "future",
            "tick_size": 0.0005,
            "min_trade_amount": 10,
            "contract_size": 10,
            "strike": null
        }))
        .unwrap();
        assert_eq!(instrument.tick_size, Decimal::from_str("0.0005").unwrap());
        assert_eq!(instrument.min_trade_amount, Decimal::from(10));
        assert_eq!(instrument.strike, Decimal::ZERO);
        assert_eq!(instrument.option_type, None);
    }
}
