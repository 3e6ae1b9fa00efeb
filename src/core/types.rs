use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::core::config::ConfigError;

/// Supported venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeType {
    Deribit,
    Okx,
}

impl ExchangeType {
    pub const fn default_ws_url(self) -> &'static str {
        match self {
            Self::Deribit => "wss://www.deribit.com/ws/api/v2",
            Self::Okx => "wss://ws.okx.com:8443/ws/v5/public",
        }
    }

    pub const fn default_rest_url(self) -> &'static str {
        match self {
            Self::Deribit => "https://www.deribit.com/api/v2",
            Self::Okx => "https://www.okx.com/api/v5",
        }
    }
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deribit => write!(f, "Deribit"),
            Self::Okx => write!(f, "Okx"),
        }
    }
}

impl FromStr for ExchangeType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deribit" => Ok(Self::Deribit),
            "okx" => Ok(Self::Okx),
            _ => Err(ConfigError::UnsupportedExchange(s.to_string())),
        }
    }
}

/// Semantic kind of an outstanding request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Authenticate,
    Subscribe,
    InstrumentList,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticate => write!(f, "Authenticate"),
            Self::Subscribe => write!(f, "Subscribe"),
            Self::InstrumentList => write!(f, "Get instruments"),
        }
    }
}

/// A decoded inbound message
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Raw transport payload
    pub raw: String,
    /// Decoded business payload
    pub payload: Value,
    /// Kind of the request this answers, `None` for untracked messages
    pub request_kind: Option<RequestKind>,
    /// Correlation id echoed by the venue, if any
    pub correlation_id: Option<u64>,
    pub received_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(raw: String, payload: Value, request_kind: Option<RequestKind>) -> Self {
        Self {
            raw,
            payload,
            request_kind,
            correlation_id: None,
            received_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: u64) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

/// A channel subscription issued on a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: String,
    pub visibility: Visibility,
    pub exchange: ExchangeType,
}

/// Instrument filter for instrument listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Future,
    Option,
    Spot,
}

impl InstrumentKind {
    /// Lower-case wire form (`future`, `option`, `spot`)
    pub const fn as_lower(self) -> &'static str {
        match self {
            Self::Future => "future",
            Self::Option => "option",
            Self::Spot => "spot",
        }
    }

    /// Upper-case wire form (`FUTURE`, `OPTION`, `SPOT`)
    pub const fn as_upper(self) -> &'static str {
        match self {
            Self::Future => "FUTURE",
            Self::Option => "OPTION",
            Self::Spot => "SPOT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Spot,
    Futures,
    Option,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    Linear,
    Inverse,
}

/// Canonical instrument descriptor shared by all venues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub exchange: ExchangeType,
    pub code: String,
    pub underlying: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub settle_currency: String,
    pub multiplier: Decimal,
    pub max_leverage: u32,
    pub option_type: Option<OptionType>,
    pub exp_date: Option<DateTime<Utc>>,
    pub tick_size: Decimal,
    pub lot_size: Decimal,
    pub min_size: Decimal,
    pub contract_type: ContractType,
    pub strike: Decimal,
    pub instrument_type: InstrumentType,
}

/// Venue-independent field mapping used by the per-venue conversions
pub mod conversion {
    use super::*;
    use crate::core::errors::ExchangeError;
    use chrono::TimeZone;

    /// Parse an instrument kind case-insensitively
    ///
    /// Perpetual swaps are treated as futures.
    pub fn parse_instrument_type(s: &str) -> Result<InstrumentType, ExchangeError> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(InstrumentType::Spot),
            "future" | "futures" | "swap" => Ok(InstrumentType::Futures),
            "option" => Ok(InstrumentType::Option),
            _ => Err(ExchangeError::ParseError(format!(
                "Invalid instrument type: {}",
                s
            ))),
        }
    }

    #[inline]
    pub fn parse_option_type(s: &str) -> Option<OptionType> {
        match s {
            "C" | "call" => Some(OptionType::Call),
            "P" | "put" => Some(OptionType::Put),
            _ => None,
        }
    }

    #[inline]
    pub fn parse_contract_type(s: &str) -> ContractType {
        match s {
            "inverse" | "reversed" => ContractType::Inverse,
            _ => ContractType::Linear,
        }
    }

    /// Unix milliseconds to UTC; out-of-range values yield `None`
    pub fn timestamp_ms_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
        if ms <= 0 || ms == i64::MAX {
            return None;
        }
        Utc.timestamp_millis_opt(ms).single()
    }

    /// Same as [`timestamp_ms_to_datetime`] for string-encoded timestamps
    pub fn string_to_datetime(s: &str) -> Option<DateTime<Utc>> {
        s.parse::<i64>().ok().and_then(timestamp_ms_to_datetime)
    }

    /// Convert string to Decimal with fallback
    #[inline]
    pub fn string_to_decimal(s: &str) -> Decimal {
        s.parse().unwrap_or(Decimal::ZERO)
    }
}

/// Lifecycle state of a venue connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
    Reconnecting,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_type_parsing() {
        assert_eq!("Deribit".parse::<ExchangeType>().unwrap(), ExchangeType::Deribit);
        assert_eq!("okx".parse::<ExchangeType>().unwrap(), ExchangeType::Okx);
        assert!("binance".parse::<ExchangeType>().is_err());
    }

    #[test]
    fn test_instrument_type_mapping() {
        assert_eq!(
            conversion::parse_instrument_type("FUTURE").unwrap(),
            InstrumentType::Futures
        );
        assert_eq!(
            conversion::parse_instrument_type("SWAP").unwrap(),
            InstrumentType::Futures
        );
        assert_eq!(
            conversion::parse_instrument_type("option").unwrap(),
            InstrumentType::Option
        );
        assert!(conversion::parse_instrument_type("future_combo").is_err());
    }

    #[test]
    fn test_option_and_contract_mapping() {
        assert_eq!(conversion::parse_option_type("C"), Some(OptionType::Call));
        assert_eq!(conversion::parse_option_type("put"), Some(OptionType::Put));
        assert_eq!(conversion::parse_option_type(""), None);
        assert_eq!(conversion::parse_contract_type("reversed"), ContractType::Inverse);
        assert_eq!(conversion::parse_contract_type("inverse"), ContractType::Inverse);
        assert_eq!(conversion::parse_contract_type("anything"), ContractType::Linear);
    }

    #[test]
    fn test_expiry_conversion() {
        let expiry = conversion::timestamp_ms_to_datetime(1_719_561_600_000).unwrap();
        assert_eq!(expiry.to_rfc3339(), "2024-06-28T08:00:00+00:00");
        assert_eq!(conversion::timestamp_ms_to_datetime(i64::MAX), None);
        assert_eq!(conversion::string_to_datetime(""), None);
    }

    #[test]
    fn test_instrument_kind_wire_forms() {
        assert_eq!(InstrumentKind::Future.as_lower(), "future");
        assert_eq!(InstrumentKind::Option.as_upper(), "OPTION");
    }
}
