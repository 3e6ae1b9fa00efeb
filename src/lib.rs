pub mod core;
pub mod exchanges;
pub mod service;
pub mod utils;

pub use crate::core::{errors::ExchangeError, traits::TradingSocketClient, types::*};
pub use exchanges::deribit::DeribitAdapter;
pub use exchanges::okx::OkxAdapter;
pub use service::TradingSocketService;
