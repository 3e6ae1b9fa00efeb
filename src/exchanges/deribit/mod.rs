pub mod adapter;
pub mod conversions;
pub mod handler;
pub mod types;

pub use adapter::DeribitAdapter;
pub use handler::DeribitMessageHandler;
pub use types::{DeribitAuthResult, DeribitInstrument, DeribitRequest};
