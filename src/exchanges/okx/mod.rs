pub mod adapter;
pub mod conversions;
pub mod handler;
pub mod types;

pub use adapter::OkxAdapter;
pub use handler::OkxMessageHandler;
pub use types::{OkxInstrument, OkxResponse, OkxWsRequest};
