pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod kernel;
pub mod traits;
pub mod types;
