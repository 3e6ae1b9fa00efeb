pub mod deribit;
pub mod okx;
