use super::types::DeribitInstrument;
use crate::core::errors::ExchangeError;
use crate::core::types::{conversion, ExchangeType, Ticker};
use rust_decimal::Decimal;
use serde_json::Value;

/// Convert a Deribit instrument to the canonical ticker
pub fn convert_deribit_instrument(instrument: DeribitInstrument) -> Result<Ticker, ExchangeError> {
    let instrument_type = conversion::parse_instrument_type(&instrument.kind)?;
    let option_type = instrument
        .option_type
        .as_deref()
        .and_then(conversion::parse_option_type);

    Ok(Ticker {
        exchange: ExchangeType::Deribit,
        underlying: instrument.base_currency.clone(),
        code: instrument.instrument_name,
        base_currency: instrument.base_currency,
        quote_currency: instrument.quote_currency,
        settle_currency: instrument.settlement_currency,
        // Deribit quotes contract_size as the lot; there is no separate multiplier
        multiplier: Decimal::ONE,
        max_leverage: instrument.max_leverage.unwrap_or(1),
        option_type,
        exp_date: instrument
            .expiration_timestamp
            .and_then(conversion::timestamp_ms_to_datetime),
        tick_size: instrument.tick_size,
        lot_size: instrument.contract_size,
        min_size: instrument.min_trade_amount,
        contract_type: conversion::parse_contract_type(&instrument.instrument_type),
        strike: instrument.strike,
        instrument_type,
    })
}

/// Convert every entry of a `public/get_instruments` body
///
/// Entries that fail to decode or map are skipped and returned as errors
/// alongside the converted tickers.
pub fn convert_instrument_list(body: &Value) -> (Vec<Ticker>, Vec<ExchangeError>) {
    let entries = body
        .get("result")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);

    let mut tickers = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();
    for entry in entries {
        let converted = serde_json::from_value::<DeribitInstrument>(entry.clone())
            .map_err(ExchangeError::from)
            .and_then(convert_deribit_instrument);
        match converted {
            Ok(ticker) => tickers.push(ticker),
            Err(e) => failures.push(e),
        }
    }
    (tickers, failures)
}
