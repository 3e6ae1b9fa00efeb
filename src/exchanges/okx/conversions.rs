use super::types::OkxInstrument;
use crate::core::errors::ExchangeError;
use crate::core::types::{conversion, ExchangeType, Ticker};
use rust_decimal::Decimal;
use serde_json::Value;

fn non_empty(field: Option<&String>) -> Option<&str> {
    field.map(String::as_str).filter(|s| !s.is_empty())
}

fn decimal_or(field: Option<&String>, fallback: Decimal) -> Decimal {
    non_empty(field).map_or(fallback, conversion::string_to_decimal)
}

/// Convert an OKX instrument to the canonical ticker
pub fn convert_okx_instrument(instrument: OkxInstrument) -> Result<Ticker, ExchangeError> {
    if instrument.inst_id.is_empty() {
        return Err(ExchangeError::ParseError(
            "OKX instrument without instId".to_string(),
        ));
    }
    let instrument_type = conversion::parse_instrument_type(&instrument.inst_type)?;

    // derivatives leave base/quote empty; fall back to the instId legs
    let mut legs = instrument.inst_id.split('-');
    let base_leg = legs.next().unwrap_or_default().to_string();
    let quote_leg = legs.next().unwrap_or_default().to_string();

    Ok(Ticker {
        exchange: ExchangeType::Okx,
        underlying: non_empty(instrument.uly.as_ref()).map_or_else(
            || format!("{}-{}", base_leg, quote_leg),
            str::to_string,
        ),
        base_currency: non_empty(instrument.base_ccy.as_ref()).map_or(base_leg, str::to_string),
        quote_currency: non_empty(instrument.quote_ccy.as_ref()).map_or(quote_leg, str::to_string),
        settle_currency: non_empty(instrument.settle_ccy.as_ref())
            .unwrap_or_default()
            .to_string(),
        multiplier: decimal_or(instrument.ct_mult.as_ref(), Decimal::ONE),
        max_leverage: non_empty(instrument.lever.as_ref())
            .and_then(|s| s.parse().ok())
            .unwrap_or(1),
        option_type: non_empty(instrument.opt_type.as_ref()).and_then(conversion::parse_option_type),
        exp_date: non_empty(instrument.exp_time.as_ref()).and_then(conversion::string_to_datetime),
        tick_size: decimal_or(instrument.tick_sz.as_ref(), Decimal::ONE),
        lot_size: decimal_or(instrument.lot_sz.as_ref(), Decimal::ZERO),
        min_size: decimal_or(instrument.min_sz.as_ref(), Decimal::ZERO),
        contract_type: conversion::parse_contract_type(
            non_empty(instrument.ct_type.as_ref()).unwrap_or_default(),
        ),
        strike: decimal_or(instrument.stk.as_ref(), Decimal::ZERO),
        code: instrument.inst_id,
        instrument_type,
    })
}

/// Convert every element of an instrument `data` array
pub fn convert_instrument_list(data: &Value) -> (Vec<Ticker>, Vec<ExchangeError>) {
    let entries = data.as_array().map_or(&[][..], Vec::as_slice);

    let mut tickers = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();
    for entry in entries {
        let converted = serde_json::from_value::<OkxInstrument>(entry.clone())
            .map_err(ExchangeError::from)
            .and_then(convert_okx_instrument);
        match converted {
            Ok(ticker) => tickers.push(ticker),
            Err(e) => failures.push(e),
        }
    }
    (tickers, failures)
}
