use crate::error::ApiError;
use chrono::{NaiveDate, NaiveDateTime};
use core_types::Bar;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// ISS answers every query with named blocks shaped as a column list plus rows.
#[derive(Debug, Clone, Deserialize)]
pub struct IssTable {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

impl IssTable {
    fn column(&self, name: &str) -> Result<usize, ApiError> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| ApiError::InvalidData(format!("column {} is missing", name)))
    }
}

/// The response from `GET .../securities/{ticker}/candles.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct CandlesResponse {
    pub candles: IssTable,
}

/// The response from `GET .../securities/{ticker}.json?iss.only=securities`.
#[derive(Debug, Clone, Deserialize)]
pub struct SecuritiesResponse {
    pub securities: IssTable,
}

/// Converts the `candles` block into bars, using the candle start as timestamp.
pub fn parse_candles(table: &IssTable) -> Result<Vec<Bar>, ApiError> {
    let close_idx = table.column("close")?;
    let begin_idx = table.column("begin")?;

    table
        .data
        .iter()
        .map(|row| {
            let close = row
                .get(close_idx)
                .ok_or_else(|| ApiError::InvalidData("candle row is too short".to_string()))
                .and_then(to_decimal)?;
            let timestamp = row
                .get(begin_idx)
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::InvalidData("candle begin is not a string".to_string()))
                .and_then(parse_iss_datetime)?;
            Ok(Bar { timestamp, close })
        })
        .collect()
}

/// Reads `LOTSIZE` for the first row. `Ok(None)` means the board does not list the ticker.
pub fn parse_lot_size(table: &IssTable) -> Result<Option<u32>, ApiError> {
    let Some(row) = table.data.first() else {
        return Ok(None);
    };
    let idx = table.column("LOTSIZE")?;
    let lot = row
        .get(idx)
        .and_then(Value::as_u64)
        .ok_or_else(|| ApiError::InvalidData("LOTSIZE is not an integer".to_string()))?;
    u32::try_from(lot)
        .map(Some)
        .map_err(|_| ApiError::InvalidData(format!("LOTSIZE {} is out of range", lot)))
}

fn to_decimal(value: &Value) -> Result<Decimal, ApiError> {
    match value {
        // Parse the textual form so the reported digits survive unchanged.
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map_err(|e| ApiError::Deserialization(e.to_string())),
        Value::String(s) => Decimal::from_str(s).map_err(|e| ApiError::Deserialization(e.to_string())),
        other => Err(ApiError::InvalidData(format!("expected a number, got {}", other))),
    }
}

fn parse_iss_datetime(raw: &str) -> Result<NaiveDateTime, ApiError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|e| ApiError::InvalidData(format!("bad ISS timestamp {}: {}", raw, e)))
}
