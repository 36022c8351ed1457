use crate::error::ApiError;
use crate::responses::{parse_candles, parse_lot_size, CandlesResponse, SecuritiesResponse};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use configuration::MarketDataSettings;
use core_types::{Bar, Frequency, Quote};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub mod error;
pub mod responses;

const ISS_DATETIME: &str = "%Y-%m-%d %H:%M:%S";
/// Guards against a misbehaving server that never returns an empty page.
const MAX_PAGES: usize = 1000;

/// The abstract interface to a market-data provider.
///
/// The engine only depends on this trait, so the ISS client can be swapped for
/// an in-memory fake in tests.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Closing prices of `ticker` between `start` and `end` (inclusive) at the
    /// given bar frequency, together with the instrument's lot size.
    async fn quote(
        &self,
        ticker: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        frequency: Frequency,
    ) -> Result<Quote, ApiError>;
}

/// A `MarketData` implementation backed by the Moscow Exchange ISS REST API.
pub struct MoexClient {
    client: reqwest::Client,
    settings: MarketDataSettings,
    // Lot sizes never change within a session; `None` marks an unknown ticker.
    lot_sizes: Mutex<HashMap<String, Option<u32>>>,
}

impl MoexClient {
    pub fn new(settings: &MarketDataSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            settings: settings.clone(),
            lot_sizes: Mutex::new(HashMap::new()),
        })
    }

    fn board_url(&self) -> String {
        format!(
            "{}/engines/{}/markets/{}/boards/{}/securities",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.engine,
            self.settings.market,
            self.settings.board
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ticker: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { ticker: ticker.to_string(), status: status.as_u16() });
        }
        let text = response.text().await?;
        serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Looks up the lot size, consulting the session cache first.
    pub async fn lot_size(&self, ticker: &str) -> Result<Option<u32>, ApiError> {
        if let Ok(cache) = self.lot_sizes.lock() {
            if let Some(cached) = cache.get(ticker) {
                return Ok(*cached);
            }
        }

        let url = format!("{}/{}.json", self.board_url(), ticker);
        let query = [
            ("iss.meta", "off".to_string()),
            ("iss.only", "securities".to_string()),
            ("securities.columns", "SECID,LOTSIZE".to_string()),
        ];
        let response: SecuritiesResponse = self.get_json(ticker, &url, &query).await?;
        let lot_size = parse_lot_size(&response.securities)?;

        if let Ok(mut cache) = self.lot_sizes.lock() {
            cache.insert(ticker.to_string(), lot_size);
        }
        Ok(lot_size)
    }

    /// Fetches every page of candles in the window.
    pub async fn candles(
        &self,
        ticker: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        frequency: Frequency,
    ) -> Result<Vec<Bar>, ApiError> {
        let url = format!("{}/{}/candles.json", self.board_url(), ticker);
        let mut bars = Vec::new();

        for _ in 0..MAX_PAGES {
            let query = [
                ("iss.meta", "off".to_string()),
                ("from", start.format(ISS_DATETIME).to_string()),
                ("till", end.format(ISS_DATETIME).to_string()),
                ("interval", frequency.iss_interval().to_string()),
                ("start", bars.len().to_string()),
            ];
            let response: CandlesResponse = self.get_json(ticker, &url, &query).await?;
            let page = parse_candles(&response.candles)?;
            if page.is_empty() {
                break;
            }
            bars.extend(page);
        }

        tracing::debug!(ticker, bars = bars.len(), %start, %end, "Fetched candles from ISS");
        Ok(bars)
    }
}

#[async_trait]
impl MarketData for MoexClient {
    async fn quote(
        &self,
        ticker: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        frequency: Frequency,
    ) -> Result<Quote, ApiError> {
        let ticker = ticker.to_uppercase();
        let Some(lot_size) = self.lot_size(&ticker).await? else {
            tracing::warn!(ticker = %ticker, board = %self.settings.board, "Instrument is not listed on the board");
            return Ok(Quote::unknown(format!("{} is not traded on {}", ticker, self.settings.board)));
        };

        let bars = self.candles(&ticker, start, end, frequency).await?;
        if bars.is_empty() {
            return Ok(Quote::no_data(format!("no trades for {} between {} and {}", ticker, start, end)));
        }
        Ok(Quote::with_bars(Some(lot_size), bars))
    }
}
