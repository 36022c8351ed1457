use serde::{Deserialize, Serialize};

/// What a strategy (or the ledger itself) wants to do with an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
    Nothing,
}

impl Direction {
    /// The sign applied to an executed quantity: +1 for a buy, -1 for a sell.
    pub fn sign(&self) -> i64 {
        match self {
            Direction::Buy => 1,
            Direction::Sell => -1,
            Direction::Nothing => 0,
        }
    }

    /// The direction that closes a position of the given signed quantity.
    pub fn closing(quantity: i64) -> Self {
        match quantity.signum() {
            1 => Direction::Sell,
            -1 => Direction::Buy,
            _ => Direction::Nothing,
        }
    }
}

/// Bar frequency accepted by the market-data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Minute,
    TenMinutes,
    Hour,
    Day,
    Week,
    Month,
}

impl Frequency {
    /// The interval code used by the MOEX ISS candles endpoint.
    pub fn iss_interval(&self) -> u32 {
        match self {
            Frequency::Minute => 1,
            Frequency::TenMinutes => 10,
            Frequency::Hour => 60,
            Frequency::Day => 24,
            Frequency::Week => 7,
            Frequency::Month => 31,
        }
    }
}

/// Outcome classification of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageCode {
    /// Data was available and the order was processed.
    Filled = 0,
    /// The venue returned no bars, most likely because it is closed.
    NoData = 1,
    /// The venue does not know the instrument.
    UnknownInstrument = 2,
}

impl MessageCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}
