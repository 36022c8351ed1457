use crate::error::ExecutorError;
use crate::history::{HistoryEntry, HistoryLog, Structure};
use crate::transition::fold;
use chrono::NaiveDateTime;
use configuration::{validate_tickers, validate_weights, LedgerSettings};
use core_types::{Fill, SecurityState, StateSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// The portfolio ledger: positions, cash, per-ticker allocation and the audit trail.
///
/// Every mutation goes through `apply` (or `apply_closing` once terminated),
/// which folds a whole batch and then appends exactly one history entry. `full_balance` is never adjusted
/// incrementally; it is recomputed after every fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    id: Uuid,
    tickers: Vec<String>,
    free_balance: Decimal,
    full_balance: Decimal,
    positions: BTreeMap<String, SecurityState>,
    available_structure: BTreeMap<String, Decimal>,
    leverage_cap: Decimal,
    terminated: bool,
    history: HistoryLog,
}

impl Ledger {
    /// Builds a ledger, splitting `initial_balance` across `tickers` by `weights`.
    ///
    /// Rejects negative balances, blank or duplicate tickers, weights that do
    /// not match the tickers one to one or do not sum to exactly 1, and a
    /// leverage cap outside (0, 1].
    pub fn new(
        initial_balance: Decimal,
        tickers: &[String],
        weights: &[Decimal],
        leverage_cap: Decimal,
    ) -> Result<Self, ExecutorError> {
        if initial_balance.is_sign_negative() && !initial_balance.is_zero() {
            return Err(ExecutorError::InvalidConfiguration(format!(
                "initial balance {} is negative",
                initial_balance
            )));
        }
        if leverage_cap <= Decimal::ZERO || leverage_cap > Decimal::ONE {
            return Err(ExecutorError::InvalidConfiguration(format!(
                "leverage cap {} is outside (0, 1]",
                leverage_cap
            )));
        }
        validate_tickers(tickers).map_err(|e| ExecutorError::InvalidConfiguration(e.to_string()))?;
        validate_weights(tickers, weights).map_err(|e| ExecutorError::InvalidConfiguration(e.to_string()))?;

        let tickers: Vec<String> = tickers.iter().map(|t| t.trim().to_uppercase()).collect();
        let available_structure = tickers
            .iter()
            .zip(weights)
            .map(|(ticker, weight)| (ticker.clone(), initial_balance * weight))
            .collect();

        let ledger = Self {
            id: Uuid::new_v4(),
            tickers,
            free_balance: initial_balance,
            full_balance: initial_balance,
            positions: BTreeMap::new(),
            available_structure,
            leverage_cap,
            terminated: false,
            history: HistoryLog::new(),
        };
        tracing::info!(id = %ledger.id, balance = %initial_balance, tickers = ?ledger.tickers, "Ledger created");
        Ok(ledger)
    }

    pub fn from_settings(
        settings: &LedgerSettings,
        tickers: &[String],
        weights: &[Decimal],
    ) -> Result<Self, ExecutorError> {
        Self::new(settings.initial_balance, tickers, weights, settings.leverage_cap)
    }

    // --- Read-only queries ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn free_balance(&self) -> Decimal {
        self.free_balance
    }

    pub fn full_balance(&self) -> Decimal {
        self.full_balance
    }

    pub fn leverage_cap(&self) -> Decimal {
        self.leverage_cap
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn positions(&self) -> &BTreeMap<String, SecurityState> {
        &self.positions
    }

    /// Looks a position up without creating it.
    pub fn position(&self, ticker: &str) -> Option<&SecurityState> {
        self.positions.get(ticker)
    }

    /// Signed quantity held, 0 for a ticker never traded.
    pub fn quantity(&self, ticker: &str) -> i64 {
        self.position(ticker).map_or(0, SecurityState::quantity)
    }

    /// Remaining capital allocation of a ticker; 0 for a ticker that has none.
    pub fn available(&self, ticker: &str) -> Decimal {
        self.available_structure.get(ticker).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn available_structure(&self) -> &BTreeMap<String, Decimal> {
        &self.available_structure
    }

    /// Non-flat positions, by ticker.
    pub fn open_positions(&self) -> impl Iterator<Item = (&String, &SecurityState)> {
        self.positions.iter().filter(|(_, state)| !state.is_flat())
    }

    /// History-stripped copy of the position map.
    pub fn structure(&self) -> Structure {
        self.positions.iter().map(|(ticker, state)| (ticker.clone(), state.snapshot())).collect()
    }

    /// Positions whose stop-loss or take-profit has been crossed.
    ///
    /// The trigger price of a ticker is its mark when `marks` has one, otherwise
    /// its weighted-average price. Positions without trigger levels are skipped.
    /// Returns `(ticker, held quantity)` pairs.
    pub fn stop_target_breaches(&self, marks: &HashMap<String, Decimal>) -> Vec<(String, i64)> {
        self.open_positions()
            .filter(|(ticker, state)| {
                let price = marks.get(ticker.as_str()).copied().unwrap_or_else(|| state.price());
                let long = state.quantity() > 0;
                let stopped = state.stop_loss().is_some_and(|stop| if long { price < stop } else { price > stop });
                let taken =
                    state.take_profit().is_some_and(|target| if long { price > target } else { price < target });
                if stopped || taken {
                    tracing::info!(ticker = %ticker, %price, stopped, taken, "Stop/target breached");
                }
                stopped || taken
            })
            .map(|(ticker, state)| (ticker.clone(), state.quantity()))
            .collect()
    }

    // --- Mutations ---

    /// Get-or-create accessor; a new position starts flat. Only `commit` may
    /// change a position, so cash and balances always move with it.
    fn position_mut_or_default(&mut self, ticker: &str) -> &mut SecurityState {
        self.positions.entry(ticker.to_uppercase()).or_default()
    }

    /// Marks the ledger as terminated. Irreversible.
    pub fn terminate(&mut self) {
        if !self.terminated {
            tracing::info!(id = %self.id, "Ledger terminated");
        }
        self.terminated = true;
    }

    /// Folds a batch of fills and records one history entry.
    ///
    /// Fills with zero quantity are skipped. `timestamp` defaults to the wall
    /// clock, which is what heartbeat entries for empty batches use. A
    /// terminated ledger accepts nothing here; see `apply_closing`.
    pub fn apply(
        &mut self,
        fills: &[Fill],
        timestamp: Option<NaiveDateTime>,
    ) -> Result<&HistoryEntry, ExecutorError> {
        if self.terminated {
            return Err(ExecutorError::Terminated);
        }
        Ok(self.record(fills, timestamp))
    }

    /// Like `apply`, but only for fills that move positions towards flat.
    ///
    /// This is the one path still open after termination. The whole batch is
    /// rejected if any fill would open, grow or flip a position.
    pub fn apply_closing(
        &mut self,
        fills: &[Fill],
        timestamp: Option<NaiveDateTime>,
    ) -> Result<&HistoryEntry, ExecutorError> {
        let mut held: HashMap<&str, i64> = HashMap::new();
        for fill in fills.iter().filter(|f| f.quantity != 0) {
            let current = *held.entry(fill.ticker.as_str()).or_insert_with(|| self.quantity(&fill.ticker));
            let closes = current.signum() == -fill.quantity.signum() && fill.quantity.abs() <= current.abs();
            if !closes {
                return Err(ExecutorError::NotClosing {
                    ticker: fill.ticker.clone(),
                    quantity: fill.quantity,
                    held: current,
                });
            }
            held.insert(fill.ticker.as_str(), current + fill.quantity);
        }
        Ok(self.record(fills, timestamp))
    }

    fn record(&mut self, fills: &[Fill], timestamp: Option<NaiveDateTime>) -> &HistoryEntry {
        let structure_before = self.structure();
        let mut structure_received = Structure::new();

        for fill in fills {
            if fill.quantity == 0 {
                tracing::debug!(ticker = %fill.ticker, "Skipping zero-quantity fill");
                continue;
            }
            self.commit(fill);
            structure_received.insert(
                fill.ticker.clone(),
                StateSnapshot {
                    quantity: fill.quantity,
                    price: fill.price,
                    stop_loss: fill.stop_loss,
                    take_profit: fill.take_profit,
                },
            );
        }

        self.recompute_full_balance();
        let timestamp = timestamp.unwrap_or_else(|| chrono::Local::now().naive_local());
        let structure_after = self.structure();
        self.history.record(timestamp, self.full_balance, structure_before, structure_received, structure_after)
    }

    /// Applies one fill: position, allocation, cash and fee change together.
    fn commit(&mut self, fill: &Fill) {
        let current = self.position_mut_or_default(&fill.ticker).snapshot();
        let transition = fold(&current, fill);

        self.position_mut_or_default(&fill.ticker).update(transition.next);
        *self.available_structure.entry(fill.ticker.clone()).or_insert(Decimal::ZERO) -= fill.value();
        self.free_balance += transition.cash_delta;
        self.free_balance -= fill.fee;
        self.recompute_full_balance();

        tracing::info!(
            ticker = %fill.ticker,
            quantity = fill.quantity,
            price = %fill.price,
            fee = %fill.fee,
            position = transition.next.quantity,
            free_balance = %self.free_balance,
            "Fill applied"
        );
        if self.free_balance.is_sign_negative() {
            tracing::warn!(free_balance = %self.free_balance, "Free balance is negative");
        }
    }

    fn recompute_full_balance(&mut self) {
        let held: Decimal = self.positions.values().map(SecurityState::value).sum();
        self.full_balance = self.free_balance + held;
    }
}
