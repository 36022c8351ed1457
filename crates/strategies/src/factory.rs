use crate::error::StrategyError;
use crate::macd_conservative::MacdConservative;
use crate::Strategy;
use configuration::{StrategyId, StrategySettings};

/// Creates the strategy selected in the configuration.
pub fn create_strategy(settings: &StrategySettings) -> Result<Box<dyn Strategy>, StrategyError> {
    // The compiler errors here if a new StrategyId is added but not handled.
    match settings.id {
        StrategyId::MacdConservative => Ok(Box::new(MacdConservative::new(settings.macd.clone())?)),
    }
}
