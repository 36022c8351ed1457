use crate::error::EngineError;
use chrono::NaiveDateTime;
use executor::Ledger;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bumped whenever the shape of `EngineState` changes.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Everything needed to resume an engine: the ledger and the logical clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub schema_version: u32,
    pub saved_at: NaiveDateTime,
    pub clock: NaiveDateTime,
    pub ledger: Ledger,
}

impl EngineState {
    pub fn new(clock: NaiveDateTime, ledger: Ledger) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            saved_at: chrono::Local::now().naive_local(),
            clock,
            ledger,
        }
    }
}

/// Writes the state as pretty JSON. The file is replaced atomically.
pub async fn save(path: &Path, state: &EngineState) -> Result<(), EngineError> {
    let json = serde_json::to_vec_pretty(state)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    tracing::debug!(path = %path.display(), entries = state.ledger.history().len(), "Engine state saved");
    Ok(())
}

/// Reads a previously saved state. A missing file is `Ok(None)`.
pub async fn load(path: &Path) -> Result<Option<EngineState>, EngineError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // Check the version before committing to the full shape.
    #[derive(Deserialize)]
    struct Header {
        schema_version: u32,
    }
    let header: Header = serde_json::from_slice(&bytes)?;
    if header.schema_version != STATE_SCHEMA_VERSION {
        return Err(EngineError::UnsupportedStateVersion {
            found: header.schema_version,
            expected: STATE_SCHEMA_VERSION,
        });
    }

    let state: EngineState = serde_json::from_slice(&bytes)?;
    tracing::debug!(path = %path.display(), clock = %state.clock, "Engine state loaded");
    Ok(Some(state))
}
