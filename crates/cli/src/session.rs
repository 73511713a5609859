//! One CLI invocation's view of the system: the history ledger, the engine,
//! and the working set restored from disk.

use std::sync::Arc;

use restock_engine::{LifecycleEngine, Operator, UserRegistry, WorkingSet};
use restock_storage::CsvLedger;
use tracing::info;

use crate::config::RestockConfig;

pub(crate) struct Session {
    pub engine: Arc<LifecycleEngine<CsvLedger>>,
    pub config: RestockConfig,
}

impl Session {
    /// Open the ledger and reload the saved working set.
    pub async fn open(config: RestockConfig) -> Result<Session, String> {
        let (ledger, opened) = CsvLedger::open(config.ledger.path.clone())
            .await
            .map_err(|e| format!("history ledger '{}': {}", config.ledger.path.display(), e))?;
        if opened.migrated {
            info!(path = %config.ledger.path.display(), "history file converted to current format");
        }

        let engine = Arc::new(LifecycleEngine::new(
            Arc::new(ledger),
            config.engine_config(),
        ));

        if let Some(saved) = WorkingSet::load(&config.session.open_set).map_err(|e| e.to_string())? {
            engine
                .restore(saved.slots)
                .await
                .map_err(|e| e.to_string())?;
        }

        Ok(Session { engine, config })
    }

    /// Persist the current open set.
    pub fn save(&self) -> Result<(), String> {
        WorkingSet::new(self.engine.snapshot())
            .save(&self.config.session.open_set)
            .map_err(|e| e.to_string())
    }
}

/// Check that the caller may change the working set.
///
/// Without a configured users file everyone may. Otherwise `operator` must
/// name a registered user, `RESTOCK_PASSWORD` must hold their password, and
/// their role must be a write role.
pub(crate) fn authorize(
    config: &RestockConfig,
    operator: Option<&str>,
) -> Result<Option<Operator>, String> {
    let Some(users_file) = &config.access.users_file else {
        return Ok(None);
    };
    let username = operator.ok_or("this command requires --operator when a users file is configured")?;
    let password = std::env::var("RESTOCK_PASSWORD")
        .map_err(|_| "RESTOCK_PASSWORD must be set to the operator's password".to_string())?;

    let registry = UserRegistry::open(users_file).map_err(|e| e.to_string())?;
    let op = registry
        .login(username, &password)
        .map_err(|e| e.to_string())?;
    config
        .access_policy()
        .require_write(&op)
        .map_err(|e| e.to_string())?;
    info!(operator = %op.username, role = %op.role, "operator authorized");
    Ok(Some(op))
}
