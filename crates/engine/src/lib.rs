//! Restock lifecycle engine.
//!
//! Owns the open set of demand records and moves fulfilled records into a
//! [`restock_storage::HistoryLedger`] exactly once. Around that core sit the
//! pieces a deployment needs: dataset ingestion with a pluggable forecast
//! provider, CSV export, the persisted working set, and operator access.

pub mod access;
pub mod error;
pub mod export;
pub mod forecast;
pub mod ingest;
pub mod lifecycle;
pub mod session;

pub use access::{AccessError, AccessPolicy, Operator, Role, UserRegistry};
pub use error::EngineError;
pub use forecast::{ColumnForecast, ForecastError, ForecastProvider, StaticForecast};
pub use ingest::{ingest, DatasetRow, IngestError, IngestReport, RowRejection};
pub use lifecycle::{CommitReport, EngineConfig, LifecycleEngine, OpenSlot, SeedReport};
pub use session::{SessionError, WorkingSet};
