//! restock-core: demand records and the pure rules applied to them.
//!
//! Everything here is synchronous and side-effect free. State ownership
//! (the open set and the history ledger) lives in `restock-engine` and
//! `restock-storage`.
//!
//! # Public API
//!
//! - [`Record`], [`RecordKey`], [`Status`] -- the atomic unit and its identity
//! - [`gap::recompute`] -- validate an on-hand edit and rederive the gap
//! - [`alert::evaluate`] -- threshold alerts for one record
//! - [`filter::filter`] -- case-insensitive search over open records

pub mod alert;
pub mod filter;
pub mod gap;
pub mod record;

pub use alert::{AlertKind, AlertSummary, Thresholds};
pub use gap::{QuantityBounds, QuantityError};
pub use record::{parse_period, KeyParseError, Record, RecordKey, Status};
