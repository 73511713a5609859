pub mod conformance;
mod csv_file;
mod entry;
mod error;
mod index;
mod memory;
mod traits;

pub use csv_file::{CsvLedger, OpenReport};
pub use entry::{LedgerEntry, LEDGER_COLUMNS};
pub use error::StorageError;
pub use index::{LedgerIndex, LedgerRange};
pub use memory::MemoryLedger;
pub use traits::HistoryLedger;
