//! Persisted working set: the open set saved between editing passes.
//!
//! Stored as JSON and replaced atomically (write to a temp file, fsync,
//! rename) so a crash mid-save leaves the previous working set intact.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::lifecycle::OpenSlot;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSet {
    pub version: u32,
    pub slots: Vec<OpenSlot>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("working set {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("working set {path} is not valid: {source}")]
    Format {
        path: String,
        source: serde_json::Error,
    },
    #[error("working set {path} has unsupported version {version}")]
    Version { path: String, version: u32 },
}

impl WorkingSet {
    pub fn new(slots: Vec<OpenSlot>) -> Self {
        WorkingSet {
            version: FORMAT_VERSION,
            slots,
        }
    }

    /// Load the working set, or `None` if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Option<WorkingSet>, SessionError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let set: WorkingSet =
            serde_json::from_str(&text).map_err(|source| SessionError::Format {
                path: path.display().to_string(),
                source,
            })?;
        if set.version != FORMAT_VERSION {
            return Err(SessionError::Version {
                path: path.display().to_string(),
                version: set.version,
            });
        }
        Ok(Some(set))
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: path.display().to_string(),
            source,
        };
        let json = serde_json::to_vec_pretty(self).map_err(|source| SessionError::Format {
            path: path.display().to_string(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp).map_err(io_err)?;
            file.write_all(&json).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, path).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restock_core::{QuantityBounds, Record, RecordKey};
    use rust_decimal::Decimal;
    use time::macros::date;

    #[test]
    fn save_then_load_keeps_staged_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("open_set.json");
        let record = Record::open(
            RecordKey::new("Austin", "Snacks", date!(2019 - 01 - 05)),
            Decimal::from(150),
            40,
            &QuantityBounds::default(),
        )
        .unwrap();
        let set = WorkingSet::new(vec![OpenSlot {
            record,
            staged: true,
        }]);

        set.save(&path).unwrap();
        assert_eq!(WorkingSet::load(&path).unwrap(), Some(set));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(WorkingSet::load(&dir.path().join("nope.json")).unwrap(), None);
    }

    #[test]
    fn stale_gap_in_file_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("open_set.json");
        fs::write(
            &path,
            r#"{"version":1,"slots":[{"record":{"key":{"location":"Austin","product":"Snacks","period":"2019-01-05"},"forecasted_quantity":"150","on_hand_quantity":40,"gap":"999","status":"Open"},"staged":false}]}"#,
        )
        .unwrap();
        let set = WorkingSet::load(&path).unwrap().unwrap();
        assert_eq!(set.slots[0].record.gap(), Decimal::from(110));
    }
}
