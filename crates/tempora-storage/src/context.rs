//! Store Context
//!
//! The surrounding stream-processing task hands the store a small context
//! at open time: where state may live on disk, and the counter to bump
//! when a record is dropped because it aged past history retention.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for records dropped by retention.
#[derive(Debug, Default)]
pub struct ExpiredRecordSensor {
    expired: AtomicU64,
}

impl ExpiredRecordSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one dropped put.
    pub fn record(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }
}

/// Per-task context handed to the store at open time.
#[derive(Debug)]
pub struct StoreContext {
    state_dir: PathBuf,
    expired_records: ExpiredRecordSensor,
}

impl StoreContext {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            expired_records: ExpiredRecordSensor::new(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn expired_records(&self) -> &ExpiredRecordSensor {
        &self.expired_records
    }
}
