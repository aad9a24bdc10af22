//! Store Configuration
//!
//! ## StoreConfig
//!
//! Controls how much history the store retains and how that history is
//! segmented by time:
//!
//! - **history_retention_ms**: versions remain queryable until they are
//!   older than this relative to the observed stream time (default: 24h)
//! - **segment_interval_ms**: width of one time segment; history is
//!   expired a whole segment at a time, so a smaller interval expires
//!   more promptly at the cost of more segments (default: half the
//!   default retention)
//!
//! Both values are in the same unit as record timestamps (milliseconds
//! for epoch-millisecond timestamps) and must be positive.
//!
//! ## Usage
//!
//! ```ignore
//! // One hour of history, segmented into 10-minute spans
//! let config = StoreConfig {
//!     history_retention_ms: 60 * 60 * 1000,
//!     segment_interval_ms: 10 * 60 * 1000,
//! };
//!
//! // Or derive a reasonable segmentation from the retention alone
//! let config = StoreConfig::with_history_retention(60 * 60 * 1000);
//! ```

use serde::{Deserialize, Serialize};
use tempora_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How far back (relative to observed stream time) versions stay
    /// queryable (default: 24 hours)
    #[serde(default = "default_history_retention_ms")]
    pub history_retention_ms: i64,

    /// Time span covered by one segment (default: 12 hours)
    #[serde(default = "default_segment_interval_ms")]
    pub segment_interval_ms: i64,
}

impl StoreConfig {
    /// Configuration with the given retention and a segment interval of
    /// half the retention, floored at one minute.
    pub fn with_history_retention(history_retention_ms: i64) -> Self {
        Self {
            history_retention_ms,
            segment_interval_ms: (history_retention_ms / 2).max(60_000),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_retention_ms <= 0 {
            return Err(Error::InvalidConfig(format!(
                "history retention must be positive, got {}",
                self.history_retention_ms
            )));
        }
        if self.segment_interval_ms <= 0 {
            return Err(Error::InvalidConfig(format!(
                "segment interval must be positive, got {}",
                self.segment_interval_ms
            )));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_retention_ms: default_history_retention_ms(),
            segment_interval_ms: default_segment_interval_ms(),
        }
    }
}

fn default_history_retention_ms() -> i64 {
    24 * 60 * 60 * 1000 // 24 hours
}

fn default_segment_interval_ms() -> i64 {
    default_history_retention_ms() / 2
}
