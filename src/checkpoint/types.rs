//! Types for the checkpoint module.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of the last transfer attempt for one source path.
///
/// Serialized with the field names of the on-disk status file (`Downloaded`,
/// `Error`), both omitted when not applicable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    #[serde(rename = "Downloaded", default, skip_serializing_if = "is_false")]
    pub downloaded: bool,
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TransferRecord {
    /// Record for a file that reached the sink.
    pub fn succeeded() -> Self {
        Self {
            downloaded: true,
            error: None,
        }
    }

    /// Record for a failed attempt. Retried on the next run.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            downloaded: false,
            error: Some(error.into()),
        }
    }

    /// Whether a later run may skip this path.
    pub fn is_done(&self) -> bool {
        self.downloaded
    }
}

/// Path -> outcome. Ordered by path so the file diffs cleanly between runs.
pub type CheckpointMap = BTreeMap<String, TransferRecord>;

/// Aggregate counts over a checkpoint map, used by the `status` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub total: u64,
    pub downloaded: u64,
    pub failed: u64,
}

impl CheckpointSummary {
    pub fn from_map(map: &CheckpointMap) -> Self {
        map.values().fold(Self::default(), |mut acc, record| {
            acc.total += 1;
            if record.downloaded {
                acc.downloaded += 1;
            } else if record.error.is_some() {
                acc.failed += 1;
            }
            acc
        })
    }
}
