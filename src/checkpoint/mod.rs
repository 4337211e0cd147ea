//! Persistent per-path transfer outcomes.
//!
//! The checkpoint is a single JSON object keyed by source path. It is loaded
//! once at startup and rewritten in full at the end of a run and on shutdown.
//! Only records with `Downloaded: true` are skipped on later runs; failed
//! records are attempted again.

pub mod error;
pub mod store;
pub mod types;

pub use error::CheckpointError;
pub use store::{read_map, CheckpointStore};
pub use types::{CheckpointSummary, TransferRecord};
