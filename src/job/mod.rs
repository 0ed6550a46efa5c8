//! Upload job lifecycle: row normalization, progress, CSV snapshots and metadata.

pub mod metadata;
pub mod orchestrator;
pub mod progress;
pub mod results;
pub mod rows;
pub mod snapshot;
pub mod state;
pub mod storage;
