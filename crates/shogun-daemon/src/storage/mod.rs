//! File-backed queue and report store.
//!
//! Small YAML records under the workspace root: the command queue, one task
//! file and one report file per laborer, an aggregate status snapshot, and the
//! shared dashboard document. Purely data access; no orchestration logic.

mod dashboard;
mod models;
mod queue;
mod records;
mod store;

pub use models::*;
pub use store::{Store, StoreError};
