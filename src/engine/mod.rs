//! History engine: reconciliation and the sync pipeline that feeds it.

pub mod reconcile;
pub mod sync;

pub use reconcile::{merge, HistoryStore, ReconcileOutcome};
pub use sync::{StageReport, StageResult, SyncOrchestrator, SyncOutcome, SyncReport, SyncStatus};
