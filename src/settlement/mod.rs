// Settlement reconciliation: selects, dedups, writes and settles jobs
pub mod dedup;
pub mod nonce;
pub mod reconciler;
pub mod report;
pub mod scheduler;
pub mod selection;
pub mod submitter;

#[cfg(test)]
pub(crate) mod testing;

pub use reconciler::{PassOptions, Reconciler, ReconcilerSettings};
pub use report::PassReport;
pub use scheduler::PassScheduler;
