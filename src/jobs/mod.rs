pub mod models;
pub mod repository;

pub use models::{CacheSettings, ContentAddress, Job, NewJob, Pub};
pub use repository::{JobStore, PgJobStore};
