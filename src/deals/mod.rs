pub mod models;
pub mod provider;
pub mod w3s;

pub use models::{Deal, DealId, DealStatus};
pub use provider::StatusProvider;
pub use w3s::W3sStatusProvider;
