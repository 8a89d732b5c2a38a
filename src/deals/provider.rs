use async_trait::async_trait;

use super::models::Deal;
use crate::error::AppResult;
use crate::jobs::ContentAddress;

/// Source of storage deal status, eventually consistent.
#[async_trait]
pub trait StatusProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deals currently known for a content address. An empty list is a
    /// valid answer.
    async fn deal_status(&self, content_address: &ContentAddress) -> AppResult<Vec<Deal>>;
}
