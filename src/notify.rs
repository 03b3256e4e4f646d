use crate::models::{Listing, SubscriberId};
use anyhow::Result;
use async_trait::async_trait;

/// Delivers an accepted listing to its subscriber
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(
        &self,
        subscriber: SubscriberId,
        listing: &Listing,
        phone: Option<&str>,
    ) -> Result<()>;
}
