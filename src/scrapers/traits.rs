use crate::error::FetchError;
use anyhow::Result;
use async_trait::async_trait;

/// Retrieves the raw HTML of a listing page
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// Best-effort lookup of the seller phone shown on a listing's detail page.
/// Callers bound it with a timeout and treat any failure as "no phone".
#[async_trait]
pub trait PhoneLookup: Send + Sync {
    async fn lookup(&self, detail_url: &str) -> Result<String>;

    /// Get the name of the lookup backend
    fn backend_name(&self) -> &'static str;
}
