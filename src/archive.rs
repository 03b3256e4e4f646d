use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Keeps a local copy of a reported listing's image
#[async_trait]
pub trait ImageArchiver: Send + Sync {
    async fn save(&self, image_url: &str) -> Result<()>;
}

/// Downloads the image and overwrites a single file on disk
pub struct FsImageArchiver {
    client: Client,
    path: PathBuf,
}

impl FsImageArchiver {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            path: path.into(),
        })
    }
}

#[async_trait]
impl ImageArchiver for FsImageArchiver {
    async fn save(&self, image_url: &str) -> Result<()> {
        if image_url.is_empty() {
            bail!("image url is empty");
        }

        let response = self
            .client
            .get(image_url)
            .send()
            .await
            .context("Failed to download image")?;

        if !response.status().is_success() {
            bail!("Failed to download image: {}", response.status());
        }

        let bytes = response.bytes().await.context("Failed to read image body")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        info!(path = %self.path.display(), bytes = bytes.len(), "💾 Saved listing image");
        Ok(())
    }
}
