//! Catalog fetch collaborator.
//!
//! Downloads per-extension digest→title datasets into the local cache
//! directory the [`CatalogStore`](super::hashdb::CatalogStore) reads from.
//! This is the only place in the crate that performs network access;
//! identification itself stays offline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::hashdb::CatalogFile;

pub struct CatalogFetcher {
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl CatalogFetcher {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Fetch the dataset at `url` and cache it for the dotted-less
    /// extension `ext` (e.g. `sfc`). Returns the number of titles cached.
    pub async fn fetch(&self, ext: &str, url: &str) -> Result<usize> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();

        let body = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("fetching catalog for .{ext}"))?
            .bytes()
            .await
            .context("reading catalog body")?;

        // Parse before writing so a bad download never clobbers the cache.
        let catalog: CatalogFile =
            serde_json::from_slice(&body).context("catalog is not a valid dataset")?;

        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("creating {}", self.cache_dir.display()))?;
        let target = self.cache_dir.join(format!("{ext}.json"));
        std::fs::write(&target, &body)
            .with_context(|| format!("writing {}", target.display()))?;

        info!(
            ext = %ext,
            platform = %catalog.platform,
            titles = catalog.titles.len(),
            path = %target.display(),
            "catalog cached"
        );
        Ok(catalog.titles.len())
    }
}
