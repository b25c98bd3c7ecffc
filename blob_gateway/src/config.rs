//! Blob storage configuration.

use std::env;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{BlobError, BlobResult};

/// Default number of objects enriched concurrently by a listing.
pub const DEFAULT_ENRICHMENT_CONCURRENCY: usize = 8;

/// Configuration for blob storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    /// Storage path (e.g., `file:///path`, `memory://`, `s3://bucket/prefix`,
    /// `az://account-container/prefix`, `gs://bucket/prefix`).
    #[serde(default = "default_blob_store_path")]
    pub path: String,

    /// AWS region (for S3).
    #[serde(default)]
    pub region: Option<String>,

    /// Azure storage account name.
    #[serde(default)]
    pub azure_storage_account: Option<String>,

    /// Base used for canonical locators instead of `path`, e.g. the public
    /// `https://` endpoint of the bucket.
    #[serde(default)]
    pub locator_base_url: Option<String>,

    /// Objects enriched in parallel by a listing.
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        Self {
            path: default_blob_store_path(),
            region: None,
            azure_storage_account: None,
            locator_base_url: None,
            enrichment_concurrency: DEFAULT_ENRICHMENT_CONCURRENCY,
        }
    }
}

impl BlobStorageConfig {
    pub fn memory() -> Self {
        Self {
            path: "memory:///".to_string(),
            ..Default::default()
        }
    }

    pub fn url(&self) -> BlobResult<Url> {
        self.path.parse::<Url>().map_err(|e| BlobError::InvalidUri {
            uri: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Base of canonical locators: `locator_base_url` if set, else `path`.
    pub fn locator_base(&self) -> BlobResult<Url> {
        let raw = self.locator_base_url.as_deref().unwrap_or(&self.path);
        let url = raw.parse::<Url>().map_err(|e| BlobError::InvalidUri {
            uri: raw.to_string(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(BlobError::InvalidUri {
                uri: raw.to_string(),
                reason: "locator base must be hierarchical".to_string(),
            });
        }
        Ok(url)
    }

    pub fn validate(&self) -> BlobResult<()> {
        self.url()?;
        self.locator_base()?;
        if self.enrichment_concurrency == 0 {
            return Err(BlobError::invalid_argument(
                "enrichment_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Default blob store path (local filesystem).
pub fn default_blob_store_path() -> String {
    format!(
        "file://{}",
        env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join("blobgate_storage/blobs")
            .to_str()
            .unwrap_or("./blobgate_storage/blobs")
    )
}

fn default_enrichment_concurrency() -> usize {
    DEFAULT_ENRICHMENT_CONCURRENCY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_local() {
        let config = BlobStorageConfig::default();
        assert!(config.path.starts_with("file://"));
        assert_eq!(config.enrichment_concurrency, DEFAULT_ENRICHMENT_CONCURRENCY);
        config.validate().unwrap();
    }

    #[test]
    fn test_locator_base_prefers_override() {
        let config = BlobStorageConfig {
            path: "s3://sales-bucket/uploads".to_string(),
            locator_base_url: Some("https://sales-bucket.s3.amazonaws.com/uploads".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.locator_base().unwrap().as_str(),
            "https://sales-bucket.s3.amazonaws.com/uploads"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = BlobStorageConfig {
            path: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BlobError::InvalidUri { .. })
        ));

        let config = BlobStorageConfig {
            enrichment_concurrency: 0,
            ..BlobStorageConfig::memory()
        };
        assert!(matches!(
            config.validate(),
            Err(BlobError::InvalidArgument { .. })
        ));
    }
}
