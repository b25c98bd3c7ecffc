//! The gateway facade: addressing, upload, listing with enrichment, delete.

use std::{sync::Arc, time::SystemTime};

use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    address::{validate_address, validate_container},
    backends,
    config::DEFAULT_ENRICHMENT_CONCURRENCY,
    BlobMetadata,
    BlobMetrics,
    BlobProperties,
    BlobResult,
    BlobStorageConfig,
    BlobStore,
    ByteStream,
    SasPolicy,
    Timer,
};

/// A listed blob with its access locator and decoded metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobDescriptor {
    pub name: String,
    pub container_name: String,

    /// Signed and time-limited when the store supports it, otherwise the
    /// canonical locator.
    pub access_uri: String,

    pub title: Option<String>,
    pub comment: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: u64,

    /// Set only when `access_uri` is signed.
    pub access_expires_at: Option<SystemTime>,
}

/// Receipt for a committed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub locator: String,
    pub size_bytes: u64,
    pub sha256_hash: String,
}

/// Blob access gateway over a [`BlobStore`].
///
/// Holds no mutable state beyond the store client, so one instance is shared
/// across requests behind an `Arc`.
#[derive(Clone)]
pub struct BlobGateway {
    store: Arc<dyn BlobStore>,
    enrichment_concurrency: usize,
    metrics: BlobMetrics,
}

impl BlobGateway {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            enrichment_concurrency: DEFAULT_ENRICHMENT_CONCURRENCY,
            metrics: BlobMetrics::from_global(),
        }
    }

    pub fn from_config(config: &BlobStorageConfig) -> BlobResult<Self> {
        config.validate()?;
        let store = backends::from_config(config)?;
        Ok(Self::new(store).with_enrichment_concurrency(config.enrichment_concurrency))
    }

    /// Number of objects enriched concurrently by [`Self::list_enriched`].
    pub fn with_enrichment_concurrency(mut self, concurrency: usize) -> Self {
        self.enrichment_concurrency = concurrency.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: BlobMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    fn observe<T>(&self, op: &'static str, result: BlobResult<T>) -> BlobResult<T> {
        if let Err(err) = &result {
            self.metrics.record_error(op);
            debug!(op, error = %err, "blob gateway operation failed");
        }
        result
    }

    fn timer(&self, op: &'static str) -> Timer {
        Timer::start_with_labels(&self.metrics.operations, &[KeyValue::new("op", op)])
    }

    /// Create or overwrite `container/name`.
    ///
    /// The content type is committed as the object's transport header and the
    /// descriptor through [`BlobMetadata::encode`]. Size and SHA-256 are
    /// computed while the content streams through.
    #[tracing::instrument(skip_all, fields(container = %container, name = %name))]
    pub async fn upload(
        &self,
        name: &str,
        container: &str,
        content: ByteStream<'_>,
        content_type: Option<&str>,
        metadata: &BlobMetadata,
    ) -> BlobResult<PutResult> {
        validate_address(container, name)?;
        let _timer = self.timer("upload");

        let mut hasher = Sha256::new();
        let mut size_bytes = 0u64;
        let hashed = content
            .map(|chunk| {
                chunk.map(|bytes| {
                    hasher.update(&bytes);
                    size_bytes += bytes.len() as u64;
                    bytes
                })
            })
            .boxed();

        let result = self
            .store
            .put_object(container, name, hashed, content_type, metadata.encode())
            .await;
        self.observe("upload", result)?;

        let put = PutResult {
            locator: self.store.resolve_locator(container, name),
            size_bytes,
            sha256_hash: format!("{:x}", hasher.finalize()),
        };
        info!(size_bytes = put.size_bytes, sha256 = %put.sha256_hash, "blob uploaded");
        Ok(put)
    }

    /// Canonical, unsigned locator. Does not check that the blob exists.
    pub fn get_locator(&self, name: &str, container: &str) -> BlobResult<String> {
        validate_address(container, name)?;
        Ok(self.store.resolve_locator(container, name))
    }

    /// Lazily stream the names in `container`, in store order.
    pub fn list_names(
        &self,
        container: &str,
    ) -> BlobResult<BoxStream<'static, BlobResult<String>>> {
        validate_container(container)?;
        Ok(self.store.list_object_names(container))
    }

    /// List every blob in `container` with an access locator and decoded
    /// metadata, in listing order.
    ///
    /// Up to the configured concurrency of objects are enriched at once.
    /// A signing failure falls back to the canonical locator; any listing or
    /// properties failure fails the whole call. Dropping the returned future
    /// drops every in-flight enrichment.
    #[tracing::instrument(skip_all, fields(container = %container))]
    pub async fn list_enriched(&self, container: &str) -> BlobResult<Vec<BlobDescriptor>> {
        validate_container(container)?;
        let _timer = self.timer("list_enriched");

        let result = self
            .store
            .list_object_names(container)
            .map(move |name| async move { self.enrich(container, name?).await })
            .buffered(self.enrichment_concurrency)
            .try_collect::<Vec<_>>()
            .await;
        let descriptors = self.observe("list_enriched", result)?;
        debug!(count = descriptors.len(), "listing enriched");
        Ok(descriptors)
    }

    /// Enrich a single blob the way [`Self::list_enriched`] does.
    #[tracing::instrument(skip_all, fields(container = %container, name = %name))]
    pub async fn describe(&self, name: &str, container: &str) -> BlobResult<BlobDescriptor> {
        validate_address(container, name)?;
        let _timer = self.timer("describe");
        let result = self.enrich(container, name.to_string()).await;
        self.observe("describe", result)
    }

    /// Stream a blob's content back with its properties.
    #[tracing::instrument(skip_all, fields(container = %container, name = %name))]
    pub async fn download(
        &self,
        name: &str,
        container: &str,
    ) -> BlobResult<(BlobProperties, ByteStream<'static>)> {
        validate_address(container, name)?;
        let _timer = self.timer("download");
        let result = self.store.get_object(container, name).await;
        self.observe("download", result)
    }

    /// Delete a blob. `Ok(false)` when it did not exist.
    #[tracing::instrument(skip_all, fields(container = %container, name = %name))]
    pub async fn delete(&self, name: &str, container: &str) -> BlobResult<bool> {
        validate_address(container, name)?;
        let _timer = self.timer("delete");
        let result = self.store.delete_object_if_exists(container, name).await;
        let existed = self.observe("delete", result)?;
        info!(existed, "blob delete");
        Ok(existed)
    }

    async fn enrich(&self, container: &str, name: String) -> BlobResult<BlobDescriptor> {
        let mut access_uri = self.store.resolve_locator(container, &name);
        let mut access_expires_at = None;

        if SasPolicy::should_sign(self.store.supports_signed_locator(container, &name)) {
            let grant = SasPolicy::build_grant(SystemTime::now());
            match self
                .store
                .issue_signed_locator(container, &name, &grant)
                .await
            {
                Ok(signed) => {
                    access_uri = signed;
                    access_expires_at = Some(grant.expires_at);
                }
                Err(err) => {
                    warn!(container, name = %name, error = %err, "signing failed, using canonical locator");
                    self.metrics.signing_fallbacks.add(1, &[]);
                }
            }
        }

        let properties = self.store.get_object_properties(container, &name).await?;
        let metadata = BlobMetadata::decode(&properties.metadata);
        Ok(BlobDescriptor {
            name,
            container_name: container.to_string(),
            access_uri,
            title: metadata.title,
            comment: metadata.comment,
            content_type: properties.content_type,
            size_bytes: properties.size_bytes,
            access_expires_at,
        })
    }
}
