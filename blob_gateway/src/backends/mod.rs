//! Blob store backend implementations and scheme based construction.

pub mod local;
pub mod object_store;

use std::sync::Arc;

use ::object_store::{memory::InMemory, path::Path as ObjectPath, ObjectStoreScheme};
use tracing::info;

use self::{local::LocalBlobStore, object_store::ObjectStoreBackend};
use crate::{BlobError, BlobResult, BlobStorageConfig, BlobStore};

/// Build the backend selected by the scheme of `config.path`.
///
/// `memory://` and `file://` are always available; `s3://`, `az://` and
/// `gs://` need the matching crate feature and pick up credentials from the
/// environment.
pub fn from_config(config: &BlobStorageConfig) -> BlobResult<Arc<dyn BlobStore>> {
    let url = config.url()?;
    let locator_base = config.locator_base()?;
    let (scheme, prefix) = ObjectStoreScheme::parse(&url).map_err(|_| {
        BlobError::UnsupportedBackend {
            scheme: url.scheme().to_string(),
        }
    })?;

    info!(path = %config.path, scheme = ?scheme, "initializing blob store");
    match scheme {
        ObjectStoreScheme::Memory => Ok(Arc::new(ObjectStoreBackend::new(
            Arc::new(InMemory::new()),
            prefix,
            locator_base,
        ))),
        ObjectStoreScheme::Local => Ok(Arc::new(LocalBlobStore::from_url(&url, locator_base)?)),
        #[cfg(feature = "aws")]
        ObjectStoreScheme::AmazonS3 => s3(config, &url, prefix, locator_base),
        #[cfg(feature = "azure")]
        ObjectStoreScheme::MicrosoftAzure => azure(config, &url, prefix, locator_base),
        #[cfg(feature = "gcp")]
        ObjectStoreScheme::GoogleCloudStorage => gcs(&url, prefix, locator_base),
        _ => Err(BlobError::UnsupportedBackend {
            scheme: url.scheme().to_string(),
        }),
    }
}

fn build_error(url: &url::Url, err: ::object_store::Error) -> BlobError {
    BlobError::InvalidUri {
        uri: url.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(feature = "aws")]
fn s3(
    config: &BlobStorageConfig,
    url: &url::Url,
    prefix: ObjectPath,
    locator_base: url::Url,
) -> BlobResult<Arc<dyn BlobStore>> {
    use ::object_store::aws::AmazonS3Builder;

    let mut builder = AmazonS3Builder::from_env().with_url(url.as_str());
    if let Some(region) = &config.region {
        builder = builder.with_region(region);
    }
    let s3 = Arc::new(builder.build().map_err(|e| build_error(url, e))?);
    Ok(Arc::new(
        ObjectStoreBackend::new(s3.clone(), prefix, locator_base).with_signer(s3),
    ))
}

#[cfg(feature = "azure")]
fn azure(
    config: &BlobStorageConfig,
    url: &url::Url,
    prefix: ObjectPath,
    locator_base: url::Url,
) -> BlobResult<Arc<dyn BlobStore>> {
    use ::object_store::azure::MicrosoftAzureBuilder;

    let mut builder = MicrosoftAzureBuilder::from_env().with_url(url.as_str());
    if let Some(account) = &config.azure_storage_account {
        builder = builder.with_account(account);
    }
    let azure = Arc::new(builder.build().map_err(|e| build_error(url, e))?);
    Ok(Arc::new(
        ObjectStoreBackend::new(azure.clone(), prefix, locator_base).with_signer(azure),
    ))
}

#[cfg(feature = "gcp")]
fn gcs(
    url: &url::Url,
    prefix: ObjectPath,
    locator_base: url::Url,
) -> BlobResult<Arc<dyn BlobStore>> {
    use ::object_store::gcp::GoogleCloudStorageBuilder;

    let gcs = Arc::new(
        GoogleCloudStorageBuilder::from_env()
            .with_url(url.as_str())
            .build()
            .map_err(|e| build_error(url, e))?,
    );
    Ok(Arc::new(
        ObjectStoreBackend::new(gcs.clone(), prefix, locator_base).with_signer(gcs),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use futures::{stream, StreamExt, TryStreamExt};
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_memory_backend_from_config() {
        let store = from_config(&BlobStorageConfig::memory()).unwrap();
        store
            .put_object(
                "sales",
                "invoice-1",
                stream::iter(vec![Ok(Bytes::from_static(b"x"))]).boxed(),
                None,
                HashMap::new(),
            )
            .await
            .unwrap();
        let names: Vec<String> = store.list_object_names("sales").try_collect().await.unwrap();
        assert_eq!(names, vec!["invoice-1"]);
        assert!(!store.supports_signed_locator("sales", "invoice-1"));
    }

    #[tokio::test]
    async fn test_file_backend_from_config() {
        let dir = TempDir::new().unwrap();
        let config = BlobStorageConfig {
            path: format!("file://{}", dir.path().display()),
            locator_base_url: Some("https://files.example.com/blobs/".to_string()),
            ..Default::default()
        };
        let store = from_config(&config).unwrap();
        assert_eq!(
            store.resolve_locator("sales", "invoice-1"),
            "https://files.example.com/blobs/sales/invoice-1"
        );
    }

    #[test]
    fn test_unknown_scheme_is_unsupported() {
        let config = BlobStorageConfig {
            path: "ftp://example.com/blobs".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            from_config(&config),
            Err(BlobError::UnsupportedBackend { scheme }) if scheme == "ftp"
        ));
    }
}
