//! Blob storage access gateway.
//!
//! Addresses objects by container and name, uploads content with descriptive
//! metadata, lists containers enriched with time-bounded access locators and
//! deletes objects. Storage is reached only through the [`BlobStore`] trait:
//!
//! - [`ObjectStoreBackend`] wraps any `object_store` implementation (in-memory,
//!   S3, Azure, GCS) and signs locators when the store can.
//! - [`LocalBlobStore`] keeps objects on the local filesystem with metadata in
//!   a header ahead of the content.
//!
//! [`BlobGateway`] composes the store with [`SasPolicy`] and the
//! [`BlobMetadata`] codec.
//!
//! ```rust,no_run
//! use blob_gateway::{BlobGateway, BlobStorageConfig};
//! use futures::TryStreamExt;
//!
//! # async fn example() -> Result<(), blob_gateway::BlobError> {
//! let gateway = BlobGateway::from_config(&BlobStorageConfig {
//!     path: "s3://sales-bucket/uploads".to_string(),
//!     region: Some("us-west-2".to_string()),
//!     ..Default::default()
//! })?;
//!
//! for blob in gateway.list_enriched("sales").await? {
//!     println!("{} -> {}", blob.name, blob.access_uri);
//! }
//! let names: Vec<String> = gateway.list_names("sales")?.try_collect().await?;
//! # Ok(())
//! # }
//! ```

mod address;
mod backends;
mod config;
mod error;
mod gateway;
mod metadata;
mod metrics;
mod sas;
mod traits;

#[cfg(test)]
mod testing;

pub use address::{validate_address, validate_container, validate_name};
pub use backends::{from_config, local::LocalBlobStore, object_store::ObjectStoreBackend};
pub use config::{default_blob_store_path, BlobStorageConfig, DEFAULT_ENRICHMENT_CONCURRENCY};
pub use error::{BlobError, BlobResult};
pub use gateway::{BlobDescriptor, BlobGateway, PutResult};
pub use metadata::{BlobMetadata, BlobProperties, COMMENT_KEY, TITLE_KEY};
pub use metrics::{BlobMetrics, Timer};
pub use sas::{
    validate_expiry,
    HttpMethod,
    SasGrant,
    SasPermission,
    SasPolicy,
    SasScope,
    MAX_PRESIGN_EXPIRY,
    SAS_VALIDITY,
};
pub use traits::{BlobStore, ByteStream};
