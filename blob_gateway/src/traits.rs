//! Core blob store trait.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::{BlobProperties, BlobResult, SasGrant};

/// Stream of content chunks handed to or returned from a store.
pub type ByteStream<'a> = BoxStream<'a, anyhow::Result<Bytes>>;

/// The object store capability the gateway is written against.
///
/// Objects are addressed by `(container, name)`. Implementations must be safe
/// for concurrent use; the gateway shares one instance across requests and
/// across the enrichment tasks of a single listing.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create or overwrite an object with its content type and metadata.
    ///
    /// Content and metadata become visible together once this returns `Ok`.
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        content: ByteStream<'_>,
        content_type: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> BlobResult<()>;

    /// Lazily list every object name in the container, in store order.
    fn list_object_names(&self, container: &str) -> BoxStream<'static, BlobResult<String>>;

    /// Fetch properties without downloading content.
    ///
    /// Returns `BlobError::ObjectNotFound` if the blob doesn't exist.
    async fn get_object_properties(&self, container: &str, name: &str)
        -> BlobResult<BlobProperties>;

    /// Stream an object's content together with its properties.
    ///
    /// Returns `BlobError::ObjectNotFound` if the blob doesn't exist.
    async fn get_object(
        &self,
        container: &str,
        name: &str,
    ) -> BlobResult<(BlobProperties, ByteStream<'static>)>;

    /// Delete an object. Returns whether it existed.
    async fn delete_object_if_exists(&self, container: &str, name: &str) -> BlobResult<bool>;

    /// Canonical, unsigned locator. Does not check existence.
    fn resolve_locator(&self, container: &str, name: &str) -> String;

    /// Whether [`BlobStore::issue_signed_locator`] can succeed for the object.
    fn supports_signed_locator(&self, container: &str, name: &str) -> bool;

    /// Mint a signed locator for exactly one object under `grant`.
    async fn issue_signed_locator(
        &self,
        container: &str,
        name: &str,
        grant: &SasGrant,
    ) -> BlobResult<String>;
}
