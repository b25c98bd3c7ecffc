//! Blob store backed by any `object_store` implementation.
//!
//! Containers map to a path segment below the configured prefix. Content type
//! and metadata travel as object attributes, so the underlying store must
//! support attributes (in-memory, S3, Azure and GCS do; the `object_store`
//! local filesystem does not, see [`super::local`]).

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use object_store::{
    path::{Path as ObjectPath, DELIMITER},
    signer::Signer,
    Attribute,
    AttributeValue,
    Attributes,
    GetOptions,
    GetResult,
    ObjectStore,
    PutMultipartOpts,
    WriteMultipart,
};
use tracing::debug;
use url::Url;

use crate::{
    address::{locator, location},
    sas::{validate_expiry, HttpMethod},
    BlobError,
    BlobProperties,
    BlobResult,
    BlobStore,
    ByteStream,
    SasGrant,
};

pub struct ObjectStoreBackend {
    /// object_store client for data I/O.
    object_store: Arc<dyn ObjectStore>,

    /// Signer for the same store, when the backend can mint signed URLs.
    signer: Option<Arc<dyn Signer>>,

    /// Optional prefix for all keys.
    prefix: ObjectPath,

    /// Base URL for canonical locators.
    locator_base: Url,
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("object_store", &self.object_store.to_string())
            .field("signing", &self.signer.is_some())
            .field("prefix", &self.prefix)
            .field("locator_base", &self.locator_base.as_str())
            .finish()
    }
}

impl ObjectStoreBackend {
    pub fn new(object_store: Arc<dyn ObjectStore>, prefix: ObjectPath, locator_base: Url) -> Self {
        Self {
            object_store,
            signer: None,
            prefix,
            locator_base,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    fn container_path(&self, container: &str) -> BlobResult<ObjectPath> {
        self.join(&[container])
    }

    fn object_path(&self, container: &str, name: &str) -> BlobResult<ObjectPath> {
        self.join(&[container, name])
    }

    fn join(&self, parts: &[&str]) -> BlobResult<ObjectPath> {
        let mut raw = self.prefix.to_string();
        for part in parts {
            if !raw.is_empty() {
                raw.push_str(DELIMITER);
            }
            raw.push_str(part);
        }
        ObjectPath::parse(&raw).map_err(|e| BlobError::invalid_argument(e.to_string()))
    }
}

fn encode_attributes(
    content_type: Option<&str>,
    metadata: HashMap<String, String>,
) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(content_type) = content_type {
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
    }
    for (key, value) in metadata {
        attributes.insert(Attribute::Metadata(key.into()), AttributeValue::from(value));
    }
    attributes
}

fn properties_from(result: &GetResult) -> BlobProperties {
    let mut properties = BlobProperties {
        size_bytes: result.meta.size,
        etag: result.meta.e_tag.clone(),
        ..Default::default()
    };
    for (attribute, value) in result.attributes.iter() {
        match attribute {
            Attribute::ContentType => {
                properties.content_type = Some(value.as_ref().to_string());
            }
            Attribute::Metadata(key) => {
                properties
                    .metadata
                    .insert(key.to_string(), value.as_ref().to_string());
            }
            _ => {}
        }
    }
    properties
}

fn relative_name(container_path: &ObjectPath, object: &ObjectPath) -> Option<String> {
    let parts: Vec<String> = object
        .prefix_match(container_path)
        .map(|parts| parts.map(|part| part.as_ref().to_string()).collect())?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join(DELIMITER))
}

#[async_trait]
impl BlobStore for ObjectStoreBackend {
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        mut content: ByteStream<'_>,
        content_type: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> BlobResult<()> {
        let path = self.object_path(container, name)?;
        let location = location(container, name);
        let opts = PutMultipartOpts {
            attributes: encode_attributes(content_type, metadata),
            ..Default::default()
        };

        // The object becomes visible only when the multipart upload completes.
        let upload = self
            .object_store
            .put_multipart_opts(&path, opts)
            .await
            .map_err(|e| BlobError::write(&location, e))?;
        let mut writer = WriteMultipart::new(upload);

        while let Some(chunk) = content.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    let _ = writer.abort().await;
                    return Err(BlobError::StoreWriteFailed { location, source });
                }
            };
            if let Err(e) = writer.wait_for_capacity(1).await {
                let _ = writer.abort().await;
                return Err(BlobError::write(&location, e));
            }
            writer.write(&chunk);
        }

        writer
            .finish()
            .await
            .map_err(|e| BlobError::write(&location, e))?;
        debug!(location = %location, "object committed");
        Ok(())
    }

    fn list_object_names(&self, container: &str) -> BoxStream<'static, BlobResult<String>> {
        let object_store = self.object_store.clone();
        let container = container.to_string();
        let container_path = self.container_path(&container);

        async_stream::try_stream! {
            let container_path = container_path?;
            let mut listing = object_store.list(Some(&container_path));
            while let Some(meta) = listing.next().await {
                let meta = meta.map_err(|e| BlobError::read(&container, e))?;
                if let Some(name) = relative_name(&container_path, &meta.location) {
                    yield name;
                }
            }
        }
        .boxed()
    }

    async fn get_object_properties(
        &self,
        container: &str,
        name: &str,
    ) -> BlobResult<BlobProperties> {
        let path = self.object_path(container, name)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self
            .object_store
            .get_opts(&path, options)
            .await
            .map_err(|e| BlobError::read(location(container, name), e))?;
        Ok(properties_from(&result))
    }

    async fn get_object(
        &self,
        container: &str,
        name: &str,
    ) -> BlobResult<(BlobProperties, ByteStream<'static>)> {
        let path = self.object_path(container, name)?;
        let location = location(container, name);
        let result = self
            .object_store
            .get(&path)
            .await
            .map_err(|e| BlobError::read(&location, e))?;
        let properties = properties_from(&result);
        let stream = result
            .into_stream()
            .map(move |chunk| {
                chunk.map_err(|e| anyhow::anyhow!("error reading object {}: {}", location, e))
            })
            .boxed();
        Ok((properties, stream))
    }

    async fn delete_object_if_exists(&self, container: &str, name: &str) -> BlobResult<bool> {
        let path = self.object_path(container, name)?;
        let location = location(container, name);

        // Most object stores report success when deleting a missing key, so
        // existence is checked first.
        match self.object_store.head(&path).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(BlobError::read(&location, e)),
        }
        match self.object_store.delete(&path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(BlobError::write(&location, e)),
        }
    }

    fn resolve_locator(&self, container: &str, name: &str) -> String {
        locator(&self.locator_base, container, name)
    }

    fn supports_signed_locator(&self, _container: &str, _name: &str) -> bool {
        self.signer.is_some()
    }

    async fn issue_signed_locator(
        &self,
        container: &str,
        name: &str,
        grant: &SasGrant,
    ) -> BlobResult<String> {
        let location = location(container, name);
        let Some(signer) = &self.signer else {
            return Err(BlobError::signing(
                &location,
                "backend cannot issue signed locators",
            ));
        };

        let expires_in = grant.expires_in(std::time::SystemTime::now());
        validate_expiry(expires_in).map_err(|reason| BlobError::signing(&location, reason))?;

        let path = self.object_path(container, name)?;
        let method = match grant.permission.method() {
            HttpMethod::Get => http::Method::GET,
        };
        let url = signer
            .signed_url(method, &path, expires_in)
            .await
            .map_err(|e| BlobError::signing(&location, e.to_string()))?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use bytes::Bytes;
    use futures::{stream, TryStreamExt};
    use object_store::memory::InMemory;

    use super::*;
    use crate::SasPolicy;

    #[derive(Debug)]
    struct QuerySigner;

    #[async_trait]
    impl Signer for QuerySigner {
        async fn signed_url(
            &self,
            method: http::Method,
            path: &ObjectPath,
            expires_in: Duration,
        ) -> object_store::Result<Url> {
            let mut url = Url::parse("https://signed.example.com").unwrap();
            url.set_path(path.as_ref());
            url.query_pairs_mut()
                .append_pair("method", method.as_str())
                .append_pair("se", &expires_in.as_secs().to_string());
            Ok(url)
        }
    }

    fn backend(prefix: &str) -> ObjectStoreBackend {
        ObjectStoreBackend::new(
            Arc::new(InMemory::new()),
            ObjectPath::from(prefix),
            Url::parse("memory:///").unwrap(),
        )
    }

    fn content(parts: &[&'static str]) -> ByteStream<'static> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    #[tokio::test]
    async fn test_put_and_read_back_attributes() {
        let store = backend("uploads");
        let metadata = HashMap::from([("title".to_string(), "Invoice".to_string())]);
        store
            .put_object(
                "sales",
                "invoice-1",
                content(&["hello ", "world"]),
                Some("text/plain"),
                metadata.clone(),
            )
            .await
            .unwrap();

        let properties = store
            .get_object_properties("sales", "invoice-1")
            .await
            .unwrap();
        assert_eq!(properties.size_bytes, 11);
        assert_eq!(properties.content_type.as_deref(), Some("text/plain"));
        assert_eq!(properties.metadata, metadata);

        let (_, stream) = store.get_object("sales", "invoice-1").await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello world");
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_container() {
        let store = backend("");
        for (container, name) in [("sales", "a"), ("sales", "2024/b"), ("returns", "c")] {
            store
                .put_object(container, name, content(&["x"]), None, HashMap::new())
                .await
                .unwrap();
        }

        let mut names: Vec<String> = store
            .list_object_names("sales")
            .try_collect()
            .await
            .unwrap();
        names.sort();
        assert_eq!(names, vec!["2024/b".to_string(), "a".to_string()]);

        let empty: Vec<String> = store
            .list_object_names("archive")
            .try_collect()
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = backend("");
        store
            .put_object("sales", "invoice-1", content(&["x"]), None, HashMap::new())
            .await
            .unwrap();

        assert!(store.delete_object_if_exists("sales", "invoice-1").await.unwrap());
        assert!(!store.delete_object_if_exists("sales", "invoice-1").await.unwrap());
        assert!(store
            .get_object_properties("sales", "invoice-1")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_signing_requires_signer() {
        let store = backend("");
        let grant = SasPolicy::build_grant(SystemTime::now());
        assert!(!store.supports_signed_locator("sales", "invoice-1"));
        assert!(matches!(
            store.issue_signed_locator("sales", "invoice-1", &grant).await,
            Err(BlobError::SigningUnsupportedOrFailed { .. })
        ));

        let store = backend("uploads").with_signer(Arc::new(QuerySigner));
        assert!(store.supports_signed_locator("sales", "invoice-1"));
        let signed = store
            .issue_signed_locator("sales", "invoice-1", &grant)
            .await
            .unwrap();
        let signed = Url::parse(&signed).unwrap();
        assert_eq!(signed.path(), "/uploads/sales/invoice-1");
        let pairs: HashMap<String, String> = signed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("method").map(String::as_str), Some("GET"));
        let seconds: u64 = pairs["se"].parse().unwrap();
        assert!(seconds <= 3600 && seconds >= 3590);
    }

    #[tokio::test]
    async fn test_resolve_locator_is_canonical() {
        let store = ObjectStoreBackend::new(
            Arc::new(InMemory::new()),
            ObjectPath::from("uploads"),
            Url::parse("https://acct.blob.core.windows.net/uploads").unwrap(),
        );
        assert_eq!(
            store.resolve_locator("sales", "invoice-1"),
            "https://acct.blob.core.windows.net/uploads/sales/invoice-1"
        );
    }
}
