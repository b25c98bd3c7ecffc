//! A scripted [`BlobStore`] for gateway tests.
//!
//! Content lives in an in-memory backend; properties calls can be delayed,
//! failed or left pending per name, and signing can be toggled.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use object_store::{memory::InMemory, path::Path as ObjectPath};
use url::Url;

use crate::{
    backends::object_store::ObjectStoreBackend,
    BlobError,
    BlobProperties,
    BlobResult,
    BlobStore,
    ByteStream,
    SasGrant,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signing {
    Unsupported,
    Succeeds,
    Fails,
}

struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedStore {
    inner: ObjectStoreBackend,
    signing: Signing,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    pending: HashSet<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        let base = Url::parse("memory:///").expect("static url");
        Self {
            inner: ObjectStoreBackend::new(Arc::new(InMemory::new()), ObjectPath::from(""), base),
            signing: Signing::Unsupported,
            delays: HashMap::new(),
            failing: HashSet::new(),
            pending: HashSet::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_signing(mut self, signing: Signing) -> Self {
        self.signing = signing;
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn with_failing_properties(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_pending(mut self, names: &[&str]) -> Self {
        self.pending.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Store calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Names whose properties calls finished, in completion order.
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for ScriptedStore {
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        content: ByteStream<'_>,
        content_type: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> BlobResult<()> {
        self.count();
        self.inner
            .put_object(container, name, content, content_type, metadata)
            .await
    }

    fn list_object_names(&self, container: &str) -> BoxStream<'static, BlobResult<String>> {
        self.count();
        self.inner.list_object_names(container)
    }

    async fn get_object_properties(
        &self,
        container: &str,
        name: &str,
    ) -> BlobResult<BlobProperties> {
        self.count();
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        if self.pending.contains(name) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }
        self.completed.lock().unwrap().push(name.to_string());
        if self.failing.contains(name) {
            return Err(BlobError::StoreReadFailed {
                location: format!("{}/{}", container, name),
                source: anyhow::anyhow!("scripted properties failure"),
            });
        }
        self.inner.get_object_properties(container, name).await
    }

    async fn get_object(
        &self,
        container: &str,
        name: &str,
    ) -> BlobResult<(BlobProperties, ByteStream<'static>)> {
        self.count();
        self.inner.get_object(container, name).await
    }

    async fn delete_object_if_exists(&self, container: &str, name: &str) -> BlobResult<bool> {
        self.count();
        self.inner.delete_object_if_exists(container, name).await
    }

    fn resolve_locator(&self, container: &str, name: &str) -> String {
        self.inner.resolve_locator(container, name)
    }

    fn supports_signed_locator(&self, _container: &str, _name: &str) -> bool {
        self.signing != Signing::Unsupported
    }

    async fn issue_signed_locator(
        &self,
        container: &str,
        name: &str,
        grant: &SasGrant,
    ) -> BlobResult<String> {
        self.count();
        match self.signing {
            Signing::Succeeds => {
                let expires = grant
                    .expires_at
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                Ok(format!(
                    "https://signed.example.com/{}/{}?sp=r&se={}",
                    container, name, expires
                ))
            }
            Signing::Unsupported | Signing::Fails => Err(BlobError::signing(
                format!("{}/{}", container, name),
                "scripted signing failure",
            )),
        }
    }
}
