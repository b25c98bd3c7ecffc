//! Local filesystem blob store backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<container>/<name>   header + content
//! <root>/.tmp/<uuid>          in-progress writes
//! ```
//!
//! Each object file starts with a big-endian `u32` length followed by a JSON
//! header holding the content type and metadata; the content follows. Writes
//! land in `.tmp` and are committed by a single rename, so readers see either
//! the previous object or the new one, never a mix.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::{
    address::{locator, location},
    BlobError,
    BlobProperties,
    BlobResult,
    BlobStore,
    ByteStream,
    SasGrant,
};

const TMP_DIR: &str = ".tmp";

/// Bytes taken by the header length prefix.
const HEADER_LEN_BYTES: u64 = 4;

/// Content type and metadata stored ahead of the content.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Local filesystem blob store.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    locator_base: Url,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, locator_base: Url) -> Self {
        Self {
            root: root.into(),
            locator_base,
        }
    }

    /// Build a store rooted at the path of a `file://` URL.
    pub fn from_url(url: &Url, locator_base: Url) -> BlobResult<Self> {
        if url.scheme() != "file" {
            return Err(BlobError::InvalidUri {
                uri: url.to_string(),
                reason: "URI must start with file://".to_string(),
            });
        }
        let root = url.to_file_path().map_err(|_| BlobError::InvalidUri {
            uri: url.to_string(),
            reason: "not a local path".to_string(),
        })?;
        Ok(Self::new(root, locator_base))
    }

    fn content_path(&self, container: &str, name: &str) -> PathBuf {
        let mut path = self.root.join(container);
        path.extend(name.split('/'));
        path
    }

    fn tmp_path(&self) -> PathBuf {
        self.root
            .join(TMP_DIR)
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Open an object and read its header. The returned file is positioned at
    /// the start of the content, and the size is taken from the opened file so
    /// it matches the bytes that will be streamed.
    async fn open_object(
        &self,
        container: &str,
        name: &str,
    ) -> BlobResult<(File, BlobProperties)> {
        let location = location(container, name);
        let mut file = File::open(self.content_path(container, name))
            .await
            .map_err(|e| io_read(location.clone(), e))?;
        let fs_metadata = file
            .metadata()
            .await
            .map_err(|e| io_read(location.clone(), e))?;
        if !fs_metadata.is_file() {
            return Err(BlobError::not_found(location));
        }

        let header_len = file
            .read_u32()
            .await
            .map_err(|e| corrupt(&location, e))? as u64;
        let mut raw = vec![0u8; header_len as usize];
        file.read_exact(&mut raw)
            .await
            .map_err(|e| corrupt(&location, e))?;
        let header: Header = serde_json::from_slice(&raw).map_err(|e| corrupt(&location, e))?;
        let size_bytes = fs_metadata
            .len()
            .checked_sub(HEADER_LEN_BYTES + header_len)
            .ok_or_else(|| corrupt(&location, anyhow::anyhow!("header exceeds file size")))?;

        Ok((
            file,
            BlobProperties {
                size_bytes,
                etag: None,
                content_type: header.content_type,
                metadata: header.metadata,
            },
        ))
    }
}

fn io_read(location: String, err: std::io::Error) -> BlobError {
    if err.kind() == ErrorKind::NotFound {
        BlobError::ObjectNotFound { location }
    } else {
        BlobError::StoreReadFailed {
            location,
            source: err.into(),
        }
    }
}

fn corrupt(location: &str, err: impl Into<anyhow::Error>) -> BlobError {
    let source: anyhow::Error = err.into();
    BlobError::StoreReadFailed {
        location: location.to_string(),
        source: source.context("malformed object header"),
    }
}

fn io_write(location: &str, err: impl Into<anyhow::Error>) -> BlobError {
    BlobError::StoreWriteFailed {
        location: location.to_string(),
        source: err.into(),
    }
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => tokio::fs::create_dir_all(parent).await,
        None => Ok(()),
    }
}

async fn write_tmp(tmp: &Path, header: &[u8], mut content: ByteStream<'_>) -> anyhow::Result<()> {
    ensure_parent(tmp).await?;
    let mut file = File::create(tmp).await?;
    file.write_u32(u32::try_from(header.len())?).await?;
    file.write_all(header).await?;
    while let Some(chunk) = content.next().await {
        file.write_all(&chunk?).await?;
    }
    file.sync_all().await?;
    Ok(())
}

async fn commit(
    tmp: &Path,
    target: &Path,
    header: &[u8],
    content: ByteStream<'_>,
) -> anyhow::Result<()> {
    write_tmp(tmp, header, content).await?;
    ensure_parent(target).await?;
    tokio::fs::rename(tmp, target).await?;
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_object(
        &self,
        container: &str,
        name: &str,
        content: ByteStream<'_>,
        content_type: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> BlobResult<()> {
        let location = location(container, name);
        let header = Header {
            content_type: content_type.map(str::to_string),
            metadata,
        };
        let header = serde_json::to_vec(&header).map_err(|e| io_write(&location, e))?;

        let tmp = self.tmp_path();
        if let Err(e) = commit(&tmp, &self.content_path(container, name), &header, content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_write(&location, e));
        }
        Ok(())
    }

    fn list_object_names(&self, container: &str) -> BoxStream<'static, BlobResult<String>> {
        let base = self.root.join(container);
        let container = container.to_string();

        async_stream::try_stream! {
            // (directory, name prefix relative to the container)
            let mut pending = vec![(base, String::new())];
            while let Some((dir, prefix)) = pending.pop() {
                let mut entries = match tokio::fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => Err(io_read(container.clone(), e))?,
                };

                let mut files = Vec::new();
                let mut dirs = Vec::new();
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| io_read(container.clone(), e))?
                {
                    let Ok(file_name) = entry.file_name().into_string() else {
                        continue;
                    };
                    let file_type = entry
                        .file_type()
                        .await
                        .map_err(|e| io_read(container.clone(), e))?;
                    let relative = format!("{}{}", prefix, file_name);
                    if file_type.is_dir() {
                        dirs.push((entry.path(), format!("{}/", relative)));
                    } else {
                        files.push(relative);
                    }
                }

                files.sort();
                for name in files {
                    yield name;
                }
                // popped from the back, so push in reverse to visit in order
                dirs.sort_by(|a, b| b.1.cmp(&a.1));
                pending.extend(dirs);
            }
        }
        .boxed()
    }

    async fn get_object_properties(
        &self,
        container: &str,
        name: &str,
    ) -> BlobResult<BlobProperties> {
        let (_, properties) = self.open_object(container, name).await?;
        Ok(properties)
    }

    async fn get_object(
        &self,
        container: &str,
        name: &str,
    ) -> BlobResult<(BlobProperties, ByteStream<'static>)> {
        let location = location(container, name);
        let (file, properties) = self.open_object(container, name).await?;
        let stream = ReaderStream::new(file)
            .map_err(move |e| anyhow::anyhow!("error reading file {}: {}", location, e))
            .boxed();
        Ok((properties, stream))
    }

    async fn delete_object_if_exists(&self, container: &str, name: &str) -> BlobResult<bool> {
        match tokio::fs::remove_file(self.content_path(container, name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_write(&location(container, name), e)),
        }
    }

    fn resolve_locator(&self, container: &str, name: &str) -> String {
        locator(&self.locator_base, container, name)
    }

    fn supports_signed_locator(&self, _container: &str, _name: &str) -> bool {
        false
    }

    async fn issue_signed_locator(
        &self,
        container: &str,
        name: &str,
        _grant: &SasGrant,
    ) -> BlobResult<String> {
        Err(BlobError::signing(
            location(container, name),
            "local filesystem has no signed locators",
        ))
    }
}
