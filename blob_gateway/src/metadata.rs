//! Blob metadata structures and the codec between the typed descriptor and
//! the flat metadata map stored alongside each object.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding the blob title.
pub const TITLE_KEY: &str = "title";

/// Metadata key holding the blob comment.
pub const COMMENT_KEY: &str = "comment";

/// Descriptive metadata attached to a blob on upload.
///
/// `None` means the key is absent from the stored map. `Some("")` is kept as
/// an explicit empty value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl BlobMetadata {
    pub fn new(title: Option<String>, comment: Option<String>) -> Self {
        Self { title, comment }
    }

    /// Encode into the store's metadata map. Absent fields emit no key.
    pub fn encode(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        if let Some(title) = &self.title {
            metadata.insert(TITLE_KEY.to_string(), title.clone());
        }
        if let Some(comment) = &self.comment {
            metadata.insert(COMMENT_KEY.to_string(), comment.clone());
        }
        metadata
    }

    /// Decode from a store metadata map. Unknown keys are ignored.
    pub fn decode(metadata: &HashMap<String, String>) -> Self {
        Self {
            title: metadata.get(TITLE_KEY).cloned(),
            comment: metadata.get(COMMENT_KEY).cloned(),
        }
    }
}

/// Properties reported by the store for a single object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobProperties {
    /// Size in bytes.
    pub size_bytes: u64,

    /// ETag from object store (S3/GCS/Azure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Content type committed as a transport header on upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// User metadata, keys as stored.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_descriptors() -> Vec<BlobMetadata> {
        let values = [None, Some(String::new()), Some("Invoice".to_string())];
        let mut out = Vec::new();
        for title in &values {
            for comment in &values {
                out.push(BlobMetadata::new(title.clone(), comment.clone()));
            }
        }
        out
    }

    #[test]
    fn test_decode_inverts_encode() {
        for descriptor in all_descriptors() {
            assert_eq!(
                BlobMetadata::decode(&descriptor.encode()),
                descriptor,
                "round trip failed for {:?}",
                descriptor
            );
        }
    }

    #[test]
    fn test_encode_omits_absent_fields() {
        let metadata = BlobMetadata::new(Some("Invoice".to_string()), None).encode();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get(TITLE_KEY).map(String::as_str), Some("Invoice"));
        assert!(!metadata.contains_key(COMMENT_KEY));

        assert!(BlobMetadata::default().encode().is_empty());
    }

    #[test]
    fn test_decode_ignores_unknown_keys() {
        let metadata = HashMap::from([
            ("comment".to_string(), "paid".to_string()),
            ("region".to_string(), "emea".to_string()),
        ]);
        let decoded = BlobMetadata::decode(&metadata);
        assert_eq!(decoded.title, None);
        assert_eq!(decoded.comment.as_deref(), Some("paid"));
    }
}
