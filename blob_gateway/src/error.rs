//! Error types for blob gateway operations.

/// Result type for blob gateway operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur while addressing, writing, reading or signing blobs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BlobError {
    /// Empty or malformed container/blob name. Raised before any remote call.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The store did not confirm a write.
    #[error("failed to write blob {location}: {source}")]
    StoreWriteFailed {
        location: String,
        source: anyhow::Error,
    },

    /// The store failed to list, read or describe an object.
    #[error("failed to read {location}: {source}")]
    StoreReadFailed {
        location: String,
        source: anyhow::Error,
    },

    /// The backend cannot issue signed locators, or issuing one failed.
    #[error("signed locator unavailable for {location}: {reason}")]
    SigningUnsupportedOrFailed { location: String, reason: String },

    /// The object does not exist.
    #[error("blob not found: {location}")]
    ObjectNotFound { location: String },

    /// Invalid storage URI in configuration.
    #[error("invalid blob storage uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Storage URI scheme has no backend compiled in.
    #[error("unsupported blob storage backend: {scheme}")]
    UnsupportedBackend { scheme: String },
}

impl BlobError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        BlobError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn not_found(location: impl Into<String>) -> Self {
        BlobError::ObjectNotFound {
            location: location.into(),
        }
    }

    pub fn signing(location: impl Into<String>, reason: impl Into<String>) -> Self {
        BlobError::SigningUnsupportedOrFailed {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Classifies an `object_store` failure during a write.
    pub fn write(location: impl Into<String>, err: object_store::Error) -> Self {
        BlobError::StoreWriteFailed {
            location: location.into(),
            source: anyhow::Error::from(err),
        }
    }

    /// Classifies an `object_store` failure during a read. A missing object
    /// becomes [`BlobError::ObjectNotFound`].
    pub fn read(location: impl Into<String>, err: object_store::Error) -> Self {
        let location = location.into();
        match err {
            object_store::Error::NotFound { .. } => BlobError::ObjectNotFound { location },
            err => BlobError::StoreReadFailed {
                location,
                source: anyhow::Error::from(err),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::ObjectNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_maps_not_found() {
        let err = BlobError::read(
            "sales/invoice-1",
            object_store::Error::NotFound {
                path: "sales/invoice-1".to_string(),
                source: "missing".into(),
            },
        );
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "blob not found: sales/invoice-1");
    }

    #[test]
    fn test_read_error_keeps_other_failures() {
        let err = BlobError::read(
            "sales",
            object_store::Error::Generic {
                store: "test",
                source: "connection reset".into(),
            },
        );
        assert!(matches!(err, BlobError::StoreReadFailed { .. }));
    }
}
