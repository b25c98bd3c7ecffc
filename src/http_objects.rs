use std::time::UNIX_EPOCH;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blob_gateway::{BlobDescriptor, BlobError, PutResult};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::relay::{InvalidSalesRequest, RelayReceipt};

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct BlobGateAPIError {
    #[serde(skip)]
    status_code: StatusCode,
    message: String,
}

impl BlobGateAPIError {
    pub fn new(status_code: StatusCode, message: &str) -> Self {
        Self {
            status_code,
            message: message.to_string(),
        }
    }

    pub fn internal_error(e: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string().as_str())
    }

    pub fn internal_error_str(e: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }
}

impl IntoResponse for BlobGateAPIError {
    fn into_response(self) -> Response {
        error!("API Error: {} - {}", self.status_code, self.message);
        (self.status_code, self.message).into_response()
    }
}

impl From<BlobError> for BlobGateAPIError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::InvalidArgument { .. } => Self::bad_request(&e.to_string()),
            BlobError::ObjectNotFound { .. } => Self::not_found(&e.to_string()),
            e => Self::internal_error_str(&e.to_string()),
        }
    }
}

impl From<anyhow::Error> for BlobGateAPIError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(invalid) = e.downcast_ref::<InvalidSalesRequest>() {
            return Self::bad_request(&invalid.to_string());
        }
        Self::internal_error(e)
    }
}

/// A blob with its access locator and metadata.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Blob {
    pub name: String,
    pub container_name: String,
    /// Signed and valid for one hour when the store supports signing,
    /// otherwise the canonical locator.
    pub access_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size_bytes: u64,
    /// Milliseconds since the epoch; present only for signed locators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<u64>,
}

impl From<BlobDescriptor> for Blob {
    fn from(descriptor: BlobDescriptor) -> Self {
        Self {
            access_expires_at: descriptor.access_expires_at.and_then(|t| {
                t.duration_since(UNIX_EPOCH)
                    .ok()
                    .map(|d| d.as_millis() as u64)
            }),
            name: descriptor.name,
            container_name: descriptor.container_name,
            access_uri: descriptor.access_uri,
            title: descriptor.title,
            comment: descriptor.comment,
            content_type: descriptor.content_type,
            size_bytes: descriptor.size_bytes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BlobList {
    pub blobs: Vec<Blob>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BlobNameList {
    pub names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BlobLocator {
    pub locator: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResult {
    pub locator: String,
    pub size_bytes: u64,
    pub sha256_hash: String,
}

impl From<PutResult> for UploadResult {
    fn from(put: PutResult) -> Self {
        Self {
            locator: put.locator,
            size_bytes: put.size_bytes,
            sha256_hash: put.sha256_hash,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteResult {
    pub existed: bool,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadBlob {
    #[schema(format = "binary")]
    /// File to upload
    file: String,
    /// Optional title, stored as blob metadata
    title: Option<String>,
    /// Optional comment, stored as blob metadata
    comment: Option<String>,
}

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct SalesRequestBody {
    /// Ignored; the server assigns the identifier
    id: Option<String>,
    name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SalesReceipt {
    pub id: String,
    pub message: String,
}

impl From<RelayReceipt> for SalesReceipt {
    fn from(receipt: RelayReceipt) -> Self {
        Self {
            id: receipt.id,
            message: receipt.message,
        }
    }
}
