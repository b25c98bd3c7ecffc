//! Shared access signature policy for signed blob locators.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// How long a signed locator minted during enrichment stays valid.
pub const SAS_VALIDITY: Duration = Duration::from_secs(60 * 60);

/// Maximum presigned URL expiry (7 days for S3).
pub const MAX_PRESIGN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// HTTP method a signed locator is valid for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
}

/// Resource a grant is scoped to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SasScope {
    /// One blob, addressed by container and name at signing time.
    Blob,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SasPermission {
    Read,
}

impl SasPermission {
    pub fn method(&self) -> HttpMethod {
        match self {
            SasPermission::Read => HttpMethod::Get,
        }
    }
}

/// A single-use signing request. Built fresh for every object and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasGrant {
    pub scope: SasScope,
    pub permission: SasPermission,
    pub issued_at: SystemTime,
    pub expires_at: SystemTime,
}

impl SasGrant {
    /// Remaining validity measured from `now`. Zero once expired.
    pub fn expires_in(&self, now: SystemTime) -> Duration {
        self.expires_at
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }
}

/// Decides whether a locator gets signed and what the grant looks like.
pub struct SasPolicy;

impl SasPolicy {
    pub fn should_sign(supports_signed_locator: bool) -> bool {
        supports_signed_locator
    }

    /// Read-only, single-blob grant valid for [`SAS_VALIDITY`] from `now`.
    pub fn build_grant(now: SystemTime) -> SasGrant {
        SasGrant {
            scope: SasScope::Blob,
            permission: SasPermission::Read,
            issued_at: now,
            expires_at: now + SAS_VALIDITY,
        }
    }
}

/// Validate presigned URL expiry duration.
pub fn validate_expiry(expires_in: Duration) -> Result<(), String> {
    if expires_in > MAX_PRESIGN_EXPIRY {
        Err(format!(
            "Expiry duration {:?} exceeds maximum allowed {:?}",
            expires_in, MAX_PRESIGN_EXPIRY
        ))
    } else if expires_in.is_zero() {
        Err("Expiry duration must be greater than zero".to_string())
    } else {
        Ok(())
    }
}
