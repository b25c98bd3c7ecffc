//! Container/name validation and locator construction.

use url::Url;

use crate::{BlobError, BlobResult};

pub fn validate_container(container: &str) -> BlobResult<()> {
    if container.is_empty() {
        return Err(BlobError::invalid_argument("container name must not be empty"));
    }
    if container.contains('/') {
        return Err(BlobError::invalid_argument(format!(
            "container name '{}' must not contain '/'",
            container
        )));
    }
    // covers "." and ".." as well as the local backend's reserved directories
    if container.starts_with('.') {
        return Err(BlobError::invalid_argument(format!(
            "container name '{}' must not start with '.'",
            container
        )));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> BlobResult<()> {
    if name.is_empty() {
        return Err(BlobError::invalid_argument("blob name must not be empty"));
    }
    for segment in name.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(BlobError::invalid_argument(format!(
                "blob name '{}' has an empty, '.' or '..' segment",
                name
            )));
        }
    }
    Ok(())
}

pub fn validate_address(container: &str, name: &str) -> BlobResult<()> {
    validate_container(container)?;
    validate_name(name)
}

/// `container/name`, used in logs and errors.
pub fn location(container: &str, name: &str) -> String {
    format!("{}/{}", container, name)
}

/// Appends the container and the name segments to `base`, percent-encoding
/// each segment.
pub fn locator(base: &Url, container: &str, name: &str) -> String {
    let mut url = base.clone();
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments
                .pop_if_empty()
                .push(container)
                .extend(name.split('/'));
        }
        Err(()) => {
            return format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                location(container, name)
            )
        }
    }
    url.to_string()
}
