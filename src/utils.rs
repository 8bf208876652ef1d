//! Utility functions for file operations and path manipulation

use crate::error::{Error, Result};
use std::path::Path;

/// Lower-cased extension of the last path segment of `url`
///
/// Query string and fragment are ignored. Returns an empty string when the
/// segment has no extension.
///
/// # Examples
///
/// ```
/// use likes_dl::utils::file_extension_from_url;
///
/// assert_eq!(file_extension_from_url("https://cdn.example/v/a.MP4?x=1"), "mp4");
/// assert_eq!(file_extension_from_url("https://cdn.example/v/raw"), "");
/// ```
pub fn file_extension_from_url(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // Not an absolute URL; strip query/fragment by hand
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let name = path.rsplit('/').next().unwrap_or_default();
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Join `stem` and `ext` as `stem.ext`, or just `stem` when `ext` is empty
pub fn with_extension(stem: &str, ext: &str) -> String {
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{ext}")
    }
}

/// Reject names that could escape the directory they are joined onto
pub fn check_path_component(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0')
    {
        return Err(Error::Validation(format!(
            "{name:?} is not a plain file name"
        )));
    }
    Ok(())
}

/// Create the parent directory of `path` if it does not exist
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::fs(parent, e))?;
    }
    Ok(())
}

/// Delete `path`, ignoring every error (missing file included)
pub async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::debug!(path = %path.display(), error = %e, "could not remove partial file");
    }
}
