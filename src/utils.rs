//! Utility functions for filename resolution and path manipulation

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Fallback filename when a URL carries no usable path segment
pub const FALLBACK_FILENAME: &str = "download";

/// Derive a filename from a URL's last path segment
///
/// Percent-encoded segments are decoded (`report%202024.pdf` becomes
/// `report 2024.pdf`). Query strings and fragments are not part of the path
/// and never leak into the name. Falls back to [`FALLBACK_FILENAME`] when
/// the URL has no usable segment (e.g. `http://host/`).
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url)
        && let Some(mut segments) = parsed.path_segments()
        && let Some(last_segment) = segments.next_back()
        && !last_segment.is_empty()
    {
        if let Ok(decoded) = urlencoding::decode(last_segment) {
            return decoded.into_owned();
        }
        return last_segment.to_string();
    }

    FALLBACK_FILENAME.to_string()
}

/// Extract the extension of a filename, lowercased, without the dot
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Map a declared media type to a file extension
///
/// Parameters (`; charset=utf-8`) are ignored. Returns None for unknown
/// types; the filename is then left without an extension.
pub fn extension_for_media_type(media_type: &str) -> Option<&'static str> {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or(media_type)
        .trim()
        .to_lowercase();

    match essence.as_str() {
        "application/pdf" => Some("pdf"),
        "application/zip" => Some("zip"),
        "application/gzip" => Some("gz"),
        "application/json" => Some("json"),
        "application/xml" | "text/xml" => Some("xml"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "application/vnd.ms-excel" => Some("xls"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some("xlsx"),
        "text/plain" => Some("txt"),
        "text/csv" => Some("csv"),
        "text/html" => Some("html"),
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "audio/mpeg" => Some("mp3"),
        "video/mp4" => Some("mp4"),
        _ => None,
    }
}

/// Find a collision-free path for a file, appending ` (n)` before the
/// extension until a free name is found
///
/// # Examples
///
/// ```
/// use fetchwatch::utils::unique_path;
/// use std::path::Path;
///
/// let unique = unique_path(Path::new("/tmp/report.pdf")).unwrap();
/// // If /tmp/report.pdf exists, returns /tmp/report (1).pdf
/// // If that exists too, returns /tmp/report (2).pdf, etc.
/// ```
pub fn unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Other(format!("cannot extract file stem from {}", path.display())))?;

    let extension = path.extension().and_then(|e| e.to_str());

    let parent = path.parent().ok_or_else(|| {
        Error::Other(format!(
            "cannot extract parent directory from {}",
            path.display()
        ))
    })?;

    // Try adding (1), (2), (3), ... until we find a unique name
    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::Other(format!(
        "could not find unique filename for {} after {} attempts",
        path.display(),
        MAX_RENAME_ATTEMPTS
    )))
}
