//! Photo naming rules
//!
//! A photo lives in the container named after its (normalized) category, under
//! a blob name that is unique per upload:
//!
//! ```text
//! {category}/
//! └── {prefix}{uuid}{extension}      e.g. productphoto3f0c...e1.jpg
//! ```
//!
//! The blob's canonical URL is the only handle callers keep, so deletion
//! recovers the blob name from the last URL segment.

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use std::fmt;
use uuid::Uuid;

/// Content type assumed when the client did not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A normalized category, usable directly as a container name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category(String);

impl Category {
    /// Lower-case and trim a raw category. Returns `None` if nothing is left.
    pub fn normalize(raw: &str) -> Option<Self> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            None
        } else {
            Some(Self(name))
        }
    }

    /// Container name for this category
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file received from a client, read once and then dropped
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as sent by the client, possibly including a path
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Extension of the original file name, dot included
    pub fn extension(&self) -> &str {
        file_extension(&self.file_name)
    }
}

/// Extension of the last path component of `file_name`, including the dot.
///
/// Both `/` and `\` count as separators since some browsers still send full
/// client-side paths. A dot-file's whole name is its extension (`.hidden`);
/// names ending in a dot have none.
pub fn file_extension(file_name: &str) -> &str {
    let base = file_name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name);

    match base.rfind('.') {
        None => "",
        Some(idx) if idx == base.len() - 1 => "",
        Some(idx) => &base[idx..],
    }
}

/// Build a fresh blob name: `{prefix}{uuid}{extension}`
pub fn generate_blob_name(prefix: &str, extension: &str) -> String {
    format!("{}{}{}", prefix, Uuid::new_v4(), extension)
}

/// Recover the blob name from a canonical URL: everything after the last `/`,
/// percent-decoded.
pub fn blob_name_from_url(url: &str) -> String {
    let raw = url.rsplit('/').next().unwrap_or(url);
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
