//! Multipart upload configuration and the structured payload shape
//!
//! spec.md §3 ("UploadsConfig", "StructuredPayload") and §4.6 (the
//! upload front-end). The data model and the fail-fast validator chain
//! ([`validate`]) need nothing beyond `serde_json`/`base64` and are
//! always available; wire parsing ([`parse`]) is built on `multer`, the
//! same crate volga's `Multipart` extractor wraps
//! (`http/endpoints/args/multipart.rs`), and is gated behind the
//! `multipart` feature.

#[cfg(feature = "multipart")]
pub mod parse;
pub mod validate;

use std::collections::HashMap;

use base64::Engine as _;
use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{json, Value};

const DEFAULT_MAX_FILES: usize = 10;
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_MIN_FILE_SIZE: u64 = 1;
const DEFAULT_MAX_TOTAL_SIZE: u64 = 20 * 1024 * 1024;
const DEFAULT_MAX_FILENAME_LENGTH: usize = 128;

/// Size and count ceilings for a single upload request
/// (spec.md §3, "limits").
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: u64,
    pub min_file_size: u64,
    pub max_total_size: u64,
    pub max_filename_length: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            min_file_size: DEFAULT_MIN_FILE_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
            max_filename_length: DEFAULT_MAX_FILENAME_LENGTH,
        }
    }
}

/// MIME type / extension allowlist (spec.md §3, "allow").
#[derive(Debug, Clone)]
pub struct UploadAllowlist {
    pub mime_types: Vec<String>,
    pub extensions: Vec<String>,
}

impl Default for UploadAllowlist {
    fn default() -> Self {
        Self {
            mime_types: vec!["image/png".into(), "image/jpeg".into(), "application/pdf".into()],
            extensions: vec!["png".into(), "jpg".into(), "jpeg".into(), "pdf".into()],
        }
    }
}

/// Engine-level upload configuration (spec.md §3, "UploadsConfig").
#[derive(Debug, Clone)]
pub struct UploadsConfig {
    pub enforce_content_type: bool,
    pub limits: UploadLimits,
    pub allow: UploadAllowlist,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self { enforce_content_type: false, limits: UploadLimits::default(), allow: UploadAllowlist::default() }
    }
}

impl UploadsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enforce_content_type(mut self, enforce: bool) -> Self {
        self.enforce_content_type = enforce;
        self
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_allow(mut self, allow: UploadAllowlist) -> Self {
        self.allow = allow;
        self
    }
}

/// One uploaded file (spec.md §3, "File"). `data` is held as `Bytes` so
/// saving or forwarding it never requires a re-copy.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub data: Bytes,
}

impl UploadedFile {
    /// Base64-encodes the file into the same JSON shape a handler sees
    /// once the structured payload becomes the engine's `Value` input —
    /// the representation that keeps the JSON and multipart front-ends
    /// producing the exact same engine input shape (spec.md §9, Open
    /// Questions: "both … yield the same engine input shape").
    pub fn to_value(&self) -> Value {
        json!({
            "filename": self.filename,
            "contentType": self.content_type,
            "size": self.size,
            "data": base64::engine::general_purpose::STANDARD.encode(&self.data),
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        let filename = value.get("filename").and_then(Value::as_str).ok_or("file missing filename")?.to_string();
        let content_type = value.get("contentType").and_then(Value::as_str).unwrap_or("application/octet-stream").to_string();
        let size = value.get("size").and_then(Value::as_u64).unwrap_or(0);
        let data = value
            .get("data")
            .and_then(Value::as_str)
            .ok_or("file missing data")
            .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).map_err(|e| e.to_string()))?;
        Ok(Self { filename, content_type, size, data: Bytes::from(data) })
    }

    fn extension(&self) -> Option<&str> {
        self.filename.rsplit_once('.').map(|(_, ext)| ext)
    }
}

/// A field or file value that may appear once or repeated under the same
/// key (spec.md §3: "duplicate keys aggregate into arrays").
#[derive(Debug, Clone)]
pub enum Multi<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> Multi<T> {
    fn push(&mut self, value: T) {
        *self = match std::mem::replace(self, Multi::Many(Vec::new())) {
            Multi::Single(existing) => Multi::Many(vec![existing, value]),
            Multi::Many(mut items) => {
                items.push(value);
                Multi::Many(items)
            }
        };
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        match self {
            Multi::Single(v) => Box::new(std::iter::once(v)),
            Multi::Many(items) => Box::new(items.iter()),
        }
    }
}

/// The parsed multipart body before validation (spec.md §3,
/// "StructuredPayload"). `fields` holds string values; `files` holds
/// [`UploadedFile`]s. In [`crate::registry::UploadMode::Flat`] mode the
/// two key spaces are disjoint by construction — see [`parse`].
#[derive(Debug, Clone, Default)]
pub struct StructuredPayload {
    pub fields: IndexMap<String, Multi<String>>,
    pub files: IndexMap<String, Multi<UploadedFile>>,
}

impl StructuredPayload {
    pub fn total_file_size(&self) -> u64 {
        self.files.values().flat_map(|m| m.iter()).map(|f| f.size).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files.values().map(|m| match m {
            Multi::Single(_) => 1,
            Multi::Many(items) => items.len(),
        }).sum()
    }

    /// Renders the same `{fields, files}` shape the engine expects as
    /// its execute payload, whether it arrived via JSON or multipart.
    pub fn to_value(&self) -> Value {
        let fields: HashMap<&str, Value> = self
            .fields
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Multi::Single(s) => Value::String(s.clone()),
                    Multi::Many(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
                };
                (k.as_str(), value)
            })
            .collect();

        let files: HashMap<&str, Value> = self
            .files
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Multi::Single(f) => f.to_value(),
                    Multi::Many(items) => Value::Array(items.iter().map(UploadedFile::to_value).collect()),
                };
                (k.as_str(), value)
            })
            .collect();

        json!({ "fields": fields, "files": files })
    }
}
