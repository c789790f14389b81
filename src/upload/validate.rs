//! The seven-stage fail-fast upload validator chain (spec.md §4.6)

use mime::Mime;
use serde_json::json;

use super::{StructuredPayload, UploadsConfig};
use crate::error::EngineError;

/// `true` when `allowed` (a configured allowlist entry, e.g. `"image/png"`)
/// names the same type/subtype as `declared`, ignoring any `Mime`
/// parameters (`charset`, `boundary`, …).
fn essence_matches(allowed: &str, declared: &Mime) -> bool {
    allowed
        .parse::<Mime>()
        .map(|allowed| allowed.type_() == declared.type_() && allowed.subtype() == declared.subtype())
        .unwrap_or(false)
}

fn validation_error(message: impl Into<String>, data: serde_json::Value) -> EngineError {
    let mut data = data;
    if let serde_json::Value::Object(map) = &mut data {
        map.insert("error_category".into(), json!("validation"));
    }
    EngineError::validation(message).with_data(data)
}

/// Runs the chain in the exact documented order, returning on the first
/// failure (spec.md §4.6, "File validation chain").
pub fn validate(payload: &StructuredPayload, config: &UploadsConfig) -> Result<(), EngineError> {
    let files: Vec<&super::UploadedFile> = payload.files.values().flat_map(|m| m.iter()).collect();

    // 1. filename length
    for file in &files {
        if file.filename.len() > config.limits.max_filename_length {
            return Err(validation_error(
                "upload limit exceeded",
                json!({"limit": "maxFilenameLength", "max": config.limits.max_filename_length, "files": [file.filename]}),
            ));
        }
    }

    // 2. no zero-byte files, unconditionally — runs before the min-size check
    // even when `minFileSize` is configured as 0 (spec.md §8, Boundaries).
    for file in &files {
        if file.size == 0 {
            return Err(validation_error(
                "empty file not allowed",
                json!({"files": [file.filename]}),
            ));
        }
    }

    // 3. minimum size
    for file in &files {
        if file.size < config.limits.min_file_size {
            return Err(validation_error(
                "upload limit exceeded",
                json!({"limit": "minFileSize", "max": config.limits.min_file_size, "files": [file.filename]}),
            ));
        }
    }

    // 4. file count
    if files.len() > config.limits.max_files {
        return Err(validation_error(
            "upload limit exceeded",
            json!({"limit": "maxFiles", "max": config.limits.max_files}),
        ));
    }

    // 5. per-file size
    for file in &files {
        if file.size > config.limits.max_file_size {
            return Err(validation_error(
                "upload limit exceeded",
                json!({"limit": "maxFileSize", "max": config.limits.max_file_size, "files": [file.filename]}),
            ));
        }
    }

    // 6. total size
    let total: u64 = files.iter().map(|f| f.size).sum();
    if total > config.limits.max_total_size {
        return Err(validation_error(
            "upload limit exceeded",
            json!({"limit": "maxTotalSize", "max": config.limits.max_total_size}),
        ));
    }

    // 7. MIME + extension allowlist. Parsed as `mime::Mime` rather than
    // compared as raw strings so `image/png; charset=binary` still matches
    // `image/png`, the same normalization volga relies on `mime` for
    // elsewhere in its own content-type handling.
    for file in &files {
        let declared: Option<Mime> = file.content_type.parse().ok();
        let mime_ok = declared
            .map(|m| config.allow.mime_types.iter().any(|allowed| essence_matches(allowed, &m)))
            .unwrap_or(false);
        let ext_ok = file
            .extension()
            .map(|ext| config.allow.extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if !mime_ok || !ext_ok {
            return Err(validation_error(
                "file type not allowed",
                json!({"files": [file.filename], "contentType": file.content_type}),
            ));
        }
    }

    Ok(())
}
