//! Multipart body parsing into the routing envelope + structured payload
//!
//! Built on `multer`, the crate volga's own `Multipart` extractor wraps.
//! Unlike volga's extractor (which hands the raw stream to the handler),
//! this parser fully drains the body up front because file sizes must be
//! known before the validator chain runs (spec.md §5, "Upload
//! streaming": "a streaming implementation must verify the size
//! incrementally and abort early once a … limit is exceeded" — draining
//! per-field as it streams satisfies that without buffering the whole
//! request body at once).

use std::collections::HashSet;

use bytes::Bytes;
use futures_util::Stream;
use indexmap::IndexMap;

use super::{Multi, StructuredPayload, UploadedFile};
use crate::error::EngineError;
use crate::registry::UploadMode;

/// The three routing fields plus everything else, already separated into
/// `fields`/`files` (spec.md §4.6, Steps 1 and 3).
pub struct ParsedEnvelope {
    pub intent: String,
    pub service: String,
    pub action: String,
    pub payload: StructuredPayload,
}

fn insert<T>(map: &mut IndexMap<String, Multi<T>>, key: String, value: T) {
    match map.get_mut(&key) {
        Some(existing) => existing.push(value),
        None => {
            map.insert(key, Multi::Single(value));
        }
    }
}

/// Parses a multipart body into [`ParsedEnvelope`]. `mode` selects
/// whether a key used for both a file and a string field is rejected
/// (`Flat`) or permitted because the two are kept in separate maps
/// (`Structured`, the default per spec.md §3).
pub async fn parse_multipart<S, E>(stream: S, boundary: String, mode: UploadMode) -> Result<ParsedEnvelope, EngineError>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut intent = None;
    let mut service = None;
    let mut action = None;
    let mut fields: IndexMap<String, Multi<String>> = IndexMap::new();
    let mut files: IndexMap<String, Multi<UploadedFile>> = IndexMap::new();
    let mut field_keys: HashSet<String> = HashSet::new();
    let mut file_keys: HashSet<String> = HashSet::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| EngineError::envelope(format!("Multipart error: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else { continue };
        let file_name = field.file_name().map(str::to_string);

        if let Some(file_name) = file_name {
            // Falls back to guessing from the filename's extension when the
            // part carries no explicit `Content-Type`, the same fallback
            // volga's static file server uses `mime_guess` for.
            let content_type = field
                .content_type()
                .map(|m| m.to_string())
                .unwrap_or_else(|| mime_guess::from_path(&file_name).first_or_octet_stream().to_string());
            let data = field.bytes().await.map_err(|e| EngineError::envelope(format!("Multipart error: {e}")))?;
            let size = data.len() as u64;

            if mode == UploadMode::Flat && field_keys.contains(&name) {
                return Err(EngineError::envelope("mixed key types not allowed"));
            }
            file_keys.insert(name.clone());
            insert(&mut files, name, UploadedFile { filename: file_name, content_type, size, data });
        } else {
            let text = field.text().await.map_err(|e| EngineError::envelope(format!("Multipart error: {e}")))?;
            match name.as_str() {
                "intent" => intent = Some(text),
                "service" => service = Some(text),
                "action" => action = Some(text),
                _ => {
                    if mode == UploadMode::Flat && file_keys.contains(&name) {
                        return Err(EngineError::envelope("mixed key types not allowed"));
                    }
                    field_keys.insert(name.clone());
                    insert(&mut fields, name, text);
                }
            }
        }
    }

    let (intent, service, action) = match (intent, service, action) {
        (Some(i), Some(s), Some(a)) => (i, s, a),
        _ => {
            return Err(EngineError::envelope(
                "Form-data must include 'intent', 'service', and 'action' fields",
            ))
        }
    };

    Ok(ParsedEnvelope { intent, service, action, payload: StructuredPayload { fields, files } })
}

/// Re-checks `UploadMode::Flat`'s key-disjointness rule against an
/// already-parsed [`StructuredPayload`]. `parse_multipart` enforces this
/// inline while streaming, but a transport that doesn't know which action
/// it's routing to until the routing fields inside the same body have
/// been read (spec.md §3, `isSpecial.uploadMode` is per-action) has to
/// parse permissively first and re-apply the rule once the action is
/// resolved.
pub fn enforce_mode(payload: &StructuredPayload, mode: UploadMode) -> Result<(), EngineError> {
    if mode != UploadMode::Flat {
        return Ok(());
    }
    if payload.fields.keys().any(|key| payload.files.contains_key(key)) {
        return Err(EngineError::envelope("mixed key types not allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn body(raw: &'static str) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(vec![Ok(Bytes::from_static(raw.as_bytes()))])
    }

    #[tokio::test]
    async fn it_parses_routing_fields_and_a_file() {
        let raw = "--B\r\n\
                    Content-Disposition: form-data; name=\"intent\"\r\n\r\nexecute\r\n--B\r\n\
                    Content-Disposition: form-data; name=\"service\"\r\n\r\ndocuments\r\n--B\r\n\
                    Content-Disposition: form-data; name=\"action\"\r\n\r\nuploadDoc\r\n--B\r\n\
                    Content-Disposition: form-data; name=\"document\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\nabc\r\n--B--\r\n";

        let parsed = parse_multipart(body(raw), "B".to_string(), UploadMode::Structured).await.unwrap();
        assert_eq!(parsed.intent, "execute");
        assert_eq!(parsed.service, "documents");
        assert_eq!(parsed.action, "uploadDoc");
        assert_eq!(parsed.payload.files.len(), 1);
    }

    #[tokio::test]
    async fn it_fails_when_routing_fields_are_missing() {
        let raw = "--B\r\nContent-Disposition: form-data; name=\"intent\"\r\n\r\nexecute\r\n--B--\r\n";
        let err = parse_multipart(body(raw), "B".to_string(), UploadMode::Structured).await.unwrap_err();
        assert!(err.to_string().contains("must include"));
    }
}
