//! `SourceEvent` extraction from a raw queue payload (spec §4.1).

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};

/// An immutable value derived from one queue message. Exists from dequeue
/// until the message is deleted or becomes visible again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub bucket: String,
    pub object_key: String,
    pub feed_tag: String,
    pub receipt_token: String,
    pub message_id: String,
}

#[derive(Debug, Snafu)]
pub enum ExtractError {
    #[snafu(display("message body is not valid JSON: {source}"))]
    InvalidJson { source: serde_json::Error },
    #[snafu(display("message body matched neither recognized event shape"))]
    UnrecognizedShape,
}

#[derive(Debug, Deserialize)]
struct BucketRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    key: String,
}

#[derive(Debug, Deserialize)]
struct S3Detail {
    bucket: BucketRef,
    object: ObjectRef,
}

#[derive(Debug, Deserialize)]
struct EventBridgeShape {
    detail: S3Detail,
}

#[derive(Debug, Deserialize)]
struct S3Record {
    s3: S3Detail,
}

#[derive(Debug, Deserialize)]
struct RecordsShape {
    #[serde(rename = "Records")]
    records: Vec<S3Record>,
}

/// Parses either of the two accepted payload shapes into a `SourceEvent`.
/// Pure: performs no I/O and has no side effects.
pub fn extract(
    body: &str,
    message_id: impl Into<String>,
    receipt_token: impl Into<String>,
) -> Result<SourceEvent, ExtractError> {
    let value: serde_json::Value = serde_json::from_str(body).context(InvalidJsonSnafu)?;

    let detail = if let Ok(shape) = serde_json::from_value::<EventBridgeShape>(value.clone()) {
        shape.detail
    } else if let Ok(shape) = serde_json::from_value::<RecordsShape>(value) {
        shape
            .records
            .into_iter()
            .next()
            .ok_or(ExtractError::UnrecognizedShape)?
            .s3
    } else {
        return Err(ExtractError::UnrecognizedShape);
    };

    let bucket = detail.bucket.name;
    let object_key = percent_decode_str(&detail.object.key)
        .decode_utf8_lossy()
        .into_owned();
    let feed_tag = feed_tag_of(&object_key);

    Ok(SourceEvent {
        bucket,
        object_key,
        feed_tag,
        receipt_token: receipt_token.into(),
        message_id: message_id.into(),
    })
}

/// The path segment immediately preceding the filename, or empty if the key
/// has no `/`.
fn feed_tag_of(object_key: &str) -> String {
    match object_key.rsplit_once('/') {
        Some((rest, _filename)) => rest
            .rsplit_once('/')
            .map(|(_, tag)| tag)
            .unwrap_or(rest)
            .to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_event_bridge_shape() {
        let body = r#"{"detail":{"bucket":{"name":"my-bucket"},"object":{"key":"raw/feedA/file.txt"}}}"#;
        let event = extract(body, "m1", "r1").unwrap();
        assert_eq!(event.bucket, "my-bucket");
        assert_eq!(event.object_key, "raw/feedA/file.txt");
        assert_eq!(event.feed_tag, "feedA");
    }

    #[test]
    fn accepts_records_array_shape() {
        let body = r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"x/y/z.txt"}}}]}"#;
        let event = extract(body, "m1", "r1").unwrap();
        assert_eq!(event.bucket, "b");
        assert_eq!(event.feed_tag, "y");
    }

    #[test]
    fn percent_decodes_key() {
        let body = r#"{"detail":{"bucket":{"name":"b"},"object":{"key":"a%2Fb%3Dc/file.txt"}}}"#;
        let event = extract(body, "m1", "r1").unwrap();
        assert_eq!(event.object_key, "a/b=c/file.txt");
        assert_eq!(event.feed_tag, "b=c");
    }

    #[test]
    fn key_without_slash_has_empty_feed_tag() {
        let body = r#"{"detail":{"bucket":{"name":"b"},"object":{"key":"file.txt"}}}"#;
        let event = extract(body, "m1", "r1").unwrap();
        assert_eq!(event.feed_tag, "");
    }

    #[test]
    fn rejects_unrecognized_shape() {
        let body = r#"{"foo":"bar"}"#;
        assert!(matches!(
            extract(body, "m1", "r1"),
            Err(ExtractError::UnrecognizedShape)
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        let body = "not json";
        assert!(matches!(
            extract(body, "m1", "r1"),
            Err(ExtractError::InvalidJson { .. })
        ));
    }
}
