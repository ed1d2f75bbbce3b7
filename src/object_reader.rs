//! Streams an object as a lazy sequence of text lines (spec §4.3).

use futures::Stream;
use tokio::io::AsyncBufReadExt;

use crate::clients::{ObjectStoreClient, object_store::ObjectStoreError};

/// Opens `bucket/key` and returns a stream of `\n`-delimited lines (the
/// final line, if unterminated, is included). The underlying handle is
/// released when the stream is exhausted, errors, or is dropped.
pub async fn open_lines(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    key: &str,
) -> Result<impl Stream<Item = Result<String, ObjectStoreError>>, ObjectStoreError> {
    let body = client.get_object_stream(bucket, key).await?;
    let reader = tokio::io::BufReader::new(body);
    let bucket = bucket.to_string();
    let key = key.to_string();

    Ok(async_stream::try_stream! {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => yield line,
                Ok(None) => break,
                Err(source) => {
                    Err(ObjectStoreError::Transient { bucket: bucket.clone(), key: key.clone(), source: source.into() })?;
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::object_store::fake::FakeObjectStoreClient;
    use futures::StreamExt;

    #[tokio::test]
    async fn streams_lines_including_unterminated_final_line() {
        let client = FakeObjectStoreClient::Bytes(b"line1\nline2\nline3".to_vec());
        let stream = open_lines(&client, "bucket", "key").await.unwrap();
        let lines: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(lines, vec!["line1", "line2", "line3"]);
    }

    #[tokio::test]
    async fn empty_object_yields_no_lines() {
        let client = FakeObjectStoreClient::Bytes(Vec::new());
        let stream = open_lines(&client, "bucket", "key").await.unwrap();
        let lines: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn not_found_surfaces_before_any_lines() {
        let client = FakeObjectStoreClient::NotFound;
        let result = open_lines(&client, "bucket", "key").await;
        assert!(matches!(result, Err(ObjectStoreError::NotFound { .. })));
    }
}
