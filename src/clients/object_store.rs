//! Object store read contract (spec §4.3, §6).

use async_trait::async_trait;
use snafu::Snafu;
use tokio::io::AsyncRead;

#[derive(Debug, Snafu)]
pub enum ObjectStoreError {
    #[snafu(display("object not found: s3://{bucket}/{key}"))]
    NotFound { bucket: String, key: String },
    #[snafu(display("access denied: s3://{bucket}/{key}"))]
    AccessDenied { bucket: String, key: String },
    #[snafu(display("transient read error for s3://{bucket}/{key}: {source}"))]
    Transient {
        bucket: String,
        key: String,
        source: anyhow::Error,
    },
}

/// A boxed, owned `AsyncRead` over the raw object bytes. Dropping it releases
/// the underlying connection.
pub type ObjectBody = std::pin::Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn get_object_stream(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectBody, ObjectStoreError>;
}

/// Production implementation backed by `aws_sdk_s3`.
pub struct S3ObjectStoreClient {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStoreClient {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStoreClient for S3ObjectStoreClient {
    async fn get_object_stream(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectBody, ObjectStoreError> {
        use aws_sdk_s3::error::ProvideErrorMetadata;

        let result = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let code = err.code().unwrap_or_default();
                if code == "NoSuchKey" {
                    return Err(ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    });
                }
                if code == "AccessDenied" {
                    return Err(ObjectStoreError::AccessDenied {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    });
                }
                return Err(ObjectStoreError::Transient {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    source: err.into(),
                });
            }
        };

        let reader = output.body.into_async_read();
        Ok(Box::pin(reader))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    pub enum FakeObjectStoreClient {
        Bytes(Vec<u8>),
        NotFound,
        AccessDenied,
        /// Streams `good_lines` successfully, then fails as though the
        /// connection dropped partway through the object.
        TruncatedTransient { good_lines: Vec<u8> },
    }

    /// Yields `data` then fails every subsequent read, modeling a connection
    /// that drops mid-stream.
    struct TruncatingReader {
        data: Cursor<Vec<u8>>,
        exhausted: bool,
    }

    impl tokio::io::AsyncRead for TruncatingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.data.position() < self.data.get_ref().len() as u64 {
                return Pin::new(&mut self.data).poll_read(cx, buf);
            }
            if self.exhausted {
                return Poll::Ready(Err(std::io::Error::other(
                    "simulated transient read failure",
                )));
            }
            self.exhausted = true;
            Poll::Ready(Err(std::io::Error::other("simulated transient read failure")))
        }
    }

    #[async_trait]
    impl ObjectStoreClient for FakeObjectStoreClient {
        async fn get_object_stream(
            &self,
            bucket: &str,
            key: &str,
        ) -> Result<ObjectBody, ObjectStoreError> {
            match self {
                FakeObjectStoreClient::Bytes(bytes) => {
                    Ok(Box::pin(Cursor::new(bytes.clone())) as ObjectBody)
                }
                FakeObjectStoreClient::NotFound => Err(ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }),
                FakeObjectStoreClient::AccessDenied => Err(ObjectStoreError::AccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }),
                FakeObjectStoreClient::TruncatedTransient { good_lines } => {
                    Ok(Box::pin(TruncatingReader {
                        data: Cursor::new(good_lines.clone()),
                        exhausted: false,
                    }) as ObjectBody)
                }
            }
        }
    }
}
