//! Stream-delivery bulk-put contract (spec §4.9, §6).

use async_trait::async_trait;
use snafu::Snafu;

#[derive(Debug, Clone)]
pub struct PerRecordOutcome {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PutRecordOutcome {
    pub failed_count: usize,
    pub per_record: Vec<PerRecordOutcome>,
}

#[derive(Debug, Snafu)]
pub enum DeliveryDispatchError {
    #[snafu(display("stream not found: {stream_name}"))]
    StreamNotFound { stream_name: String },
    #[snafu(display("invalid argument delivering to {stream_name}: {message}"))]
    InvalidArgument {
        stream_name: String,
        message: String,
    },
    #[snafu(display("throttled delivering to {stream_name}"))]
    Throttled { stream_name: String },
    #[snafu(display("service unavailable delivering to {stream_name}: {source}"))]
    ServiceUnavailable {
        stream_name: String,
        source: anyhow::Error,
    },
    #[snafu(display("unknown delivery error for {stream_name}: {source}"))]
    Unknown {
        stream_name: String,
        source: anyhow::Error,
    },
}

#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn put_record_batch(
        &self,
        stream_name: &str,
        records: &[Vec<u8>],
    ) -> Result<PutRecordOutcome, DeliveryDispatchError>;

    async fn describe_stream_active(&self, stream_name: &str) -> bool;
}

/// Production implementation backed by `aws_sdk_firehose`.
pub struct FirehoseDeliveryClient {
    client: aws_sdk_firehose::Client,
}

impl FirehoseDeliveryClient {
    pub fn new(client: aws_sdk_firehose::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliveryClient for FirehoseDeliveryClient {
    async fn put_record_batch(
        &self,
        stream_name: &str,
        records: &[Vec<u8>],
    ) -> Result<PutRecordOutcome, DeliveryDispatchError> {
        use aws_sdk_firehose::error::ProvideErrorMetadata;
        use aws_sdk_firehose::types::Record;

        let entries: Vec<Record> = records
            .iter()
            .map(|bytes| {
                Record::builder()
                    .data(bytes.clone().into())
                    .build()
                    .expect("data is always set")
            })
            .collect();

        let resp = self
            .client
            .put_record_batch()
            .delivery_stream_name(stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|err| {
                let code = err.code().map(|c| c.to_string());
                match code.as_deref() {
                    Some("ResourceNotFoundException") => DeliveryDispatchError::StreamNotFound {
                        stream_name: stream_name.to_string(),
                    },
                    Some("InvalidArgumentException") => DeliveryDispatchError::InvalidArgument {
                        stream_name: stream_name.to_string(),
                        message: err.to_string(),
                    },
                    Some("LimitExceededException")
                    | Some("ServiceUnavailableException")
                    | Some("Throttling")
                    | Some("ThrottlingException") => DeliveryDispatchError::Throttled {
                        stream_name: stream_name.to_string(),
                    },
                    // No recognized service exception code: either a bare
                    // transport failure (timeout, connection reset,
                    // construction/dispatch/response error with nothing to
                    // classify) or a 5xx with no error-code metadata. Spec
                    // §7 puts both in the retriable bucket rather than
                    // `Unknown`.
                    None => DeliveryDispatchError::ServiceUnavailable {
                        stream_name: stream_name.to_string(),
                        source: err.into(),
                    },
                    Some(_) => DeliveryDispatchError::Unknown {
                        stream_name: stream_name.to_string(),
                        source: err.into(),
                    },
                }
            })?;

        let per_record = resp
            .request_responses
            .into_iter()
            .map(|r| PerRecordOutcome {
                error_code: r.error_code,
                error_message: r.error_message,
            })
            .collect();

        Ok(PutRecordOutcome {
            failed_count: resp.failed_put_count as usize,
            per_record,
        })
    }

    async fn describe_stream_active(&self, stream_name: &str) -> bool {
        self.client
            .describe_delivery_stream()
            .delivery_stream_name(stream_name)
            .send()
            .await
            .ok()
            .and_then(|r| r.delivery_stream_description)
            .map(|d| d.delivery_stream_status == aws_sdk_firehose::types::DeliveryStreamStatus::Active)
            .unwrap_or(false)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Configurable fake delivery client: can fail every N attempts, report
    /// specific per-record failures, or count dispatches.
    pub struct FakeDeliveryClient {
        pub dispatches: Mutex<Vec<Vec<Vec<u8>>>>,
        behavior: Behavior,
    }

    pub enum Behavior {
        AlwaysSucceed,
        AlwaysRetriable,
        FailIndicesOnce { indices: Vec<usize> },
        Permanent,
        Unrecognized,
    }

    impl FakeDeliveryClient {
        pub fn new(behavior: Behavior) -> Self {
            Self {
                dispatches: Mutex::new(Vec::new()),
                behavior,
            }
        }

        pub fn dispatch_count(&self) -> usize {
            self.dispatches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DeliveryClient for FakeDeliveryClient {
        async fn put_record_batch(
            &self,
            stream_name: &str,
            records: &[Vec<u8>],
        ) -> Result<PutRecordOutcome, DeliveryDispatchError> {
            self.dispatches.lock().unwrap().push(records.to_vec());

            match &self.behavior {
                Behavior::AlwaysSucceed => Ok(PutRecordOutcome {
                    failed_count: 0,
                    per_record: records
                        .iter()
                        .map(|_| PerRecordOutcome {
                            error_code: None,
                            error_message: None,
                        })
                        .collect(),
                }),
                Behavior::AlwaysRetriable => Err(DeliveryDispatchError::Throttled {
                    stream_name: stream_name.to_string(),
                }),
                Behavior::Permanent => Err(DeliveryDispatchError::InvalidArgument {
                    stream_name: stream_name.to_string(),
                    message: "simulated permanent failure".into(),
                }),
                Behavior::Unrecognized => Err(DeliveryDispatchError::Unknown {
                    stream_name: stream_name.to_string(),
                    source: anyhow::anyhow!("simulated unrecognized failure"),
                }),
                Behavior::FailIndicesOnce { indices } => {
                    let attempt = self.dispatches.lock().unwrap().len();
                    let per_record = (0..records.len())
                        .map(|i| {
                            if attempt == 1 && indices.contains(&i) {
                                PerRecordOutcome {
                                    error_code: Some("ServiceUnavailableException".into()),
                                    error_message: Some("simulated".into()),
                                }
                            } else {
                                PerRecordOutcome {
                                    error_code: None,
                                    error_message: None,
                                }
                            }
                        })
                        .collect();
                    let failed_count = if attempt == 1 { indices.len() } else { 0 };
                    Ok(PutRecordOutcome {
                        failed_count,
                        per_record,
                    })
                }
            }
        }

        async fn describe_stream_active(&self, _stream_name: &str) -> bool {
            true
        }
    }
}
