//! Queue receive/delete contract (spec §6).

use async_trait::async_trait;
use snafu::Snafu;

#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_token: String,
    pub body: String,
}

#[derive(Debug, Snafu)]
pub enum QueueError {
    #[snafu(display("queue receive failed: {source}"))]
    Receive { source: anyhow::Error },
    #[snafu(display("queue delete failed: {source}"))]
    Delete { source: anyhow::Error },
}

#[derive(Debug, Default, Clone)]
pub struct DeleteOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<String>,
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
        visibility_timeout: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    async fn delete_batch(&self, receipt_tokens: &[String]) -> Result<DeleteOutcome, QueueError>;
}

/// Production implementation backed by `aws_sdk_sqs`.
pub struct SqsQueueClient {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueueClient {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
        visibility_timeout: i32,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .visibility_timeout(visibility_timeout)
            .send()
            .await
            .map_err(|e| QueueError::Receive { source: e.into() })?;

        Ok(resp
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                Some(ReceivedMessage {
                    message_id: m.message_id?,
                    receipt_token: m.receipt_handle?,
                    body: m.body.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn delete_batch(&self, receipt_tokens: &[String]) -> Result<DeleteOutcome, QueueError> {
        if receipt_tokens.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let entries: Vec<_> = receipt_tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                aws_sdk_sqs::types::DeleteMessageBatchRequestEntry::builder()
                    .id(i.to_string())
                    .receipt_handle(token)
                    .build()
                    .expect("id and receipt_handle are always set")
            })
            .collect();

        let resp = self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| QueueError::Delete { source: e.into() })?;

        let successful = resp
            .successful
            .into_iter()
            .map(|e| e.id)
            .collect::<Vec<_>>();
        let failed = resp
            .failed
            .into_iter()
            .map(|e| e.id)
            .collect::<Vec<_>>();

        Ok(DeleteOutcome { successful, failed })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// In-memory queue fake, configurable to fail receives/deletes on
    /// demand, mirroring this ecosystem's `Mode::Normal` / `Mode::Dead`
    /// mock-component style.
    pub struct FakeQueueClient {
        pending: Mutex<Vec<ReceivedMessage>>,
        deleted: Mutex<Vec<String>>,
        fail_receive: bool,
    }

    impl FakeQueueClient {
        pub fn new(messages: Vec<ReceivedMessage>) -> Self {
            Self {
                pending: Mutex::new(messages),
                deleted: Mutex::new(Vec::new()),
                fail_receive: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                pending: Mutex::new(Vec::new()),
                deleted: Mutex::new(Vec::new()),
                fail_receive: true,
            }
        }

        pub fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueueClient for FakeQueueClient {
        async fn receive(
            &self,
            max_messages: i32,
            _wait_seconds: i32,
            _visibility_timeout: i32,
        ) -> Result<Vec<ReceivedMessage>, QueueError> {
            if self.fail_receive {
                return Err(QueueError::Receive {
                    source: anyhow::anyhow!("simulated receive failure"),
                });
            }
            let mut pending = self.pending.lock().unwrap();
            let take = (max_messages as usize).min(pending.len());
            Ok(pending.drain(0..take).collect())
        }

        async fn delete_batch(
            &self,
            receipt_tokens: &[String],
        ) -> Result<DeleteOutcome, QueueError> {
            self.deleted
                .lock()
                .unwrap()
                .extend(receipt_tokens.iter().cloned());
            Ok(DeleteOutcome {
                successful: receipt_tokens.to_vec(),
                failed: Vec::new(),
            })
        }
    }
}
