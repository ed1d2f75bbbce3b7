//! The long-poll receive loop: dequeue, dispatch, delete (spec §4.1, §5).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

use crate::clients::QueueClient;
use crate::clients::queue::ReceivedMessage;
use crate::config::Settings;
use crate::dispatch::{FeedDispatcher, ProcessOutcome};
use crate::event::extract;
use crate::internal_events::{InternalEvent, MalformedEvent};

/// Shared counters the health surface reads to judge liveness/readiness
/// without taking a lock on the consume loop itself.
#[derive(Default)]
pub struct ConsumerStats {
    pub consecutive_receive_failures: AtomicU32,
    pub last_activity_unix_ms: AtomicU64,
}

impl ConsumerStats {
    pub fn record_activity(&self, now_ms: i64) {
        self.last_activity_unix_ms.store(now_ms as u64, Ordering::Relaxed);
    }
}

/// Drives one queue's receive/process/delete cycle until cancelled.
pub struct Consumer {
    settings: Arc<Settings>,
    queue: Arc<dyn QueueClient>,
    dispatcher: Arc<FeedDispatcher>,
    stats: Arc<ConsumerStats>,
}

impl Consumer {
    pub fn new(
        settings: Arc<Settings>,
        queue: Arc<dyn QueueClient>,
        dispatcher: Arc<FeedDispatcher>,
        stats: Arc<ConsumerStats>,
    ) -> Self {
        Self {
            settings,
            queue,
            dispatcher,
            stats,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.queue.receive(
                    self.settings.max_messages,
                    self.settings.wait_seconds,
                    self.settings.visibility_seconds,
                ) => result,
            };

            let messages = match received {
                Ok(messages) => {
                    self.stats.consecutive_receive_failures.store(0, Ordering::Relaxed);
                    messages
                }
                Err(err) => {
                    self.stats.consecutive_receive_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(message = "queue receive failed.", error = %err);
                    continue;
                }
            };

            if messages.is_empty() {
                continue;
            }

            self.process_batch(messages).await;
        }
    }

    /// Drives one already-received batch through dispatch and deletion
    /// without the receive loop around it, for tests that supply their own
    /// messages directly.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn process_batch_for_test(&self, messages: Vec<ReceivedMessage>) {
        self.process_batch(messages).await;
    }

    async fn process_batch(&self, messages: Vec<ReceivedMessage>) {
        let mut deletable = Vec::with_capacity(messages.len());

        for message in messages {
            let outcome = self.process_one(&message).await;
            self.stats.record_activity(chrono::Utc::now().timestamp_millis());

            if outcome != ProcessOutcome::TransientFailure {
                deletable.push(message.receipt_token);
            }
        }

        if deletable.is_empty() {
            return;
        }

        if let Err(err) = self.queue.delete_batch(&deletable).await {
            tracing::error!(message = "queue delete failed.", error = %err);
        }
    }

    /// A message whose event shape is unrecognized is dropped (not retried),
    /// same as any other permanently unprocessable message.
    async fn process_one(&self, message: &ReceivedMessage) -> ProcessOutcome {
        let event = match extract(&message.body, &message.message_id, &message.receipt_token) {
            Ok(event) => event,
            Err(err) => {
                MalformedEvent {
                    message_id: &message.message_id,
                    error: &err,
                }
                .emit();
                return ProcessOutcome::Handled;
            }
        };

        let processor = self.dispatcher.route(&event.feed_tag);
        processor.process(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::delivery::fake::{Behavior, FakeDeliveryClient};
    use crate::clients::object_store::fake::FakeObjectStoreClient;
    use crate::clients::queue::fake::FakeQueueClient;
    use crate::delivery::DeliveryBatcher;
    use crate::dispatch::PipelineProcessor;
    use std::collections::HashMap;

    fn settings() -> Arc<Settings> {
        let mut s = Settings::default();
        s.queue_url = "q".into();
        s.stream_name = "s".into();
        Arc::new(s)
    }

    fn gz_b64_line(text: &str) -> String {
        use base64::Engine;
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(text.as_bytes()).unwrap();
        let compressed = gz.finish().unwrap();
        base64::engine::general_purpose::STANDARD.encode(compressed)
    }

    fn make_dispatcher(
        settings: Arc<Settings>,
        object_store: Arc<dyn crate::clients::ObjectStoreClient>,
        delivery_client: Arc<dyn crate::clients::DeliveryClient>,
    ) -> Arc<FeedDispatcher> {
        let delivery = Arc::new(DeliveryBatcher::new(delivery_client, &settings));
        let processor: Arc<dyn crate::dispatch::Processor> = Arc::new(PipelineProcessor {
            settings: settings.clone(),
            object_store,
            delivery,
        });
        Arc::new(FeedDispatcher::new(HashMap::new(), processor))
    }

    #[tokio::test]
    async fn access_denied_is_permanent_and_deletes_the_message() {
        let settings = settings();
        let body = r#"{"detail":{"bucket":{"name":"b"},"object":{"key":"feedA/file.txt"}}}"#;
        let queue = Arc::new(FakeQueueClient::new(vec![ReceivedMessage {
            message_id: "m1".into(),
            receipt_token: "r1".into(),
            body: body.into(),
        }]));
        let object_store: Arc<dyn crate::clients::ObjectStoreClient> =
            Arc::new(FakeObjectStoreClient::AccessDenied);
        let delivery_client = Arc::new(FakeDeliveryClient::new(Behavior::AlwaysSucceed));
        let dispatcher = make_dispatcher(settings.clone(), object_store, delivery_client);
        let stats = Arc::new(ConsumerStats::default());

        let consumer = Consumer::new(settings, queue.clone(), dispatcher, stats);
        let message = ReceivedMessage {
            message_id: "m1".into(),
            receipt_token: "r1".into(),
            body: body.into(),
        };
        consumer.process_batch(vec![message]).await;

        assert!(queue.deleted().contains(&"r1".to_string()));
    }

    #[tokio::test]
    async fn transient_object_read_does_not_delete_scenario_6() {
        let settings = settings();
        let body = r#"{"detail":{"bucket":{"name":"b"},"object":{"key":"feedA/file.txt"}}}"#;
        let queue = Arc::new(FakeQueueClient::new(Vec::new()));
        let object_store: Arc<dyn crate::clients::ObjectStoreClient> = Arc::new(
            FakeObjectStoreClient::TruncatedTransient { good_lines: Vec::new() },
        );
        let delivery_client = Arc::new(FakeDeliveryClient::new(Behavior::AlwaysSucceed));
        let dispatcher = make_dispatcher(settings.clone(), object_store, delivery_client);
        let stats = Arc::new(ConsumerStats::default());
        let consumer = Consumer::new(settings, queue.clone(), dispatcher, stats);

        let message = ReceivedMessage {
            message_id: "m1".into(),
            receipt_token: "r1".into(),
            body: body.into(),
        };
        consumer.process_batch(vec![message]).await;

        assert!(!queue.deleted().contains(&"r1".to_string()));
    }

    #[tokio::test]
    async fn malformed_event_is_deleted_without_processing() {
        let settings = settings();
        let queue = Arc::new(FakeQueueClient::new(Vec::new()));
        let object_store: Arc<dyn crate::clients::ObjectStoreClient> =
            Arc::new(FakeObjectStoreClient::Bytes(Vec::new()));
        let delivery_client = Arc::new(FakeDeliveryClient::new(Behavior::AlwaysSucceed));
        let dispatcher = make_dispatcher(settings.clone(), object_store, delivery_client);
        let stats = Arc::new(ConsumerStats::default());
        let consumer = Consumer::new(settings, queue.clone(), dispatcher, stats);

        let message = ReceivedMessage {
            message_id: "m1".into(),
            receipt_token: "r1".into(),
            body: "not json".into(),
        };
        consumer.process_batch(vec![message]).await;

        assert!(queue.deleted().contains(&"r1".to_string()));
    }

    #[tokio::test]
    async fn happy_path_object_is_read_and_delivered() {
        let settings = settings();
        let body = r#"{"detail":{"bucket":{"name":"b"},"object":{"key":"feedA/file.txt"}}}"#;
        let line = gz_b64_line(
            r#"{"wifiConnectedEvents":[{"timestamp":1690000000000,"wifiConnectedInfo":{"bssid":"AA:BB:CC:DD:EE:01","rssi":-60},"location":{"latitude":37.0,"longitude":-122.0}}]}"#,
        );
        let queue = Arc::new(FakeQueueClient::new(Vec::new()));
        let object_store: Arc<dyn crate::clients::ObjectStoreClient> =
            Arc::new(FakeObjectStoreClient::Bytes(format!("{line}\n").into_bytes()));
        let delivery_client = Arc::new(FakeDeliveryClient::new(Behavior::AlwaysSucceed));
        let dispatcher = make_dispatcher(settings.clone(), object_store, delivery_client.clone());
        let stats = Arc::new(ConsumerStats::default());
        let consumer = Consumer::new(settings, queue.clone(), dispatcher, stats);

        let message = ReceivedMessage {
            message_id: "m1".into(),
            receipt_token: "r1".into(),
            body: body.into(),
        };
        consumer.process_batch(vec![message]).await;

        assert!(queue.deleted().contains(&"r1".to_string()));
        assert_eq!(delivery_client.dispatch_count(), 1);
    }
}
