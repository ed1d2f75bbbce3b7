//! Accumulates serialized records into size/count-bounded batches and
//! dispatches them to the delivery stream, retrying only the records a
//! partial failure actually names (spec §4.9).

mod classify;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, Semaphore};

use crate::clients::delivery::DeliveryClient;
use crate::config::Settings;
use crate::internal_events::{
    BatchDelivered, DeliveryPermanent, DeliveryRetriable, DeliveryUnknown, InternalEvent,
    RetriesExhausted,
};

use classify::{classify, Classification};

struct BatcherState {
    buffer: Vec<Vec<u8>>,
    buffer_bytes: usize,
}

/// Shared across every `Processor`; bounds how many `PutRecordBatch` calls
/// are in flight at once regardless of how many callers submit records
/// concurrently.
pub struct DeliveryBatcher {
    client: Arc<dyn DeliveryClient>,
    stream_name: String,
    max_batch_records: usize,
    max_batch_bytes: usize,
    max_retries: u32,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
    state: Mutex<BatcherState>,
    semaphore: Arc<Semaphore>,
}

impl DeliveryBatcher {
    pub fn new(client: Arc<dyn DeliveryClient>, settings: &Settings) -> Self {
        Self {
            client,
            stream_name: settings.stream_name.clone(),
            max_batch_records: settings.max_batch_records,
            max_batch_bytes: settings.max_batch_bytes,
            max_retries: settings.max_retries,
            base_backoff_ms: settings.base_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            state: Mutex::new(BatcherState {
                buffer: Vec::new(),
                buffer_bytes: 0,
            }),
            semaphore: Arc::new(Semaphore::new(settings.delivery_concurrency.max(1))),
        }
    }

    /// Adds one already-serialized record to the pending batch. If adding it
    /// would cross the count or byte-size bound, the current batch is closed
    /// and dispatched first, and `record` starts the next one (spec §4.9):
    /// the open batch never itself exceeds either bound. Awaiting here is
    /// what provides backpressure: a caller blocks until a dispatch slot
    /// frees up rather than buffering without limit.
    pub async fn submit(&self, record: Vec<u8>) {
        let full = {
            let mut state = self.state.lock().await;
            let would_exceed = state.buffer.len() + 1 > self.max_batch_records
                || state.buffer_bytes + record.len() > self.max_batch_bytes;
            let full = if would_exceed && !state.buffer.is_empty() {
                state.buffer_bytes = 0;
                Some(std::mem::take(&mut state.buffer))
            } else {
                None
            };
            state.buffer_bytes += record.len();
            state.buffer.push(record);
            full
        };
        if let Some(batch) = full {
            self.dispatch_with_retry(batch).await;
        }
    }

    /// Dispatches whatever is currently pending, even if below the batch
    /// bounds. Called at end-of-object and during shutdown.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.state.lock().await;
            if state.buffer.is_empty() {
                return;
            }
            state.buffer_bytes = 0;
            std::mem::take(&mut state.buffer)
        };
        self.dispatch_with_retry(batch).await;
    }

    /// Flushes any remaining records, bounded by `shutdown_deadline_ms`.
    pub async fn close(&self, deadline: Duration) {
        if tokio::time::timeout(deadline, self.flush()).await.is_err() {
            tracing::error!(
                message = "delivery batcher did not drain within the shutdown deadline.",
                stream_name = self.stream_name.as_str(),
            );
        }
    }

    async fn dispatch_with_retry(&self, mut batch: Vec<Vec<u8>>) {
        // Two independent attempt counters: a whole-batch dispatch failure
        // and a partial per-record failure are "usually different transient
        // reasons" (spec §4.9) and are retried on different schedules, so a
        // batch that first hits one kind of failure and then the other does
        // not inherit the wrong backoff curve.
        let mut attempt: u32 = 0;
        let mut partial_attempt: u32 = 0;

        loop {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            let outcome = self.client.put_record_batch(&self.stream_name, &batch).await;
            drop(permit);

            match outcome {
                Ok(result) if result.failed_count == 0 => {
                    BatchDelivered {
                        stream_name: &self.stream_name,
                        record_count: batch.len(),
                    }
                    .emit();
                    return;
                }
                Ok(result) => {
                    let failed_indices: Vec<usize> = result
                        .per_record
                        .iter()
                        .enumerate()
                        .filter(|(_, r)| r.error_code.is_some())
                        .map(|(i, _)| i)
                        .collect();
                    if failed_indices.is_empty() {
                        return;
                    }
                    if partial_attempt >= self.max_retries {
                        RetriesExhausted {
                            stream_name: &self.stream_name,
                            dropped_records: failed_indices.len(),
                        }
                        .emit();
                        return;
                    }
                    batch = failed_indices.into_iter().map(|i| batch[i].clone()).collect();
                    self.partial_failure_backoff(partial_attempt).await;
                    partial_attempt += 1;
                }
                Err(err) => {
                    let classification = classify(&err);
                    match classification {
                        Classification::Permanent => {
                            DeliveryPermanent {
                                stream_name: &self.stream_name,
                                error: &err,
                            }
                            .emit();
                            return;
                        }
                        Classification::Unknown => {
                            DeliveryUnknown {
                                stream_name: &self.stream_name,
                                error: &err,
                            }
                            .emit();
                            return;
                        }
                        Classification::Retriable => {
                            DeliveryRetriable {
                                stream_name: &self.stream_name,
                                attempt,
                                error: &err,
                            }
                            .emit();
                        }
                    }
                    if attempt >= self.max_retries {
                        RetriesExhausted {
                            stream_name: &self.stream_name,
                            dropped_records: batch.len(),
                        }
                        .emit();
                        return;
                    }
                    attempt += 1;
                    self.backoff(attempt).await;
                }
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let exp = self.base_backoff_ms.saturating_mul(1u64 << attempt.min(20));
        let bounded = exp.min(self.max_backoff_ms);
        let jitter = rand::rng().random_range(0.75_f64..1.25_f64);
        let delay_ms = (bounded as f64 * jitter) as u64;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    /// Partial-failure retries start at attempt 0 (spec §4.9) but are floored
    /// at 500ms: the records that failed inside an otherwise-successful
    /// batch are usually a different, shorter-lived transient condition than
    /// a whole-batch dispatch failure, so they don't need the same backoff
    /// ramp, just a minimum pause before resubmitting.
    async fn partial_failure_backoff(&self, attempt: u32) {
        let exp = self.base_backoff_ms.saturating_mul(1u64 << attempt.min(20));
        let bounded = exp.min(self.max_backoff_ms).max(500);
        let jitter = rand::rng().random_range(0.75_f64..1.25_f64);
        let delay_ms = (bounded as f64 * jitter) as u64;
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::delivery::fake::{Behavior, FakeDeliveryClient};

    fn settings(max_retries: u32, max_batch_records: usize) -> Settings {
        let mut s = Settings::default();
        s.queue_url = "q".into();
        s.stream_name = "s".into();
        s.max_retries = max_retries;
        s.max_batch_records = max_batch_records;
        s.base_backoff_ms = 1;
        s.max_backoff_ms = 2;
        s.delivery_concurrency = 2;
        s
    }

    #[tokio::test]
    async fn flushes_at_record_count_bound() {
        // A record that would cross the bound closes and dispatches the
        // existing batch *before* joining a new one (spec §4.9): the batch
        // that reaches exactly `max_batch_records` only goes out once a
        // further record is submitted (or an explicit `flush()`), so the
        // already-open batch never exceeds the bound.
        let s = settings(3, 2);
        let client = Arc::new(FakeDeliveryClient::new(Behavior::AlwaysSucceed));
        let batcher = DeliveryBatcher::new(client.clone(), &s);
        batcher.submit(b"a".to_vec()).await;
        assert_eq!(client.dispatch_count(), 0);
        batcher.submit(b"b".to_vec()).await;
        assert_eq!(client.dispatch_count(), 0);
        batcher.submit(b"c".to_vec()).await;
        assert_eq!(client.dispatch_count(), 1);
        assert_eq!(client.dispatches.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn submit_never_lets_the_open_batch_cross_the_byte_bound() {
        let mut s = settings(3, 500);
        s.max_batch_bytes = 10;
        let client = Arc::new(FakeDeliveryClient::new(Behavior::AlwaysSucceed));
        let batcher = DeliveryBatcher::new(client.clone(), &s);
        batcher.submit(vec![b'a'; 7]).await;
        assert_eq!(client.dispatch_count(), 0);
        // 7 + 7 > 10, so this must flush the first record before buffering.
        batcher.submit(vec![b'b'; 7]).await;
        assert_eq!(client.dispatch_count(), 1);
        let dispatches = client.dispatches.lock().unwrap();
        assert_eq!(dispatches[0], vec![vec![b'a'; 7]]);
    }

    #[tokio::test]
    async fn flush_dispatches_a_partial_batch() {
        let s = settings(3, 500);
        let client = Arc::new(FakeDeliveryClient::new(Behavior::AlwaysSucceed));
        let batcher = DeliveryBatcher::new(client.clone(), &s);
        batcher.submit(b"a".to_vec()).await;
        batcher.flush().await;
        assert_eq!(client.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn partial_failure_retries_only_failed_indices_scenario_4() {
        let s = settings(3, 500);
        let client = Arc::new(FakeDeliveryClient::new(Behavior::FailIndicesOnce {
            indices: vec![7, 119],
        }));
        let batcher = DeliveryBatcher::new(client.clone(), &s);
        for i in 0..500 {
            batcher.submit(format!("record-{i}").into_bytes()).await;
        }
        batcher.flush().await;
        assert_eq!(client.dispatch_count(), 2);
        let dispatches = client.dispatches.lock().unwrap();
        assert_eq!(dispatches[0].len(), 500);
        assert_eq!(dispatches[1].len(), 2);
    }

    #[tokio::test]
    async fn exhausts_retry_budget_on_persistent_throttling() {
        let s = settings(3, 1);
        let client = Arc::new(FakeDeliveryClient::new(Behavior::AlwaysRetriable));
        let batcher = DeliveryBatcher::new(client.clone(), &s);
        batcher.submit(b"a".to_vec()).await;
        assert_eq!(client.dispatch_count(), s.max_retries as usize + 1);
    }

    #[tokio::test]
    async fn permanent_failure_does_not_retry() {
        let s = settings(3, 1);
        let client = Arc::new(FakeDeliveryClient::new(Behavior::Permanent));
        let batcher = DeliveryBatcher::new(client.clone(), &s);
        batcher.submit(b"a".to_vec()).await;
        assert_eq!(client.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn unrecognized_failure_is_logged_and_dropped_without_retry() {
        let s = settings(3, 1);
        let client = Arc::new(FakeDeliveryClient::new(Behavior::Unrecognized));
        let batcher = DeliveryBatcher::new(client.clone(), &s);
        batcher.submit(b"a".to_vec()).await;
        assert_eq!(client.dispatch_count(), 1);
    }
}
