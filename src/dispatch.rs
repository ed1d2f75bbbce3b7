//! Routes each `SourceEvent` to the `Processor` registered for its feed tag,
//! falling back to a default processor for unrecognized tags (spec §4.2).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::clients::object_store::ObjectStoreError;
use crate::delivery::DeliveryBatcher;
use crate::event::SourceEvent;
use crate::internal_events::{
    AccessDenied, InternalEvent, LineDecodeError, LineParseError, ObjectNotFound,
    RecordTooLargeEvent, TransientRead,
};
use crate::measurement::{encode, SerializeError};
use crate::object_reader;
use crate::transform::{transform, BatchContext};
use crate::{clients::ObjectStoreClient, config::Settings, line_decoder, scan};

use futures::StreamExt;

#[async_trait]
pub trait Processor: Send + Sync {
    /// Reads, decodes, parses, validates, transforms and delivers the object
    /// named by `event`. Returns whether the source message may be deleted:
    /// anything short of a transient read failure is considered handled.
    async fn process(&self, event: &SourceEvent) -> ProcessOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The object was read to completion (even if every line was dropped).
    Handled,
    /// The object store could not be read; leave the message for redelivery.
    TransientFailure,
}

/// Maps feed tags to `Processor`s, used by the `Consumer` to decide how each
/// dequeued event is handled.
pub struct FeedDispatcher {
    processors: HashMap<String, Arc<dyn Processor>>,
    default: Arc<dyn Processor>,
}

impl FeedDispatcher {
    pub fn new(processors: HashMap<String, Arc<dyn Processor>>, default: Arc<dyn Processor>) -> Self {
        Self { processors, default }
    }

    /// Builds the dispatcher used in production: every tag named in
    /// `settings.feed_processors` and the catch-all default share one
    /// `PipelineProcessor`, since this pipeline's transform/validate rules
    /// do not currently vary per feed.
    pub fn from_settings(
        settings: Arc<Settings>,
        object_store: Arc<dyn ObjectStoreClient>,
        delivery: Arc<DeliveryBatcher>,
    ) -> Self {
        let shared: Arc<dyn Processor> = Arc::new(PipelineProcessor {
            settings: settings.clone(),
            object_store,
            delivery,
        });
        let processors = settings
            .feed_processors
            .iter()
            .map(|tag| (tag.clone(), shared.clone()))
            .collect();
        Self::new(processors, shared)
    }

    pub fn route(&self, feed_tag: &str) -> Arc<dyn Processor> {
        self.processors
            .get(feed_tag)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// The concrete, spec-defined processing pipeline: object read, line decode,
/// JSON parse, validate, transform, serialize, submit to delivery.
pub struct PipelineProcessor {
    pub(crate) settings: Arc<Settings>,
    pub(crate) object_store: Arc<dyn ObjectStoreClient>,
    pub(crate) delivery: Arc<DeliveryBatcher>,
}

#[async_trait]
impl Processor for PipelineProcessor {
    async fn process(&self, event: &SourceEvent) -> ProcessOutcome {
        let lines = match object_reader::open_lines(&*self.object_store, &event.bucket, &event.object_key).await {
            Ok(lines) => lines,
            Err(ObjectStoreError::NotFound { bucket, key }) => {
                ObjectNotFound { bucket: &bucket, key: &key }.emit();
                return ProcessOutcome::Handled;
            }
            Err(ObjectStoreError::AccessDenied { bucket, key }) => {
                AccessDenied { bucket: &bucket, key: &key }.emit();
                return ProcessOutcome::Handled;
            }
            Err(ObjectStoreError::Transient { bucket, key, source }) => {
                TransientRead { bucket: &bucket, key: &key, error: &source }.emit();
                return ProcessOutcome::TransientFailure;
            }
        };

        let processing_batch_id = Uuid::new_v4().to_string();
        let ingestion_timestamp = chrono::Utc::now().timestamp_millis();
        let ctx = BatchContext {
            processing_batch_id,
            ingestion_timestamp,
        };

        tokio::pin!(lines);
        let mut line_number = 0usize;
        let mut transient = false;

        while let Some(line) = lines.next().await {
            line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(ObjectStoreError::Transient { bucket, key, source }) => {
                    TransientRead { bucket: &bucket, key: &key, error: &source }.emit();
                    transient = true;
                    break;
                }
                Err(ObjectStoreError::NotFound { bucket, key }) => {
                    ObjectNotFound { bucket: &bucket, key: &key }.emit();
                    break;
                }
                Err(ObjectStoreError::AccessDenied { bucket, key }) => {
                    AccessDenied { bucket: &bucket, key: &key }.emit();
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let decoded = match line_decoder::decode(&line) {
                Ok(decoded) => decoded,
                Err(err) => {
                    LineDecodeError {
                        object_key: &event.object_key,
                        line_number,
                        error: &err,
                    }
                    .emit();
                    continue;
                }
            };

            let document = match scan::parse(&decoded) {
                Ok(document) => document,
                Err(err) => {
                    LineParseError {
                        object_key: &event.object_key,
                        line_number,
                        error: &err,
                    }
                    .emit();
                    continue;
                }
            };

            let now_ms = chrono::Utc::now().timestamp_millis();
            let measurements = transform(&document, &ctx, &self.settings, now_ms, &event.object_key);

            for measurement in &measurements {
                match encode(measurement, self.settings.max_record_bytes) {
                    Ok(bytes) => self.delivery.submit(bytes).await,
                    Err(SerializeError::TooLarge { source }) => {
                        RecordTooLargeEvent {
                            object_key: &event.object_key,
                            size: source.size,
                            max: source.max,
                        }
                        .emit();
                    }
                    Err(SerializeError::Encode { source }) => {
                        tracing::error!(
                            message = "failed to serialize a measurement.",
                            object_key = %event.object_key,
                            error = %source,
                        );
                    }
                }
            }
        }

        // A mid-file transient read leaves already-submitted records pending
        // in the shared batch rather than forcing them out now: the message
        // stays on the queue and will be redelivered, so there is no
        // end-of-file here to flush at (spec §8 scenario 6).
        if transient {
            ProcessOutcome::TransientFailure
        } else {
            self.delivery.flush().await;
            ProcessOutcome::Handled
        }
    }
}
