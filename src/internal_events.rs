//! One struct per loggable condition, each pairing a `tracing` event with a
//! `metrics` counter so the two never drift apart (spec §7).

use crate::validate::RejectReason;
use std::fmt::Display;

pub trait InternalEvent {
    fn emit(self);
}

pub struct MalformedEvent<'a> {
    pub message_id: &'a str,
    pub error: &'a dyn Display,
}

impl InternalEvent for MalformedEvent<'_> {
    fn emit(self) {
        tracing::warn!(
            message = "dropping queue message with unrecognized shape.",
            message_id = self.message_id,
            error = %self.error,
        );
        metrics::counter!("pipeline_malformed_events_total").increment(1);
    }
}

pub struct ObjectNotFound<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
}

impl InternalEvent for ObjectNotFound<'_> {
    fn emit(self) {
        tracing::warn!(
            message = "object not found, dropping message.",
            bucket = self.bucket,
            key = self.key,
        );
        metrics::counter!("pipeline_object_not_found_total").increment(1);
    }
}

pub struct AccessDenied<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
}

impl InternalEvent for AccessDenied<'_> {
    fn emit(self) {
        tracing::error!(
            message = "access denied reading object, dropping message.",
            bucket = self.bucket,
            key = self.key,
        );
        metrics::counter!("pipeline_access_denied_total").increment(1);
    }
}

pub struct TransientRead<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub error: &'a dyn Display,
}

impl InternalEvent for TransientRead<'_> {
    fn emit(self) {
        tracing::warn!(
            message = "transient read error, message left for redelivery.",
            bucket = self.bucket,
            key = self.key,
            error = %self.error,
        );
        metrics::counter!("pipeline_transient_read_errors_total").increment(1);
    }
}

pub struct LineDecodeError<'a> {
    pub object_key: &'a str,
    pub line_number: usize,
    pub error: &'a dyn Display,
}

impl InternalEvent for LineDecodeError<'_> {
    fn emit(self) {
        tracing::warn!(
            message = "dropping line that failed to decode.",
            object_key = self.object_key,
            line_number = self.line_number,
            error = %self.error,
        );
        metrics::counter!("pipeline_decode_errors_total").increment(1);
    }
}

pub struct LineParseError<'a> {
    pub object_key: &'a str,
    pub line_number: usize,
    pub error: &'a dyn Display,
}

impl InternalEvent for LineParseError<'_> {
    fn emit(self) {
        tracing::warn!(
            message = "dropping line that failed to parse.",
            object_key = self.object_key,
            line_number = self.line_number,
            error = %self.error,
        );
        metrics::counter!("pipeline_parse_errors_total").increment(1);
    }
}

pub struct ValidationReject<'a> {
    pub object_key: &'a str,
    pub reason: RejectReason,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> ValidationReject<'a> {
    pub fn new(object_key: &'a str, reason: RejectReason) -> Self {
        Self {
            object_key,
            reason,
            _marker: std::marker::PhantomData,
        }
    }
}

impl InternalEvent for ValidationReject<'_> {
    fn emit(self) {
        tracing::debug!(
            message = "dropping observation that failed validation.",
            object_key = self.object_key,
            reason = ?self.reason,
        );
        metrics::counter!("pipeline_validation_rejects_total", "reason" => format!("{:?}", self.reason))
            .increment(1);
    }
}

pub struct RecordTooLargeEvent<'a> {
    pub object_key: &'a str,
    pub size: usize,
    pub max: usize,
}

impl InternalEvent for RecordTooLargeEvent<'_> {
    fn emit(self) {
        tracing::warn!(
            message = "dropping record that exceeds the max record size.",
            object_key = self.object_key,
            size = self.size,
            max = self.max,
        );
        metrics::counter!("pipeline_record_too_large_total").increment(1);
    }
}

pub struct DeliveryPermanent<'a> {
    pub stream_name: &'a str,
    pub error: &'a dyn Display,
}

impl InternalEvent for DeliveryPermanent<'_> {
    fn emit(self) {
        tracing::error!(
            message = "permanently failed to deliver batch, dropping records.",
            stream_name = self.stream_name,
            error = %self.error,
        );
        metrics::counter!("pipeline_delivery_permanent_failures_total").increment(1);
    }
}

pub struct DeliveryRetriable<'a> {
    pub stream_name: &'a str,
    pub attempt: u32,
    pub error: &'a dyn Display,
}

impl InternalEvent for DeliveryRetriable<'_> {
    fn emit(self) {
        tracing::warn!(
            message = "retriable delivery failure.",
            stream_name = self.stream_name,
            attempt = self.attempt,
            error = %self.error,
        );
        metrics::counter!("pipeline_delivery_retriable_failures_total").increment(1);
    }
}

pub struct DeliveryUnknown<'a> {
    pub stream_name: &'a str,
    pub error: &'a dyn Display,
}

impl InternalEvent for DeliveryUnknown<'_> {
    fn emit(self) {
        tracing::error!(
            message = "unclassified delivery failure, dropping records without retry.",
            stream_name = self.stream_name,
            error = %self.error,
        );
        metrics::counter!("pipeline_delivery_unknown_failures_total").increment(1);
    }
}

pub struct Throttled<'a> {
    pub stream_name: &'a str,
}

impl InternalEvent for Throttled<'_> {
    fn emit(self) {
        tracing::warn!(
            message = "delivery throttled.",
            stream_name = self.stream_name,
        );
        metrics::counter!("pipeline_delivery_throttled_total").increment(1);
    }
}

pub struct BatchDelivered<'a> {
    pub stream_name: &'a str,
    pub record_count: usize,
}

impl InternalEvent for BatchDelivered<'_> {
    fn emit(self) {
        tracing::debug!(
            message = "delivered batch.",
            stream_name = self.stream_name,
            record_count = self.record_count,
        );
        metrics::counter!("pipeline_delivered_records_total").increment(self.record_count as u64);
    }
}

pub struct RetriesExhausted<'a> {
    pub stream_name: &'a str,
    pub dropped_records: usize,
}

impl InternalEvent for RetriesExhausted<'_> {
    fn emit(self) {
        tracing::error!(
            message = "exhausted retry budget, dropping records.",
            stream_name = self.stream_name,
            dropped_records = self.dropped_records,
        );
        metrics::counter!("pipeline_retries_exhausted_total").increment(1);
    }
}
