//! Streaming transformation service for WiFi-scan ingestion.
//!
//! Data flows `Consumer -> EventExtractor -> FeedDispatcher -> Processor`,
//! where a `Processor` runs `ObjectReader -> LineDecoder -> ScanParser ->
//! Validator -> Transformer -> Serializer -> DeliveryBatcher` over a single
//! object. The `DeliveryBatcher` is the one component shared across all
//! concurrently-running processors.

pub mod clients;
pub mod config;
pub mod consumer;
pub mod delivery;
pub mod dispatch;
pub mod event;
pub mod health;
pub mod internal_events;
pub mod line_decoder;
pub mod measurement;
pub mod object_reader;
pub mod oui;
pub mod scan;
pub mod transform;
pub mod validate;

pub use config::Settings;
pub use consumer::Consumer;
