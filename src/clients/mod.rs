//! Thin contracts over the managed-cloud SDKs (spec §6). Production code
//! talks to these traits, not to `aws_sdk_*` directly, so tests can
//! substitute fakes the way this ecosystem substitutes mock sinks/sources
//! for its own components.

pub mod delivery;
pub mod object_store;
pub mod queue;

pub use delivery::{DeliveryClient, PutRecordOutcome};
pub use object_store::ObjectStoreClient;
pub use queue::{QueueClient, ReceivedMessage};
