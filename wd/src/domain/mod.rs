//! Domain types for warmd
//!
//! Queue names, device variants and the JSON payloads stored in each queue.

mod device;
mod payload;
mod queue_kind;

pub use device::DeviceVariant;
pub use payload::{PreloadPayload, PurgePayload};
pub use queue_kind::QueueKind;
