//! Thread-local draw collection and per-effect instance batching (§4.8).

mod bucket;
mod instance_batch;

pub use bucket::{DrawBucket, RawDraw};
pub use instance_batch::{BatchKey, InstanceBatch};
