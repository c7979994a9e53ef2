//! Upload heap and background streaming worker (§4.3).

pub mod heap;
pub mod streaming;

pub use heap::UploadHeap;
pub use streaming::{StreamingManager, UploadOp};
