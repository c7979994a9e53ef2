//! Per-element GPU-visible buffers (§4.4, §4.5).

mod gpu_buffer;
mod scene_buffers;
mod slot_allocator;

pub use gpu_buffer::GPUBuffer;
pub use scene_buffers::{SceneBuffers, TransformGpu};
pub use slot_allocator::SlotAllocator;
