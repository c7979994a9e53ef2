//! Deferred disposal (§4.1: "A list of `(fenceValue, resource, bindlessSlot)`;
//! on flush, any entries whose fence has completed are released.").
//!
//! Descriptor slots and GPU resources both flow through this queue so a
//! buffer being replaced by [`GPUBuffer::grow`](crate::buffers::GPUBuffer::grow)
//! or a texture being hot-reloaded is never freed while a frame still in
//! flight might reference it.

use crate::bindless::{BindlessHeap, BufferTable, TextureTable};

/// A GPU resource kept alive only for the benefit of deferred disposal.
pub enum Disposable {
    Buffer(wgpu::Buffer),
    Texture(wgpu::Texture),
}

struct Entry {
    fence_value: u64,
    resource: Disposable,
    bindless_slot: Option<u32>,
}

/// FIFO-ish list of resources awaiting fence-gated release.
///
/// Entries are pushed in increasing fence-value order in practice (each
/// frame's disposals are tagged with that frame's submission fence value),
/// so `flush` can stop scanning once the remainder are not yet guaranteed
/// complete -- the engine does not rely on that ordering for correctness
/// and retains full generality via `retain`.
#[derive(Default)]
pub struct DisposalQueue {
    entries: Vec<Entry>,
}

impl DisposalQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `resource` (and, if it owned one, `bindless_slot`) for
    /// release once `fence_value` has completed. Must be at least
    /// `FRAME_COUNT + 1` fence ticks in the future per §3's bindless slot
    /// lifetime invariant; callers compute that by signalling after the
    /// submission that stops referencing the resource.
    pub fn push(&mut self, fence_value: u64, resource: Disposable, bindless_slot: Option<u32>) {
        self.entries.push(Entry {
            fence_value,
            resource,
            bindless_slot,
        });
    }

    /// Releases every entry whose fence value has completed as of
    /// `completed_fence_value`, returning released bindless slots to `heap`
    /// and resetting the slot's entry in whichever table owned it back to
    /// its default, so a stale draw issued the same frame a slot is released
    /// can never observe a half-torn-down resource.
    pub fn flush(&mut self, device: &wgpu::Device, completed_fence_value: u64, heap: &mut BindlessHeap, textures: &mut TextureTable, buffers: &mut BufferTable) {
        let mut released = 0u32;
        self.entries.retain(|entry| {
            let ready = entry.fence_value <= completed_fence_value;
            if ready {
                if let Some(slot) = entry.bindless_slot {
                    match entry.resource {
                        Disposable::Texture(_) => textures.clear(slot),
                        Disposable::Buffer(_) => buffers.clear(device, slot),
                    }
                    heap.release(slot);
                    released += 1;
                }
            }
            !ready
        });
        if released > 0 {
            log::debug!("disposal queue released {released} bindless slot(s)");
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }
}
