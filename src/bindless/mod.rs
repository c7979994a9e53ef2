//! Global bindless descriptor heap (§4.2).
//!
//! The engine's one shader-visible heap is emulated as two parallel
//! wgpu-idiomatic structures, both indexed by the same `u32` slot:
//!
//! - [`TextureTable`], a `binding_array<texture_2d<f32>>` of up to
//!   [`BindlessHeap::capacity`] entries for SRV-style texture slots (wgpu
//!   `TEXTURE_BINDING_ARRAY` + `PARTIALLY_BOUND_BINDING_ARRAY`), rebuilt
//!   lazily whenever a slot's texture view changes;
//! - [`BufferTable`], a slot -> `wgpu::Buffer` map for mesh-attribute/index
//!   storage buffers, consumed by the vertex-pulling draw path rather than a
//!   WGSL `binding_array` (see its doc comment for why) -- a storage buffer
//!   slot that is *not* a mesh attribute (e.g. [`GPUBuffer`](crate::buffers::GPUBuffer)'s
//!   own channels) is instead bound directly as a whole buffer wherever it
//!   is consumed and does not need a `BufferTable` entry of its own, it only
//!   publishes the one SRV index other shaders use to find it.
//!
//! Slot 0 is reserved and never issued (§3, §8 boundary behavior).

pub mod buffers;
pub mod textures;

pub use buffers::BufferTable;
pub use textures::TextureTable;

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

/// Reserved null slot. Never returned by [`BindlessHeap::allocate`].
pub const NULL_SLOT: u32 = 0;

/// Slot allocator for the single shader-visible descriptor heap.
///
/// Allocation is monotonic with free-list recycling; released slots are
/// not reissued until the last owner's disposal fence has completed --
/// enforced by routing every release through
/// [`DisposalQueue`](crate::device::disposal::DisposalQueue) rather than by
/// this type directly, keeping the heap's own bookkeeping lock-cheap.
pub struct BindlessHeap {
    capacity: u32,
    next: AtomicU32,
    free_list: Mutex<Vec<u32>>,
}

impl BindlessHeap {
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            // Slot 0 is reserved; the monotonic counter starts at 1.
            next: AtomicU32::new(1),
            free_list: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Allocates a slot, preferring a recycled one. Returns `None` when the
    /// heap is exhausted (frame-time fatal per §7; callers surface
    /// [`RenderError::DescriptorHeapExhausted`](crate::errors::RenderError::DescriptorHeapExhausted)).
    pub fn allocate(&self) -> Option<u32> {
        if let Some(slot) = self.free_list.lock().pop() {
            return Some(slot);
        }
        let slot = self.next.fetch_add(1, Ordering::AcqRel);
        if slot >= self.capacity {
            self.next.store(self.capacity, Ordering::Release);
            return None;
        }
        Some(slot)
    }

    /// Returns a slot to the free list for future reuse. Callers must only
    /// call this once the owning resource's disposal fence has completed --
    /// this type performs no fence tracking itself.
    pub fn release(&mut self, slot: u32) {
        debug_assert_ne!(slot, NULL_SLOT, "slot 0 is reserved and must never be released");
        self.free_list.get_mut().push(slot);
    }

    #[must_use]
    pub fn live_count(&self) -> u32 {
        self.next.load(Ordering::Acquire).saturating_sub(1) - self.free_list.lock().len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_zero_never_issued() {
        let heap = BindlessHeap::new(16);
        for _ in 0..8 {
            let slot = heap.allocate().unwrap();
            assert_ne!(slot, NULL_SLOT);
        }
    }

    #[test]
    fn released_slots_are_recycled() {
        let mut heap = BindlessHeap::new(16);
        let a = heap.allocate().unwrap();
        let b = heap.allocate().unwrap();
        assert_ne!(a, b);
        heap.release(a);
        let c = heap.allocate().unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn exhaustion_returns_none() {
        let heap = BindlessHeap::new(2);
        // capacity 2: only slot 1 is issuable (slot 0 reserved).
        assert!(heap.allocate().is_some());
        assert!(heap.allocate().is_none());
    }
}
