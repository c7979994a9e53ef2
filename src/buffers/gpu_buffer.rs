//! Triple-buffered per-element upload buffer (§4.4).
//!
//! Grounded on the teacher's `ModelBufferAllocator` (CPU shadow array +
//! cursor + capacity-doubling `expand_capacity` + batched `flush_to_buffer`):
//! the same shape, generalized to three independently dirty-tracked frame
//! slots instead of one, and to an arbitrary `Pod` element type instead of
//! `DynamicModelUniforms`.
//!
//! wgpu has no literal persistently-mapped pointer API matching D3D12's
//! `Map`; `upload()` instead diffs the CPU shadow array against each dirty
//! slot and issues `Queue::write_buffer` calls, which is exactly the
//! teacher's `ResourceManager::write_buffer` pattern. This is a deliberate,
//! documented deviation from §4.4's literal wording (see `DESIGN.md`).

use std::collections::HashSet;
use std::marker::PhantomData;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::device::disposal::{Disposable, DisposalQueue};
use crate::frame_ring::FRAME_COUNT;

/// One upload-target GPU buffer plus the bindless SRV slot that publishes it.
struct FrameSlot {
    buffer: wgpu::Buffer,
    bindless_slot: u32,
    dirty: Mutex<HashSet<u32>>,
    dirty_all: bool,
}

/// Triple-buffered, dirty-tracked, bindless-visible array of `T`.
///
/// - `set(i, v)` writes the CPU shadow and marks index `i` dirty in *all
///   three* frame slots (§4.4).
/// - `upload()` flushes only the current frame's dirty set.
/// - `grow(n)` doubles capacity until `>= n`, deferring disposal of the old
///   GPU buffers by at least `FRAME_COUNT + 1` fence ticks.
pub struct GPUBuffer<T: Pod> {
    label: &'static str,
    cpu_shadow: Vec<T>,
    frames: [FrameSlot; FRAME_COUNT],
    usage: wgpu::BufferUsages,
    _marker: PhantomData<T>,
}

impl<T: Pod + Default> GPUBuffer<T> {
    pub fn new(
        device: &wgpu::Device,
        heap: &mut crate::bindless::BindlessHeap,
        label: &'static str,
        initial_capacity: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let frames = std::array::from_fn(|i| {
            Self::make_frame_slot(device, heap, label, initial_capacity.max(1), usage, i)
        });
        Self {
            label,
            cpu_shadow: vec![T::default(); initial_capacity],
            frames,
            usage,
            _marker: PhantomData,
        }
    }

    fn make_frame_slot(
        device: &wgpu::Device,
        heap: &mut crate::bindless::BindlessHeap,
        label: &str,
        capacity: usize,
        usage: wgpu::BufferUsages,
        frame_index: usize,
    ) -> FrameSlot {
        let size = (capacity * std::mem::size_of::<T>()).max(16) as u64;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}[frame {frame_index}]")),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bindless_slot = heap.allocate().expect("bindless heap exhausted");
        FrameSlot {
            buffer,
            bindless_slot,
            dirty: Mutex::new(HashSet::new()),
            dirty_all: true,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cpu_shadow.len()
    }

    /// Stores into the CPU shadow array and marks slot `i` dirty in all
    /// three frame buffers. Distinct-slot writes are safe to call
    /// concurrently; same-slot concurrent writes are caller-serialized.
    pub fn set(&mut self, i: usize, value: T) {
        self.cpu_shadow[i] = value;
        for frame in &mut self.frames {
            frame.dirty.lock().insert(i as u32);
        }
    }

    #[must_use]
    pub fn get(&self, i: usize) -> T {
        self.cpu_shadow[i]
    }

    /// Flushes this frame's dirty slots to its GPU buffer. Dirty-slot runs
    /// are coalesced into contiguous writes where adjacent, mirroring the
    /// teacher's `flush_to_buffer` batching.
    pub fn upload(&mut self, queue: &wgpu::Queue, frame_index: usize) {
        let frame = &mut self.frames[frame_index];
        let mut dirty: Vec<u32> = frame.dirty.get_mut().drain().collect();
        if dirty.is_empty() {
            return;
        }
        dirty.sort_unstable();

        let stride = std::mem::size_of::<T>() as u64;
        let mut run_start = 0usize;
        for idx in 0..dirty.len() {
            let at_run_end = idx + 1 == dirty.len() || dirty[idx + 1] != dirty[idx] + 1;
            if at_run_end {
                let first = dirty[run_start] as usize;
                let last = dirty[idx] as usize;
                let bytes = bytemuck::cast_slice(&self.cpu_shadow[first..=last]);
                queue.write_buffer(&frame.buffer, first as u64 * stride, bytes);
                run_start = idx + 1;
            }
        }
    }

    /// Doubles capacity until `>= n`, rebuilding all three frame buffers and
    /// scheduling the old ones for deferred disposal.
    pub fn grow(
        &mut self,
        device: &wgpu::Device,
        heap: &mut crate::bindless::BindlessHeap,
        disposal: &mut DisposalQueue,
        dispose_fence_value: u64,
        n: usize,
    ) {
        if n <= self.capacity() {
            return;
        }
        let mut new_capacity = self.capacity().max(1);
        while new_capacity < n {
            new_capacity *= 2;
        }
        self.cpu_shadow.resize(new_capacity, T::default());

        for (i, frame) in self.frames.iter_mut().enumerate() {
            let new_slot = Self::make_frame_slot(device, heap, self.label, new_capacity, self.usage, i);
            let old = std::mem::replace(frame, new_slot);
            disposal.push(
                dispose_fence_value,
                Disposable::Buffer(old.buffer),
                Some(old.bindless_slot),
            );
            frame.dirty_all = true;
            *frame.dirty.get_mut() = (0..new_capacity as u32).collect();
        }
    }

    #[must_use]
    pub fn bindless_slot(&self, frame_index: usize) -> u32 {
        self.frames[frame_index].bindless_slot
    }

    #[must_use]
    pub fn buffer(&self, frame_index: usize) -> &wgpu::Buffer {
        &self.frames[frame_index].buffer
    }

    #[must_use]
    pub fn has_pending_dirty(&self, frame_index: usize) -> bool {
        !self.frames[frame_index].dirty.lock().is_empty()
    }
}
