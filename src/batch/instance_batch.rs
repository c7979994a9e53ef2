//! Persistent per-effect instance batch (§4.8).

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::device::GraphicsDevice;
use crate::material::Effect;

use super::bucket::DrawBucket;

/// Batches are keyed by effect identity alone; materials sharing an effect
/// share a batch (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey(pub usize);

impl BatchKey {
    #[must_use]
    pub fn of(effect: &Arc<Effect>) -> Self {
        Self(Arc::as_ptr(effect) as usize)
    }
}

/// A growable raw-byte GPU buffer backing one per-instance channel. Doubles
/// capacity when a merge exceeds it, same policy as [`crate::buffers::GPUBuffer::grow`]
/// but for opaque byte payloads rather than `Pod` elements.
struct RawChannelBuffer {
    buffer: wgpu::Buffer,
    capacity_bytes: u64,
    push_constant_slot: Option<u32>,
}

impl RawChannelBuffer {
    fn new(device: &wgpu::Device, label: &str, capacity_bytes: u64, push_constant_slot: Option<u32>) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity_bytes.max(16),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            capacity_bytes: capacity_bytes.max(16),
            push_constant_slot,
        }
    }

    fn ensure_capacity(&mut self, device: &wgpu::Device, label: &str, needed_bytes: u64) {
        if needed_bytes <= self.capacity_bytes {
            return;
        }
        let mut new_capacity = self.capacity_bytes.max(16);
        while new_capacity < needed_bytes {
            new_capacity *= 2;
        }
        *self = Self::new(device, label, new_capacity, self.push_constant_slot);
    }

    fn upload(&self, queue: &wgpu::Queue, bytes: &[u8]) {
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
    }
}

/// Persistent per-effect draw batch, retained across frames and cleared per
/// frame (§4.8, §4.9). Compaction outputs (visible indices, histogram,
/// indirect commands) are allocated by [`crate::cull::GPUCuller`] against
/// this batch's `instance_count`/`subbatch_count`, not stored redundantly
/// here.
pub struct InstanceBatch {
    pub key: BatchKey,
    pub effect: Arc<Effect>,
    descriptors: RawChannelBuffer,
    subbatch_ids: RawChannelBuffer,
    channels: FxHashMap<u64, RawChannelBuffer>,
    pub instance_count: u32,
    /// Unique mesh-part IDs seen this frame, maintained during bucket merge
    /// (§4.9's `K`).
    subbatch_set: rustc_hash::FxHashSet<u32>,
    active_frame: u64,
}

impl InstanceBatch {
    #[must_use]
    pub fn new(device: &wgpu::Device, effect: Arc<Effect>) -> Self {
        let key = BatchKey::of(&effect);
        Self {
            key,
            effect,
            descriptors: RawChannelBuffer::new(device, "instance-batch-descriptors", 4096, None),
            subbatch_ids: RawChannelBuffer::new(device, "instance-batch-subbatch-ids", 4096, None),
            channels: FxHashMap::default(),
            instance_count: 0,
            subbatch_set: rustc_hash::FxHashSet::default(),
            active_frame: u64::MAX,
        }
    }

    #[must_use]
    pub fn subbatch_count(&self) -> u32 {
        self.subbatch_set.len() as u32
    }

    /// Mesh-part IDs present in this batch, sorted ascending. The cull
    /// pass's `subbatch_list` buffer must be written in this same order
    /// (§4.9's `k` index) so the CPU-driven per-part draw loop and the
    /// GPU-computed histogram/prefix-sum agree on which part `k` names.
    #[must_use]
    pub fn subbatch_list_sorted(&self) -> Vec<u32> {
        let mut list: Vec<u32> = self.subbatch_set.iter().copied().collect();
        list.sort_unstable();
        list
    }

    #[must_use]
    pub fn is_active(&self, frame_number: u64) -> bool {
        self.active_frame == frame_number
    }

    pub fn clear_for_frame(&mut self) {
        self.instance_count = 0;
        self.subbatch_set.clear();
    }

    /// Merges every thread's bucket for this key, block-copying each
    /// channel contiguously (§4.8 "at pass execution time ... merge into
    /// the persistent batch"). Order within the merged arrays is whatever
    /// order the buckets happen to be visited in -- consumers downstream
    /// (the scatter pass) must not depend on it, per §4.8.
    pub fn merge(&mut self, device: &GraphicsDevice, buckets: impl Iterator<Item = impl AsRef<DrawBucket>>, frame_number: u64) {
        let mut descriptor_bytes = Vec::new();
        let mut subbatch_bytes = Vec::new();
        let mut channel_bytes: FxHashMap<u64, (Option<u32>, Vec<u8>)> = FxHashMap::default();

        for bucket in buckets {
            let bucket = bucket.as_ref();
            descriptor_bytes.extend_from_slice(bytemuck::cast_slice(&bucket.descriptors));
            for &id in &bucket.subbatch_ids {
                subbatch_bytes.extend_from_slice(&id.to_le_bytes());
                self.subbatch_set.insert(id);
            }
            for (hash, slot, bytes) in bucket.channel_bytes() {
                let entry = channel_bytes.entry(hash).or_insert_with(|| (slot, Vec::new()));
                entry.1.extend_from_slice(bytes);
            }
            self.instance_count += bucket.instance_count() as u32;
        }

        self.descriptors
            .ensure_capacity(&device.device, "instance-batch-descriptors", descriptor_bytes.len() as u64);
        self.descriptors.upload(&device.queue, &descriptor_bytes);

        self.subbatch_ids
            .ensure_capacity(&device.device, "instance-batch-subbatch-ids", subbatch_bytes.len() as u64);
        self.subbatch_ids.upload(&device.queue, &subbatch_bytes);

        for (hash, (slot, bytes)) in channel_bytes {
            let channel = self
                .channels
                .entry(hash)
                .or_insert_with(|| RawChannelBuffer::new(&device.device, "instance-batch-channel", bytes.len().max(16) as u64, slot));
            channel.ensure_capacity(&device.device, "instance-batch-channel", bytes.len() as u64);
            channel.upload(&device.queue, &bytes);
        }

        self.active_frame = frame_number;
    }

    #[must_use]
    pub fn descriptors_buffer(&self) -> &wgpu::Buffer {
        &self.descriptors.buffer
    }

    #[must_use]
    pub fn subbatch_ids_buffer(&self) -> &wgpu::Buffer {
        &self.subbatch_ids.buffer
    }

    /// GPU path (§4.8): registers an externally-computed batch (e.g. a
    /// terrain quadtree's compute dispatch) that bypasses CPU staging. The
    /// caller is responsible for having already written `descriptors_srv`/
    /// `subbatch_ids_srv` through the device queue.
    pub fn enqueue_gpu_batch(&mut self, instance_count: u32, subbatch_ids: &[u32], frame_number: u64) {
        self.instance_count += instance_count;
        self.subbatch_set.extend(subbatch_ids.iter().copied());
        self.active_frame = frame_number;
    }
}

impl AsRef<DrawBucket> for DrawBucket {
    fn as_ref(&self) -> &DrawBucket {
        self
    }
}
