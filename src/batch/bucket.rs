//! Thread-local staging for one `(Effect, thread)` pair (§4.8 CPU path).
//!
//! A bucket accumulates the current frame's draws for one [`BatchKey`] on
//! whichever thread called [`DrawBucket::enqueue`]; at pass execution time
//! every thread's bucket for a key is block-copied into the persistent
//! [`crate::batch::InstanceBatch`] and then cleared. Plain `Vec<u8>` growth
//! already doubles on reallocation, which is what §4.8's "capacity doubling"
//! describes -- no separate growth policy is implemented here.

use rustc_hash::FxHashMap;

use crate::material::{MaterialBlock, Param, ResourceBinding};

/// One CPU-enqueued draw before it is staged into per-instance channels.
#[derive(Debug, Clone, Copy)]
pub struct RawDraw {
    pub mesh_instance_id: u64,
    pub part_index: u32,
    pub transform_slot: u32,
    pub material_id: u32,
    pub mesh_part_id: u32,
}

/// The fixed 12-byte descriptor staged per instance: `{transformSlot,
/// materialId, customIdx}` (§4.8).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceDescriptor {
    pub transform_slot: u32,
    pub material_id: u32,
    pub custom_idx: u32,
}

/// Per-instance staged bytes for one non-texture material parameter,
/// addressed by the parameter's name hash. Carries the push-constant slot
/// the Effect's resource-binding table resolves it to, resolved lazily on
/// first write since the effect may not be known until the first enqueue
/// that references it.
struct Channel {
    push_constant_slot: Option<u32>,
    element_stride: usize,
    elements_per_instance: usize,
    bytes: Vec<u8>,
}

impl Channel {
    fn new(element_stride: usize, elements_per_instance: usize) -> Self {
        Self {
            push_constant_slot: None,
            element_stride,
            elements_per_instance,
            bytes: Vec::new(),
        }
    }
}

fn hash_name(name: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Thread-local per-effect staging area.
#[derive(Default)]
pub struct DrawBucket {
    pub raw_draws: Vec<RawDraw>,
    pub descriptors: Vec<InstanceDescriptor>,
    pub subbatch_ids: Vec<u32>,
    channels: FxHashMap<u64, Channel>,
}

impl DrawBucket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one draw's staged data. `bindings` resolves non-texture
    /// parameter names to their push-constant slot the first time a channel
    /// is touched; subsequent enqueues reuse the cached slot.
    pub fn enqueue(&mut self, raw: RawDraw, block: &MaterialBlock, bindings: &ResourceBinding) {
        self.raw_draws.push(raw);
        self.descriptors.push(InstanceDescriptor {
            transform_slot: raw.transform_slot,
            material_id: raw.material_id,
            custom_idx: 0,
        });
        self.subbatch_ids.push(raw.mesh_part_id);

        for (name, param) in block.iter() {
            if matches!(param, Param::Texture(_)) {
                continue;
            }
            let hash = hash_name(name);
            let channel = self
                .channels
                .entry(hash)
                .or_insert_with(|| Channel::new(param.element_stride(), param.elements_per_instance()));
            if channel.push_constant_slot.is_none() {
                channel.push_constant_slot = bindings.slot_of(name);
            }
            param.write_bytes(&mut channel.bytes);
        }
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.raw_draws.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw_draws.is_empty()
    }

    /// Iterates staged channels by name hash, for merge-time block copy.
    pub fn channel_bytes(&self) -> impl Iterator<Item = (u64, Option<u32>, &[u8])> {
        self.channels
            .iter()
            .map(|(hash, ch)| (*hash, ch.push_constant_slot, ch.bytes.as_slice()))
    }

    pub fn clear(&mut self) {
        self.raw_draws.clear();
        self.descriptors.clear();
        self.subbatch_ids.clear();
        for channel in self.channels.values_mut() {
            channel.bytes.clear();
        }
    }
}
