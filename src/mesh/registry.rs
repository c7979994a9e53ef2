//! Mesh-part registry (§4.6, §3 "Mesh-part registry entry").
//!
//! A global table mapping `(meshInstanceId, partIndex) -> meshPartId`.
//! Registration is idempotent; the GPU-side entry buffer is re-uploaded in
//! full (bounded by `MAX_MESH_PARTS`) whenever it grows, matching the
//! spec's "small and bounded" re-upload policy rather than the dirty-slot
//! tracking `GPUBuffer<T>` otherwise uses.

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;

use crate::errors::{RenderError, Result};

/// Upper bound on live mesh parts; sizes the registry's GPU table and the
/// GPUCuller's per-mesh-part `histogram`/`counters` buffers.
pub const MAX_MESH_PARTS: u32 = 1 << 16;

/// Immutable, write-once GPU-side description of one mesh part.
///
/// Fixed at 72 bytes / 18 x u32 (§3) so the entry buffer can alias the same
/// stride as [`IndirectCommand`](crate::cull::IndirectCommand) for layout
/// convenience, even though the two are never read through the same view.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshPartEntry {
    pub pos_idx: u32,
    pub norm_idx: u32,
    pub uv_idx: u32,
    pub index_idx: u32,
    pub base_index: u32,
    pub vertex_count: u32,
    pub bone_weights_idx: u32,
    pub num_bones: u32,
    pub local_center: [f32; 3],
    pub local_radius: f32,
    _reserved: [u32; 6],
}

const _: () = assert!(std::mem::size_of::<MeshPartEntry>() == 72);
const _: () = assert!(std::mem::size_of::<MeshPartEntry>() % 4 == 0);

impl MeshPartEntry {
    #[must_use]
    pub fn new(
        pos_idx: u32,
        norm_idx: u32,
        uv_idx: u32,
        index_idx: u32,
        base_index: u32,
        vertex_count: u32,
        bone_weights_idx: u32,
        num_bones: u32,
        local_center: glam::Vec3,
        local_radius: f32,
    ) -> Self {
        Self {
            pos_idx,
            norm_idx,
            uv_idx,
            index_idx,
            base_index,
            vertex_count,
            bone_weights_idx,
            num_bones,
            local_center: local_center.to_array(),
            local_radius,
            _reserved: [0; 6],
        }
    }

    #[must_use]
    pub fn bounding_sphere(&self) -> crate::math::BoundingSphere {
        crate::math::BoundingSphere {
            center: glam::Vec3::from_array(self.local_center),
            radius: self.local_radius,
        }
    }
}

/// Stable-id table for `(meshInstanceId, partIndex)` pairs.
pub struct MeshRegistry {
    entries: Vec<MeshPartEntry>,
    index: FxHashMap<(u64, u32), u32>,
    dirty: bool,
}

impl MeshRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
            dirty: false,
        }
    }

    /// Idempotent: registering the same `(mesh, part)` pair again returns
    /// the existing id without mutating the table.
    pub fn register(&mut self, mesh_instance_id: u64, part_index: u32, entry: MeshPartEntry) -> Result<u32> {
        if let Some(&id) = self.index.get(&(mesh_instance_id, part_index)) {
            return Ok(id);
        }
        let id = self.entries.len() as u32;
        if id >= MAX_MESH_PARTS {
            return Err(RenderError::MeshPartOutOfRange(id));
        }
        self.entries.push(entry);
        self.index.insert((mesh_instance_id, part_index), id);
        self.dirty = true;
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, mesh_part_id: u32) -> Option<&MeshPartEntry> {
        self.entries.get(mesh_part_id as usize)
    }

    #[must_use]
    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Re-sends the entire snapshot; cheap because the table is small and
    /// bounded by [`MAX_MESH_PARTS`].
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, buffer: &mut Option<wgpu::Buffer>) {
        if !self.dirty {
            return;
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.entries);
        let needed_size = bytes.len().max(std::mem::size_of::<MeshPartEntry>()) as u64;
        let needs_realloc = match buffer {
            Some(b) => b.size() < needed_size,
            None => true,
        };
        if needs_realloc {
            *buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("mesh-part-registry"),
                size: needed_size.next_power_of_two(),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        if let Some(b) = buffer {
            queue.write_buffer(b, 0, bytes);
        }
        self.dirty = false;
    }
}

impl Default for MeshRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn sample_entry() -> MeshPartEntry {
        MeshPartEntry::new(0, 1, 2, 3, 0, 36, u32::MAX, 0, Vec3::ZERO, 1.0)
    }

    #[test]
    fn entry_is_72_bytes() {
        assert_eq!(std::mem::size_of::<MeshPartEntry>(), 72);
    }

    #[test]
    fn registration_is_idempotent() {
        let mut registry = MeshRegistry::new();
        let a = registry.register(7, 0, sample_entry()).unwrap();
        let count_after_first = registry.len();
        let b = registry.register(7, 0, sample_entry()).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), count_after_first);
    }

    #[test]
    fn distinct_parts_get_distinct_ids() {
        let mut registry = MeshRegistry::new();
        let a = registry.register(1, 0, sample_entry()).unwrap();
        let b = registry.register(2, 0, sample_entry()).unwrap();
        assert_ne!(a, b);
    }
}
