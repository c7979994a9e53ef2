//! Backing storage for the bindless raw-buffer array (§4.6, §9's
//! `BUFFER_BINDING_ARRAY`/`PARTIALLY_BOUND_BINDING_ARRAY` feature
//! requirements).
//!
//! [`BindlessHeap`](super::BindlessHeap) hands out the slot numbers that
//! [`crate::mesh::MeshPartEntry`] stores as `posIdx`/`normIdx`/`uvIdx`/
//! `indexIdx`; [`BufferTable`] is where a slot's actual `wgpu::Buffer` lives,
//! mirroring [`TextureTable`](super::TextureTable) on the buffer side. Every
//! slot is bound as a whole-buffer `binding_array<array<u32>>` entry in WGSL
//! (`bindless_buffers` in `gbuffer.wgsl`/`shadow_depth.wgsl`); positions,
//! normals, UVs, and index buffers all share this one homogeneous `u32`-word
//! array and are reinterpreted per attribute kind in the shader (`bitcast`
//! for float attributes), the same "raw address buffer" convention a
//! bindless D3D12 heap uses for StructuredBuffer<uint> SRVs, since WGSL's
//! `binding_array` requires one element type for every entry of a binding.

pub struct BufferTable {
    buffers: Vec<wgpu::Buffer>,
    dirty: bool,
}

impl BufferTable {
    #[must_use]
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        let buffers = (0..capacity).map(|_| Self::placeholder(device)).collect();
        Self { buffers, dirty: true }
    }

    fn placeholder(device: &wgpu::Device) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bindless-default-buffer-slot"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        })
    }

    /// Points bindless slot `slot` at `buffer`, replacing whatever occupied
    /// it. No-op if `slot` is out of range (the heap's capacity bounds it).
    pub fn set(&mut self, slot: u32, buffer: wgpu::Buffer) {
        if let Some(entry) = self.buffers.get_mut(slot as usize) {
            *entry = buffer;
            self.dirty = true;
        }
    }

    /// Resets slot `slot` back to an empty placeholder (called from
    /// [`crate::device::disposal::DisposalQueue::flush`]'s release path).
    pub fn clear(&mut self, device: &wgpu::Device, slot: u32) {
        if let Some(entry) = self.buffers.get_mut(slot as usize) {
            *entry = Self::placeholder(device);
            self.dirty = true;
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Borrowed whole-buffer bindings suitable for
    /// `BindingResource::BufferArray`, one per bindless slot.
    #[must_use]
    pub fn bindings(&self) -> Vec<wgpu::BufferBinding<'_>> {
        self.buffers
            .iter()
            .map(|buffer| wgpu::BufferBinding { buffer, offset: 0, size: None })
            .collect()
    }
}

const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check(_: &BufferTable) {
        assert_send_sync::<wgpu::Buffer>();
    }
};
