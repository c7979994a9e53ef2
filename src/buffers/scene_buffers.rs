//! `SceneBuffers` / `TransformBuffer` (§4.5): a composition of [`GPUBuffer`]
//! channels sharing one [`SlotAllocator`].

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::bindless::BindlessHeap;
use crate::device::disposal::DisposalQueue;
use crate::frame_ring::FRAME_COUNT;

use super::{GPUBuffer, SlotAllocator};

/// Row-major 4x4 world matrix, pre-transposed on CPU before `set` so shaders
/// can consume it directly (§4.5).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TransformGpu {
    pub row_major: [[f32; 4]; 4],
}

impl Default for TransformGpu {
    fn default() -> Self {
        Self::from_world(Mat4::IDENTITY)
    }
}

impl TransformGpu {
    #[must_use]
    pub fn from_world(world: Mat4) -> Self {
        let t = world.transpose();
        Self {
            row_major: t.to_cols_array_2d(),
        }
    }
}

/// Per-instance scene channels: transforms, material ids, and an
/// extensibility slot for bounds/custom data, all addressed by one shared
/// [`SlotAllocator`].
pub struct SceneBuffers {
    transforms: GPUBuffer<TransformGpu>,
    material_ids: GPUBuffer<u32>,
    slots: SlotAllocator,
}

impl SceneBuffers {
    #[must_use]
    pub fn new(device: &wgpu::Device, heap: &mut BindlessHeap, initial_capacity: usize) -> Self {
        Self {
            transforms: GPUBuffer::new(
                device,
                heap,
                "scene-transforms",
                initial_capacity,
                wgpu::BufferUsages::STORAGE,
            ),
            material_ids: GPUBuffer::new(
                device,
                heap,
                "scene-material-ids",
                initial_capacity,
                wgpu::BufferUsages::STORAGE,
            ),
            slots: SlotAllocator::new(),
        }
    }

    /// Reserves a slot in every channel, growing as needed, and initializes
    /// the transform to identity.
    pub fn allocate_slot(
        &mut self,
        device: &wgpu::Device,
        heap: &mut BindlessHeap,
        disposal: &mut DisposalQueue,
        dispose_fence_value: u64,
    ) -> u32 {
        let slot = self.slots.allocate();
        let needed = slot as usize + 1;
        self.transforms
            .grow(device, heap, disposal, dispose_fence_value, needed);
        self.material_ids
            .grow(device, heap, disposal, dispose_fence_value, needed);
        self.transforms
            .set(slot as usize, TransformGpu::from_world(Mat4::IDENTITY));
        self.material_ids.set(slot as usize, 0);
        slot
    }

    /// Zeroes the transform and schedules the slot for reuse no earlier
    /// than `current_tick + FRAME_COUNT`.
    pub fn release_slot(&mut self, slot: u32, current_tick: u64) {
        self.transforms
            .set(slot as usize, TransformGpu::from_world(Mat4::ZERO));
        self.slots.release(slot, current_tick);
    }

    /// Promotes slots whose hold period has elapsed into the free list.
    pub fn retire_released_slots(&mut self, current_tick: u64) {
        self.slots.retire(current_tick);
    }

    pub fn set_transform(&mut self, slot: u32, world: Mat4) {
        self.transforms
            .set(slot as usize, TransformGpu::from_world(world));
    }

    pub fn set_material_id(&mut self, slot: u32, material_id: u32) {
        self.material_ids.set(slot as usize, material_id);
    }

    #[must_use]
    pub fn transform(&self, slot: u32) -> Mat4 {
        Mat4::from_cols_array_2d(&self.transforms.get(slot as usize).row_major).transpose()
    }

    /// Uploads both channels for `frame_index`. Called exactly once per
    /// frame, after all `set`s and before GPU culling (§4.5).
    pub fn upload_all(&mut self, queue: &wgpu::Queue, frame_index: usize) {
        self.transforms.upload(queue, frame_index);
        self.material_ids.upload(queue, frame_index);
    }

    #[must_use]
    pub fn transforms_bindless_slot(&self, frame_index: usize) -> u32 {
        self.transforms.bindless_slot(frame_index)
    }

    #[must_use]
    pub fn material_ids_bindless_slot(&self, frame_index: usize) -> u32 {
        self.material_ids.bindless_slot(frame_index)
    }

    #[must_use]
    pub fn transforms_buffer(&self, frame_index: usize) -> &wgpu::Buffer {
        self.transforms.buffer(frame_index)
    }
}

const _: () = assert!(FRAME_COUNT == 3);
