//! Triple-buffered frame ring (§4.1, §9 "Frame-buffered ownership").
//!
//! Per-frame GPU-visible state (upload allocations, dirty-slot tracking,
//! command submission) is modeled as `[T; FRAME_COUNT]` arrays indexed by
//! `frame_index`. A slot may only be written once the fence from its
//! previous occupant (`frame_index` frames ago) has completed, which is
//! what [`FrameRing::begin_frame`] enforces by blocking on that slot's
//! fence before handing it back out.

use std::sync::Arc;

use crate::device::fence::Fence;

/// Number of frames kept in flight at once. Fixed at 3 throughout the
/// engine: any buffer, descriptor table, or upload region indexed by
/// `frame_index` must size its backing array to this constant.
pub const FRAME_COUNT: usize = 3;

/// One ring slot: the fence that gates reuse of everything tagged with this
/// `frame_index`, plus the command encoder accumulating this frame's work.
pub struct FrameSlot {
    pub fence: Arc<Fence>,
    pub fence_value_at_submit: u64,
    encoder: Option<wgpu::CommandEncoder>,
}

/// Round-robins through [`FRAME_COUNT`] slots, gating each on the fence
/// value recorded the last time that slot was submitted.
pub struct FrameRing {
    slots: [FrameSlot; FRAME_COUNT],
    current: usize,
    frame_number: u64,
}

impl FrameRing {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| FrameSlot {
                fence: Arc::new(Fence::new()),
                fence_value_at_submit: 0,
                encoder: None,
            }),
            current: 0,
            frame_number: 0,
        }
    }

    #[must_use]
    pub fn frame_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Blocks (if needed) until this slot's previous occupant's fence has
    /// completed, then opens a fresh command encoder for the new frame.
    pub fn begin_frame(&mut self, device: &wgpu::Device) -> usize {
        let index = self.current;
        {
            let slot = &self.slots[index];
            if slot.fence.value() < slot.fence_value_at_submit {
                slot.fence.wait_blocking(device);
            }
        }
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-ring-encoder"),
        });
        self.slots[index].encoder = Some(encoder);
        index
    }

    pub fn encoder_mut(&mut self) -> &mut wgpu::CommandEncoder {
        self.slots[self.current]
            .encoder
            .as_mut()
            .expect("begin_frame must be called before encoder_mut")
    }

    /// Submits the current slot's encoder, signals its fence, and advances
    /// the ring to the next slot.
    pub fn end_frame(&mut self, queue: &wgpu::Queue) -> u64 {
        let index = self.current;
        let encoder = self.slots[index]
            .encoder
            .take()
            .expect("begin_frame must be called before end_frame");
        let submission = queue.submit(std::iter::once(encoder.finish()));
        let value = self.slots[index].fence.signal(submission);
        self.slots[index].fence_value_at_submit = value;
        self.current = (self.current + 1) % FRAME_COUNT;
        self.frame_number += 1;
        value
    }

    #[must_use]
    pub fn fence(&self, index: usize) -> &Arc<Fence> {
        &self.slots[index].fence
    }

    /// Oldest fence value still possibly unretired across all slots, used
    /// by disposal queues to decide what is safe to free.
    #[must_use]
    pub fn min_completed_fence_value(&self) -> u64 {
        self.slots.iter().map(|s| s.fence.value()).min().unwrap_or(0)
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}
