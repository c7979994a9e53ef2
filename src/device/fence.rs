//! Fence emulation.
//!
//! wgpu has no first-class fence object; a `wgpu::Queue::submit` returns a
//! `SubmissionIndex` that `Device::poll` can block or check against. `Fence`
//! wraps that contract behind the value-based fence API the rest of the
//! engine is written against (`fenceValue`, `onBatchSubmitted`, CPU-wait),
//! mirroring how the render queue and copy queue each own one fence.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing fence value, signalled once per submission.
#[derive(Debug, Default)]
pub struct Fence {
    value: AtomicU64,
    last_submission: Mutex<Option<wgpu::SubmissionIndex>>,
}

impl Fence {
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
            last_submission: Mutex::new(None),
        }
    }

    /// Records a submission as the next fence value. Returns the new value,
    /// to be handed to callers that need to tag work with `fenceValue`
    /// (`onBatchSubmitted`, asset-ready callbacks, disposal entries).
    pub fn signal(&self, submission: wgpu::SubmissionIndex) -> u64 {
        let value = self.value.fetch_add(1, Ordering::AcqRel) + 1;
        *self.last_submission.lock() = Some(submission);
        value
    }

    /// The most recent value this fence has been signalled to.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// CPU-blocks until the most recent submission has completed.
    pub fn wait_blocking(&self, device: &wgpu::Device) {
        let submission = self.last_submission.lock().clone();
        if let Some(submission) = submission {
            let _ = device.poll(wgpu::Maintain::WaitForSubmissionIndex(submission));
        }
    }

    /// Non-blocking poll; advances completed callbacks without waiting.
    pub fn poll(&self, device: &wgpu::Device) {
        let _ = device.poll(wgpu::Maintain::Poll);
    }
}
