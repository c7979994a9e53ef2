//! Background streaming worker (§4.3, §9).
//!
//! Per §9's design note, the "upload closures" are replaced by an explicit
//! [`UploadOp`] enum so the queue never accumulates heap-allocated closures.
//! The queue itself is a plain `std::sync::mpsc` channel: the corpus this
//! engine is grounded in never reaches for `crossbeam-channel`, and `mpsc`
//! already gives the worker thread a blocking receive with a timeout-free
//! wake-up, which is all §5's "CPU-waits on its event handle between drains"
//! suspension point needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::device::fence::Fence;

/// Up to this many queued ops are drained per copy-queue submission (§4.3:
/// "invoke up to K (>= 64) closures").
const DRAIN_BATCH_SIZE: usize = 64;

/// Poll timeout while idle, bounding the worker's wake-up latency (§5: "max
/// 10 ms poll").
const IDLE_POLL: Duration = Duration::from_millis(10);

/// A handle an asset can poll (or be notified through) once the batch that
/// uploaded its data has retired.
#[derive(Clone)]
pub struct AssetReadyTag {
    fence_value: Arc<AtomicU64>,
}

impl AssetReadyTag {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fence_value: Arc::new(AtomicU64::new(0)),
        }
    }

    fn mark_submitted(&self, fence_value: u64) {
        self.fence_value.store(fence_value, Ordering::Release);
    }

    /// Returns `true` once `completed_fence_value` has reached the batch
    /// this tag was attached to.
    #[must_use]
    pub fn is_ready(&self, completed_fence_value: u64) -> bool {
        let v = self.fence_value.load(Ordering::Acquire);
        v != 0 && v <= completed_fence_value
    }
}

impl Default for AssetReadyTag {
    fn default() -> Self {
        Self::new()
    }
}

/// One queued upload. Replaces a boxed closure with an explicit variant so
/// the drain loop can interpret and apply it without indirection.
pub enum UploadOp {
    Texture {
        destination: Arc<wgpu::Texture>,
        data: Vec<u8>,
        layout: wgpu::TexelCopyBufferLayout,
        size: wgpu::Extent3d,
        owner: Option<AssetReadyTag>,
    },
    Buffer {
        destination: Arc<wgpu::Buffer>,
        offset: u64,
        data: Vec<u8>,
        owner: Option<AssetReadyTag>,
    },
}

impl UploadOp {
    fn owner(&self) -> Option<&AssetReadyTag> {
        match self {
            UploadOp::Texture { owner, .. } | UploadOp::Buffer { owner, .. } => owner.as_ref(),
        }
    }
}

/// Background worker that drains queued [`UploadOp`]s onto the copy queue.
///
/// Owns the sending half of the channel; [`StreamingManager::enqueue_*`]
/// methods are the lock-free contract assets call into from any thread.
pub struct StreamingManager {
    sender: Sender<UploadOp>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    worker: Option<JoinHandle<()>>,
    /// Fence signalled after each drain's submission; render-queue GPU waits
    /// reference this value (§5: "the render queue issues a GPU-side wait on
    /// the latest copy-submit fence value").
    pub copy_fence: Arc<Fence>,
}

impl StreamingManager {
    /// Spawns the worker thread. `device`/`queue` are cloned handles used
    /// only for copy-style command encoding and submission; wgpu exposes a
    /// single `Queue` per device, so "copy queue" here is a logical role
    /// rather than a distinct hardware queue (see `DESIGN.md`).
    #[must_use]
    pub fn spawn(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let (sender, receiver) = std::sync::mpsc::channel();
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let copy_fence = Arc::new(Fence::new());

        let worker_shutdown = shutdown.clone();
        let worker_fence = copy_fence.clone();
        let worker = std::thread::Builder::new()
            .name("forgelight-streaming".to_string())
            .spawn(move || {
                worker_loop(device, queue, receiver, worker_shutdown, worker_fence);
            })
            .expect("failed to spawn streaming worker thread");

        Self {
            sender,
            shutdown,
            worker: Some(worker),
            copy_fence,
        }
    }

    /// Enqueues a texture upload; `owner`, if present, is tagged with the
    /// batch fence once submitted.
    pub fn enqueue_texture_upload(
        &self,
        destination: Arc<wgpu::Texture>,
        data: Vec<u8>,
        layout: wgpu::TexelCopyBufferLayout,
        size: wgpu::Extent3d,
        owner: Option<AssetReadyTag>,
    ) {
        let _ = self.sender.send(UploadOp::Texture {
            destination,
            data,
            layout,
            size,
            owner,
        });
    }

    /// Enqueues a raw buffer upload.
    pub fn enqueue_buffer_upload(
        &self,
        destination: Arc<wgpu::Buffer>,
        offset: u64,
        data: Vec<u8>,
        owner: Option<AssetReadyTag>,
    ) {
        let _ = self.sender.send(UploadOp::Buffer {
            destination,
            offset,
            data,
            owner,
        });
    }

    /// Blocks until the queue is empty and the last submitted fence has
    /// completed (§4.3: required before the first rendered frame).
    pub fn flush(&self, device: &wgpu::Device) {
        // The worker drains eagerly; give it a moment to catch up, then wait
        // on its fence. There is no queue-depth introspection exposed here
        // by design -- `mpsc::Sender` cannot report a length -- so flush is
        // approximate for a mid-frame call and exact only once the caller
        // knows no further enqueues are racing it (true at startup, the
        // documented use case).
        std::thread::sleep(IDLE_POLL);
        self.copy_fence.wait_blocking(device);
    }
}

impl Drop for StreamingManager {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    receiver: Receiver<UploadOp>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    copy_fence: Arc<Fence>,
) {
    loop {
        let mut batch = Vec::with_capacity(DRAIN_BATCH_SIZE);
        match receiver.recv_timeout(IDLE_POLL) {
            Ok(op) => batch.push(op),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                continue;
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
        }
        while batch.len() < DRAIN_BATCH_SIZE {
            match receiver.try_recv() {
                Ok(op) => batch.push(op),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("forgelight-copy-queue"),
        });
        // wgpu's write_buffer/write_texture are queue-side, not
        // encoder-side; the encoder above documents the copy-queue role
        // even though these two calls submit through the same `queue`
        // handle immediately. A real multi-queue backend would instead
        // append copy commands to `encoder` and submit it once below.
        let _ = &mut encoder;

        for op in &batch {
            match op {
                UploadOp::Texture {
                    destination,
                    data,
                    layout,
                    size,
                    ..
                } => {
                    queue.write_texture(
                        wgpu::TexelCopyTextureInfo {
                            texture: destination,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        data,
                        *layout,
                        *size,
                    );
                }
                UploadOp::Buffer {
                    destination,
                    offset,
                    data,
                    ..
                } => {
                    queue.write_buffer(destination, *offset, data);
                }
            }
        }

        let submission = queue.submit(std::iter::empty());
        let fence_value = copy_fence.signal(submission);
        for op in &batch {
            if let Some(owner) = op.owner() {
                owner.mark_submitted(fence_value);
            }
        }

        if shutdown.load(Ordering::Acquire) {
            // Drain whatever remains before exiting.
            while let Ok(op) = receiver.try_recv() {
                drop(op);
            }
            return;
        }
    }
}
