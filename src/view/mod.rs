//! RenderView: swap-chain or headless target ownership (§4.12).
//!
//! Wraps a `wgpu::Surface` and layers the spec's `prepare()`/`present()`
//! contract on top of [`FrameRing`] (which already owns the per-slot fence
//! wait and command-encoder lifecycle). Resize is deferred: [`RenderView::resize`]
//! only records a pending size; the next [`RenderView::prepare`] waits the
//! device idle and reconfigures the surface before acquiring a frame.

use crate::device::GraphicsDevice;
use crate::errors::{RenderError, Result};
use crate::frame_ring::FrameRing;

/// Acquired swap-chain frame for one `prepare()`/`present()` cycle.
pub struct AcquiredFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

/// Owns the swap chain and the [`FrameRing`] driving triple-buffered
/// submission. Headless rendering (no swap chain) skips `Self::surface`
/// entirely and callers drive [`FrameRing`] directly; `RenderView` exists
/// specifically for the windowed path.
pub struct RenderView {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pending_size: Option<(u32, u32)>,
    frame_ring: FrameRing,
}

impl RenderView {
    /// Configures `surface` at `(width, height)` with `settings`'s vsync
    /// preference and the adapter's preferred sRGB-capable format.
    #[must_use]
    pub fn new(device: &GraphicsDevice, surface: wgpu::Surface<'static>, adapter: &wgpu::Adapter, width: u32, height: u32, vsync: bool) -> Self {
        let caps = surface.get_capabilities(adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .unwrap_or(caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: present_mode(vsync, &caps.present_modes),
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&device.device, &config);

        Self {
            surface,
            config,
            pending_size: None,
            frame_ring: FrameRing::new(),
        }
    }

    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.config.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.config.height
    }

    #[must_use]
    pub fn frame_index(&self) -> usize {
        self.frame_ring.frame_index()
    }

    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_ring.frame_number()
    }

    /// Records a pending resize; applied at the top of the next `prepare()`.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pending_size = Some((width.max(1), height.max(1)));
    }

    /// Applies any pending resize (GPU-idle wait, `reconfigure`), waits for
    /// this frame slot's previous submission, opens a fresh command encoder,
    /// and acquires the next swap-chain image.
    pub fn prepare(&mut self, device: &GraphicsDevice) -> Result<AcquiredFrame> {
        if let Some((width, height)) = self.pending_size.take() {
            let _ = device.device.poll(wgpu::Maintain::Wait);
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&device.device, &self.config);
        }

        self.frame_ring.begin_frame(&device.device);

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&device.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|e| RenderError::DeviceRemoved { reason: e.to_string() })?
            }
            Err(e @ (wgpu::SurfaceError::OutOfMemory | wgpu::SurfaceError::Other)) => {
                return Err(RenderError::DeviceRemoved { reason: e.to_string() });
            }
            Err(wgpu::SurfaceError::Timeout) => {
                return Err(RenderError::DeviceRemoved { reason: "surface acquire timed out".into() });
            }
        };
        let view = surface_texture.texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(AcquiredFrame { surface_texture, view })
    }

    #[must_use]
    pub fn encoder_mut(&mut self) -> &mut wgpu::CommandEncoder {
        self.frame_ring.encoder_mut()
    }

    /// Submits this frame's command encoder, signals the frame fence,
    /// presents, and advances the ring to the next slot.
    pub fn present(&mut self, device: &GraphicsDevice, frame: AcquiredFrame) -> u64 {
        let fence_value = self.frame_ring.end_frame(&device.queue);
        frame.surface_texture.present();
        fence_value
    }
}

fn present_mode(vsync: bool, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    let preferred = if vsync { wgpu::PresentMode::AutoVsync } else { wgpu::PresentMode::AutoNoVsync };
    if available.contains(&preferred) {
        preferred
    } else {
        available.first().copied().unwrap_or(wgpu::PresentMode::Fifo)
    }
}
