//! Render and debug settings.
//!
//! [`RenderSettings`] configures the [`GraphicsDevice`](crate::device::GraphicsDevice)
//! at creation time (adapter preference, required features/limits, swap-chain
//! format, vsync). [`DebugSettings`] is a small record of hotkey-togglable
//! flags the renderer snapshots at the top of every frame.
//!
//! # Defaults
//!
//! | Field | Default | Notes |
//! |---|---|---|
//! | `vsync` | `true` | `PresentMode::AutoVsync` |
//! | `msaa_samples` | `1` | the deferred G-buffer path does not use MSAA |
//! | `power_preference` | `HighPerformance` | |
//! | `depth_format` | `Depth32Float` | reverse-Z |
//!
//! ```rust,ignore
//! let settings = RenderSettings::default();
//! let device = GraphicsDevice::new(window, &settings, width, height).await?;
//! ```

/// Configuration consumed when constructing a [`GraphicsDevice`](crate::device::GraphicsDevice).
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Present with vsync (`AutoVsync`) or without (`AutoNoVsync`).
    pub vsync: bool,
    /// MSAA sample count for forward-rendered passes (sky, overlay); the
    /// deferred opaque path always renders at 1 sample.
    pub msaa_samples: u32,
    /// Adapter power preference passed to `request_adapter`.
    pub power_preference: wgpu::PowerPreference,
    /// Features required at device creation; missing features are a
    /// load-time fatal error (§7, load-time fatal).
    pub required_features: wgpu::Features,
    /// Limits required at device creation.
    pub required_limits: wgpu::Limits,
    /// Depth/stencil format used by the G-buffer depth target and shadow maps.
    pub depth_format: wgpu::TextureFormat,
    /// Clear color for the swap-chain back-buffer (debug/blit fallback only;
    /// the deferred path clears G-buffer targets to transparent black).
    pub clear_color: wgpu::Color,
    /// Capacity, in slots, of the global bindless descriptor heap.
    pub bindless_heap_capacity: u32,
    /// Capacity, in bytes, of the upload ring heap.
    pub upload_heap_bytes: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            vsync: true,
            msaa_samples: 1,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::INDIRECT_FIRST_INSTANCE
                | wgpu::Features::MULTI_DRAW_INDIRECT
                | wgpu::Features::MULTI_DRAW_INDIRECT_COUNT
                | wgpu::Features::PUSH_CONSTANTS
                | wgpu::Features::TEXTURE_BINDING_ARRAY
                | wgpu::Features::BUFFER_BINDING_ARRAY
                | wgpu::Features::PARTIALLY_BOUND_BINDING_ARRAY
                | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING,
            required_limits: wgpu::Limits {
                max_push_constant_size: 128,
                ..wgpu::Limits::default()
            },
            depth_format: wgpu::TextureFormat::Depth32Float,
            clear_color: wgpu::Color::BLACK,
            bindless_heap_capacity: 1 << 16,
            upload_heap_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Debug visualization modes selectable by hotkey (§6, debug-visualization-mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum DebugVisualizationMode {
    #[default]
    Off = 0,
    CascadeColors = 1,
    ShadowFactor = 2,
    GBufferDepth = 3,
    XRayOcclusion = 4,
}

/// Hotkey-togglable debug flags, snapshotted at the top of each frame.
///
/// Mutated freely on the main thread (e.g. from keyboard handlers); the
/// renderer reads a copy at frame start so in-flight frames observe a
/// consistent set of flags.
#[derive(Debug, Clone)]
pub struct DebugSettings {
    /// Present with vsync.
    pub vsync: bool,
    /// Force wireframe rasterization on all opaque draws.
    pub global_wireframe: bool,
    /// Freeze the culling frustum at its current view-projection; used to
    /// fly the camera away from a frozen frustum and visually inspect culling.
    pub freeze_frustum: bool,
    /// The view-projection captured when `freeze_frustum` was enabled.
    pub frozen_view_projection: Option<glam::Mat4>,
    /// Use SDSM-derived splits instead of the fixed cascade split array.
    pub use_adaptive_splits: bool,
    /// Current debug visualization mode.
    pub debug_visualization_mode: DebugVisualizationMode,
    /// Skip Hi-Z occlusion testing in the visibility pass entirely.
    pub disable_hi_z: bool,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            vsync: true,
            global_wireframe: false,
            freeze_frustum: false,
            frozen_view_projection: None,
            use_adaptive_splits: true,
            debug_visualization_mode: DebugVisualizationMode::Off,
            disable_hi_z: false,
        }
    }
}
