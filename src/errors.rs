//! Error Types
//!
//! This module defines the error taxonomy used throughout the engine, split
//! along the same fault lines as the rest of the system: failures that abort
//! startup, failures that are recoverable with a logged fallback, and
//! frame-time failures that either degrade a single frame or terminate the
//! render loop.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, RenderError>`.
//!
//! ```rust,ignore
//! use forgelight::errors::{RenderError, Result};
//!
//! fn load_shader() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the rendering core.
///
/// Variants are grouped by when they surface: device/load-time errors are
/// fatal and abort startup; resource and frame-time errors are usually
/// recoverable by falling back to a default and logging.
#[derive(Error, Debug)]
pub enum RenderError {
    // ========================================================================
    // Load-time, fatal
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("failed to request graphics adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// The adapter lacks a feature or limit required at load time (bindless
    /// indexing, storage buffer count, indirect-draw support, ...).
    #[error("device feature inadequate: {feature}")]
    DeviceFeatureInadequate {
        /// Name of the missing feature or limit.
        feature: String,
    },

    /// Window system error surfaced while creating a surface.
    #[error("window system error: {0}")]
    WindowError(#[from] raw_window_handle::HandleError),

    /// Shader source failed to compile or failed FX parsing.
    #[error("shader compile failed in {file} ({entry}): {message}")]
    ShaderCompileFailed {
        /// Shader source file.
        file: String,
        /// Entry point that failed.
        entry: String,
        /// Compiler diagnostic.
        message: String,
    },

    /// Failed to assemble a pipeline state object from a PSO key.
    #[error("pipeline creation failed for {pass} (effect {effect}): {message}")]
    PipelineCreateFailed {
        /// Effect file name.
        effect: String,
        /// Pass name within the effect.
        pass: String,
        /// Underlying diagnostic.
        message: String,
    },

    /// The indirect-command struct size does not equal the bindless command
    /// signature stride. This is a load-time assertion, not a frame-time one.
    #[error(
        "indirect command stride mismatch: command size {command_size}, signature stride {signature_stride}"
    )]
    CommandSignatureStrideMismatch {
        /// `size_of::<IndirectCommand>()`.
        command_size: usize,
        /// Stride declared by the command signature.
        signature_stride: usize,
    },

    // ========================================================================
    // Frame-time, fatal
    // ========================================================================
    /// The device was lost mid-frame.
    #[error("device removed: {reason}")]
    DeviceRemoved {
        /// Reason reported by the backend, if any.
        reason: String,
    },

    /// An upload was requested larger than the upload heap's total capacity.
    #[error("upload of {requested} bytes exceeds upload heap capacity {capacity}")]
    UploadTooLarge {
        /// Requested allocation size in bytes.
        requested: u64,
        /// Total heap capacity in bytes.
        capacity: u64,
    },

    /// The bindless descriptor heap has no free slots left.
    #[error("bindless descriptor heap exhausted (capacity {capacity})")]
    DescriptorHeapExhausted {
        /// Configured heap capacity.
        capacity: u32,
    },

    // ========================================================================
    // Asset / resource errors (mostly recoverable)
    // ========================================================================
    /// The requested asset was not found.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// A mesh-part lookup referenced an id outside the registered range.
    #[error("mesh part id out of range: {0}")]
    MeshPartOutOfRange(u32),

    /// Effect source references an undeclared resource-binding slot.
    #[error("effect {effect} binds unknown resource name {name:?}")]
    UnknownResourceBinding {
        /// Effect file name.
        effect: String,
        /// Semantic name the shader referenced.
        name: String,
    },

    // ========================================================================
    // I/O
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Image decoding error (used for the default-texture fallback path).
    #[error("image decode error: {0}")]
    ImageDecodeError(String),

    // ========================================================================
    // Threading
    // ========================================================================
    /// The streaming worker thread terminated unexpectedly.
    #[error("streaming worker error: {0}")]
    StreamingWorkerError(String),
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        RenderError::ImageDecodeError(err.to_string())
    }
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
