#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::doc_markdown)]

//! A GPU-driven rendering core built around bindless descriptors, indirect
//! draw submission, and compute culling.
//!
//! The engine owns no windowing or asset-import logic; it consumes decoded
//! mesh arrays, texture blobs, and material parameter tables and produces
//! frame images through a deferred shading pipeline with frustum + Hi-Z
//! occlusion culling and cascaded shadow maps with adaptive (SDSM) splits.
//!
//! # Frame lifecycle
//!
//! 1. [`RenderView::prepare`](view::RenderView::prepare) waits on frame
//!    latency and the previous submission's fence for the acquired `frameIndex`.
//! 2. Application code enqueues draws via [`batch::bucket::DrawBucket`]s.
//! 3. [`deferred::DeferredRenderer::render`] merges buckets, uploads scene
//!    buffers, runs the GPU culler, and executes the pass graph.
//! 4. [`view::RenderView::present`] submits and presents.

pub mod batch;
pub mod bindless;
pub mod buffers;
pub mod cull;
pub mod deferred;
pub mod device;
pub mod errors;
pub mod frame_ring;
pub mod material;
pub mod math;
pub mod mesh;
pub mod settings;
pub mod shadow;
pub mod shaders;
pub mod sprite;
pub mod upload;
pub mod utils;
pub mod view;

pub use device::GraphicsDevice;
pub use errors::{RenderError, Result};
pub use frame_ring::{FrameRing, FRAME_COUNT};
pub use math::Frustum;
pub use settings::{DebugSettings, RenderSettings};
pub use view::RenderView;
