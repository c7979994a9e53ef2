//! GraphicsDevice: adapter/device ownership, the global root signature
//! analog, command-signature stride constants, and the shared fence +
//! disposal + bindless-heap + streaming machinery every other module is
//! built on top of (§4.1). Grounded on the teacher's `WgpuContext`
//! (`renderer/core/context.rs`): adapter request, device/queue creation,
//! and surface configuration follow the same sequence, generalized here to
//! not assume ownership of a swap chain (that is [`crate::view::RenderView`]'s
//! job per §4.12, so headless render targets are equally supported).

pub mod disposal;
pub mod fence;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::bindless::{BindlessHeap, BufferTable, TextureTable};
use crate::errors::{RenderError, Result};
use crate::mesh::DRAW_CONSTANTS_SIZE;
use crate::settings::RenderSettings;
use crate::upload::{StreamingManager, UploadHeap};

use disposal::DisposalQueue;
use fence::Fence;

/// Byte stride of the bindless command-signature's per-draw record: 14
/// root-constant dwords (slots 2..15 of the root signature) followed by 4
/// draw-argument dwords, written by the scatter/command-gen cull pass.
pub const BINDLESS_COMMAND_STRIDE: usize = 72;

/// Byte stride of a plain `DrawIndexedInstanced` indirect record (wgpu's
/// native `DrawIndexedIndirectArgs`), kept for the non-bindless signature
/// used by debug/overlay draws that do not need per-draw root constants.
pub const DRAW_INDEXED_STRIDE: usize = std::mem::size_of::<wgpu::util::DrawIndexedIndirectArgs>();

/// Submits without an intervening drain before the copy queue is
/// CPU-throttled (§4.1 "Copy-queue throttling").
const COPY_QUEUE_THROTTLE_SUBMITS: u32 = 16;

/// The four static samplers bound once at root-signature scope (§4.1).
pub struct StaticSamplers {
    pub linear_wrap: wgpu::Sampler,
    pub point_clamp: wgpu::Sampler,
    pub linear_clamp: wgpu::Sampler,
    pub comparison_linear: wgpu::Sampler,
}

impl StaticSamplers {
    fn create(device: &wgpu::Device) -> Self {
        let linear_wrap = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("static-sampler-linear-wrap"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let point_clamp = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("static-sampler-point-clamp"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let linear_clamp = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("static-sampler-linear-clamp"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let comparison_linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("static-sampler-comparison-linear"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::GreaterEqual),
            ..Default::default()
        });
        Self {
            linear_wrap,
            point_clamp,
            linear_clamp,
            comparison_linear,
        }
    }
}

/// The engine's one global bind group layout, standing in for the D3D12
/// root signature (§4.1): scene/object/tiling CBVs at `b0`/`b1`/`b2`, the
/// materials table (one [`crate::material::MaterialData`] row per material,
/// indexed by `scattered_material_ids`) at `b3`, the bindless texture array,
/// the four static samplers, and the bindless raw-buffer array backing
/// mesh-attribute vertex pulling (§4.6).
pub struct RootSignature {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline_layout: wgpu::PipelineLayout,
    pub samplers: StaticSamplers,
}

impl RootSignature {
    fn create(device: &wgpu::Device, bindless_capacity: u32) -> Self {
        let samplers = StaticSamplers::create(device);
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("root-signature-bind-group-layout"),
            entries: &[
                // b0: scene constants.
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT.union(wgpu::ShaderStages::COMPUTE),
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // b1: per-pass object constants.
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT.union(wgpu::ShaderStages::COMPUTE),
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // b2: tiling/layer constants.
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT.union(wgpu::ShaderStages::COMPUTE),
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // b3: materials table (MaterialData rows).
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT.union(wgpu::ShaderStages::COMPUTE),
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // bindless texture array, partially bound.
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT.union(wgpu::ShaderStages::COMPUTE),
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: std::num::NonZeroU32::new(bindless_capacity),
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 8,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                // bindless raw mesh-attribute buffer array, partially bound.
                wgpu::BindGroupLayoutEntry {
                    binding: 9,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: std::num::NonZeroU32::new(bindless_capacity),
                },
            ],
        });

        // Per-draw mesh-part attribute indices (pos/norm/uv/index buffer
        // slots, base index), pushed immediately before each part's
        // `draw_indirect` call -- see `crate::cull`'s module doc for why a
        // handful of push-constant dwords survive here even though the
        // 14-field root-constant scheme described in §3/§6 travels through
        // bind groups instead.
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("root-signature-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::VERTEX,
                range: 0..DRAW_CONSTANTS_SIZE,
            }],
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            samplers,
        }
    }
}

/// Top-level device: adapter, logical device, the shared queue (standing in
/// for both the direct and copy queues -- wgpu exposes one `Queue` per
/// device, so the "two command queues" of §4.1 are modeled as one queue
/// with two logical fences, see `DESIGN.md`), the global root signature,
/// the bindless heap, deferred disposal, and the streaming manager.
pub struct GraphicsDevice {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
    pub root_signature: RootSignature,
    pub bindless_heap: BindlessHeap,
    pub texture_table: TextureTable,
    pub buffer_table: BufferTable,
    pub disposal: DisposalQueue,
    pub upload_heap: UploadHeap,
    pub streaming: StreamingManager,
    pub render_fence: Arc<Fence>,
    submits_since_drain: AtomicU32,
}

impl GraphicsDevice {
    /// Requests an adapter/device matching `settings` and wires up the
    /// shared subsystems. Missing required features/limits is a load-time
    /// fatal error (§7).
    pub async fn new(instance: &wgpu::Instance, settings: &RenderSettings, compatible_surface: Option<&wgpu::Surface<'_>>) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::AdapterRequestFailed(e.to_string()))?;

        let adapter_features = adapter.features();
        if !adapter_features.contains(settings.required_features) {
            let missing = settings.required_features - adapter_features;
            log::error!("adapter {:?} is missing required features: {missing:?}", adapter.get_info().name);
            return Err(RenderError::DeviceFeatureInadequate {
                feature: format!("{missing:?}"),
            });
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("graphics-device"),
                required_features: settings.required_features,
                required_limits: settings.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let root_signature = RootSignature::create(&device, settings.bindless_heap_capacity);
        let bindless_heap = BindlessHeap::new(settings.bindless_heap_capacity);
        let texture_table = TextureTable::new(&device, &queue, settings.bindless_heap_capacity);
        let buffer_table = BufferTable::new(&device, settings.bindless_heap_capacity);
        let streaming = StreamingManager::spawn(device.clone(), queue.clone());

        log::info!(
            "graphics device ready: adapter={:?} backend={:?} bindless_capacity={}",
            adapter.get_info().name,
            adapter.get_info().backend,
            settings.bindless_heap_capacity,
        );

        Ok(Self {
            adapter_info: adapter.get_info(),
            root_signature,
            bindless_heap,
            texture_table,
            buffer_table,
            disposal: DisposalQueue::new(),
            upload_heap: UploadHeap::new(settings.upload_heap_bytes),
            render_fence: Arc::new(Fence::new()),
            streaming,
            submits_since_drain: AtomicU32::new(0),
            device,
            queue,
        })
    }

    /// Load-time assertion: the bindless command signature's stride must
    /// equal the indirect-command struct size (§4.1, §6).
    pub fn assert_command_signature_stride(indirect_command_size: usize) -> Result<()> {
        if indirect_command_size != BINDLESS_COMMAND_STRIDE {
            return Err(RenderError::CommandSignatureStrideMismatch {
                command_size: indirect_command_size,
                signature_stride: BINDLESS_COMMAND_STRIDE,
            });
        }
        Ok(())
    }

    /// Call once per direct-queue submission; throttles the CPU by waiting
    /// on the copy fence after `COPY_QUEUE_THROTTLE_SUBMITS` submits without
    /// a drain, bounding unbounded queue growth (§4.1).
    pub fn note_submit(&self) {
        let count = self.submits_since_drain.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= COPY_QUEUE_THROTTLE_SUBMITS {
            self.streaming.copy_fence.wait_blocking(&self.device);
            self.submits_since_drain.store(0, Ordering::Release);
        }
    }

    /// Flushes the deferred disposal queue, releasing any bindless slots
    /// whose owning resource's fence has completed.
    pub fn flush_disposal(&mut self, completed_fence_value: u64) {
        self.disposal
            .flush(&self.device, completed_fence_value, &mut self.bindless_heap, &mut self.texture_table, &mut self.buffer_table);
    }
}
