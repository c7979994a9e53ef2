//! Cascaded shadow maps with SDSM-adaptive splits (§4.10).
//!
//! Ties together cascade fitting ([`cascades`]), depth-distribution analysis
//! ([`sdsm`]), and a per-cascade reuse of [`crate::cull::GPUCuller`] against a
//! dedicated depth-only pipeline. One compute dispatch set per cascade per
//! batch populates that cascade's [`CullBuffers`](crate::cull::CullBuffers),
//! whose `indirect_commands` then drive a depth-only `multi_draw_indirect`
//! into that cascade's array layer -- occlusion culling is always disabled
//! for shadow casters (a caster occluded from the camera can still cast a
//! visible shadow), so each cascade's visibility pass runs with
//! `disable_hiz = 1` against a throwaway 1x1 Hi-Z view.

pub mod cascades;
pub mod sdsm;

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::batch::{BatchKey, InstanceBatch};
use crate::cull::{BatchConstants, CullBuffers, FrustumUniformGpu, GPUCuller, IndirectCommand};
use crate::device::GraphicsDevice;
use crate::mesh::{MeshRegistry, PartDrawConstants, DRAW_CONSTANTS_SIZE};
use crate::settings::DebugSettings;
use crate::shaders;

pub use cascades::{Cascade, CASCADE_COUNT, FIXED_SPLITS};
pub use sdsm::{SdsmAnalyzer, EMPTY_DEPTH_SENTINEL};

/// Shadow map resolution per cascade layer; also the texel grid the
/// cascade-fitting math snaps against.
pub const SHADOW_MAP_RESOLUTION: u32 = 2048;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ShadowSceneConstantsGpu {
    light_view_projection: [[f32; 4]; 4],
}

/// The depth-only array texture backing all four cascades: one `Depth32Float`
/// layer per cascade, rendered individually and sampled together as a
/// `texture_depth_2d_array` by the light pass.
pub struct ShadowMaps {
    pub texture: wgpu::Texture,
    layer_views: Vec<wgpu::TextureView>,
    pub sampled_view: wgpu::TextureView,
}

impl ShadowMaps {
    #[must_use]
    fn new(device: &wgpu::Device, resolution: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-cascade-array"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: CASCADE_COUNT as u32,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let layer_views = (0..CASCADE_COUNT as u32)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("shadow-cascade-layer-view"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let sampled_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("shadow-cascade-array-view"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        Self {
            texture,
            layer_views,
            sampled_view,
        }
    }

    #[must_use]
    fn layer_view(&self, cascade_index: usize) -> &wgpu::TextureView {
        &self.layer_views[cascade_index]
    }
}

/// A throwaway 1x1 Hi-Z-shaped view so [`GPUCuller::cull_batch`] can be
/// reused unmodified for shadow casting; `disable_hiz` in the frustum
/// uniform means the visibility shader never samples it.
struct DummyHiZ {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DummyHiZ {
    fn new(device: &wgpu::Device) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-dummy-hiz"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Per-(cascade, batch) GPU state that must persist across frames (the cull
/// buffers) keyed the same way [`crate::batch::InstanceBatch`] already keys
/// batches by effect identity.
struct CascadeBatchState {
    cull_buffers: CullBuffers,
    frustum_uniform: wgpu::Buffer,
    batch_constants: wgpu::Buffer,
    subbatch_list: wgpu::Buffer,
}

/// Orchestrates cascade fitting, SDSM analysis, per-cascade GPU culling, and
/// depth-only rendering into [`ShadowMaps`].
pub struct ShadowPipeline {
    pub maps: ShadowMaps,
    depth_pipeline: wgpu::RenderPipeline,
    scene_bind_group_layout: wgpu::BindGroupLayout,
    group1_bgl: wgpu::BindGroupLayout,
    scene_constants: Vec<wgpu::Buffer>,
    scene_bind_groups: Vec<wgpu::BindGroup>,
    dummy_hiz: DummyHiZ,
    per_cascade_batch_state: FxHashMap<(u32, BatchKey), CascadeBatchState>,
    sdsm: SdsmAnalyzer,
    pub cascades: [Cascade; CASCADE_COUNT],
    pub last_sdsm_splits: Option<[f32; 4]>,
    resolution: u32,
}

impl ShadowPipeline {
    #[must_use]
    pub fn new(device: &wgpu::Device, resolution: u32, bindless_capacity: u32) -> Self {
        let maps = ShadowMaps::new(device, resolution);

        let scene_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-scene-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let group1_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-group1-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // bindless raw mesh-attribute buffer array, partially bound --
                // mirrors the root signature's binding 9 (§4.6), duplicated
                // here because the depth-only pipeline's group 0 is a small
                // scene-only layout rather than the full root signature.
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow-depth-pipeline-layout"),
            bind_group_layouts: &[&scene_bind_group_layout, &group1_bgl],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::VERTEX,
                range: 0..DRAW_CONSTANTS_SIZE,
            }],
        });

        let module = shaders::create_module(device, "shadow_depth.wgsl");
        let depth_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow-depth-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let scene_constants: Vec<wgpu::Buffer> = (0..CASCADE_COUNT)
            .map(|_| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("shadow-scene-constants"),
                    size: std::mem::size_of::<ShadowSceneConstantsGpu>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let scene_bind_groups = scene_constants
            .iter()
            .map(|buffer| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("shadow-scene-bg"),
                    layout: &scene_bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let identity_cascade = Cascade {
            near: 0.0,
            far: 0.0,
            light_view_projection: Mat4::IDENTITY,
            frustum: crate::math::Frustum::from_matrix_standard_z(Mat4::IDENTITY),
        };

        Self {
            maps,
            depth_pipeline,
            scene_bind_group_layout,
            group1_bgl,
            scene_constants,
            scene_bind_groups,
            dummy_hiz: DummyHiZ::new(device),
            per_cascade_batch_state: FxHashMap::default(),
            sdsm: SdsmAnalyzer::new(device),
            cascades: [identity_cascade; CASCADE_COUNT],
            last_sdsm_splits: None,
            resolution,
        }
    }

    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Refits all four cascades against the current camera and light
    /// direction, choosing SDSM-derived splits over [`FIXED_SPLITS`] per
    /// `debug.use_adaptive_splits`, and falling back to the fixed splits
    /// when the last SDSM reading was the empty-depth sentinel (§8 scenario f).
    pub fn fit(&mut self, camera_inverse_view_projection: Mat4, camera_position: Vec3, light_direction: Vec3, near_plane: f32, debug: &DebugSettings) {
        let splits = match (debug.use_adaptive_splits, self.last_sdsm_splits) {
            (true, Some(s)) if s != EMPTY_DEPTH_SENTINEL => s,
            _ => FIXED_SPLITS,
        };
        self.cascades = cascades::fit_cascades(camera_inverse_view_projection, camera_position, light_direction, near_plane, splits, self.resolution);
    }

    /// Dispatches the three SDSM compute passes against the previous frame's
    /// linear-depth G-buffer. Call once per frame before [`Self::fit`] is
    /// needed next frame (the readback is one frame late).
    pub fn analyze_depth_distribution(&self, device: &wgpu::Device, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder, linear_depth: &wgpu::TextureView, near_plane: f32) {
        self.sdsm.analyze(device, queue, encoder, linear_depth, near_plane);
    }

    /// Maps this frame's SDSM readback (queued by last frame's
    /// [`Self::analyze_depth_distribution`]) and stores it for the next
    /// [`Self::fit`] call.
    pub fn collect_sdsm_splits(&mut self, device: &wgpu::Device) {
        self.last_sdsm_splits = Some(self.sdsm.read_splits(device));
    }

    fn cascade_frustum_gpu(cascade: &Cascade) -> FrustumUniformGpu {
        let planes = cascade.frustum.planes();
        FrustumUniformGpu {
            planes: [planes[0].to_array(), planes[1].to_array(), planes[2].to_array(), planes[3].to_array(), planes[4].to_array(), planes[5].to_array()],
            prev_view_proj: cascade.light_view_projection.to_cols_array_2d(),
            hiz_mip_count: 0,
            hiz_width: 1,
            hiz_height: 1,
            debug_xray: 0,
            disable_hiz: 1,
            skinned_radius_scale: 1.5,
            _pad0: 0,
            _pad1: 0,
        }
    }

    /// Culls and renders every batch in `batches` into each cascade layer.
    /// `mesh_registry_buffer`/`transforms_buffer` are the current frame's
    /// registry/transform SRVs; `batch_constants_of` resolves a batch's
    /// current bindless SRV indices (the caller already holds these for the
    /// opaque pass and just needs to reuse them here).
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        device: &GraphicsDevice,
        encoder: &mut wgpu::CommandEncoder,
        culler: &GPUCuller,
        batches: &[Arc<InstanceBatch>],
        mesh_registry: &MeshRegistry,
        mesh_registry_buffer: &wgpu::Buffer,
        transforms_buffer: &wgpu::Buffer,
        batch_constants_of: impl Fn(&InstanceBatch) -> BatchConstants,
    ) {
        for (cascade_index, cascade) in self.cascades.iter().enumerate() {
            let scg = ShadowSceneConstantsGpu {
                light_view_projection: cascade.light_view_projection.to_cols_array_2d(),
            };
            device.queue.write_buffer(&self.scene_constants[cascade_index], 0, bytemuck::bytes_of(&scg));

            let mut layer_cleared = false;

            for batch in batches {
                if batch.instance_count == 0 {
                    continue;
                }
                let part_count = batch.subbatch_count();
                let state = self.per_cascade_batch_state.entry((cascade_index as u32, batch.key)).or_insert_with(|| CascadeBatchState {
                    cull_buffers: CullBuffers::new(&device.device, batch.instance_count.max(1)),
                    frustum_uniform: device.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("shadow-cascade-frustum"),
                        size: std::mem::size_of::<FrustumUniformGpu>() as u64,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }),
                    batch_constants: device.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("shadow-batch-constants"),
                        size: std::mem::size_of::<BatchConstants>() as u64,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }),
                    subbatch_list: device.device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("shadow-subbatch-list"),
                        size: (crate::mesh::MAX_MESH_PARTS as u64 * 4).max(16),
                        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }),
                });
                state.cull_buffers.ensure_capacity(&device.device, batch.instance_count, part_count);

                let subbatch_list = batch.subbatch_list_sorted();
                device.queue.write_buffer(&state.subbatch_list, 0, bytemuck::cast_slice(&subbatch_list));

                device.queue.write_buffer(&state.frustum_uniform, 0, bytemuck::bytes_of(&Self::cascade_frustum_gpu(cascade)));
                let mut constants = batch_constants_of(batch);
                constants.part_count = part_count;
                device.queue.write_buffer(&state.batch_constants, 0, bytemuck::bytes_of(&constants));

                culler.cull_batch(
                    device,
                    encoder,
                    batch,
                    &state.cull_buffers,
                    &state.frustum_uniform,
                    mesh_registry_buffer,
                    transforms_buffer,
                    &self.dummy_hiz.view,
                    &state.subbatch_list,
                    &state.batch_constants,
                );

                let group1_bind_group = device.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("shadow-group1-bg"),
                    layout: &self.group1_bgl,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: transforms_buffer.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 1, resource: state.cull_buffers.visible_indices.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::BufferArray(&device.buffer_table.bindings()) },
                    ],
                });

                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("shadow-cascade-depth-pass"),
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: self.maps.layer_view(cascade_index),
                        depth_ops: Some(wgpu::Operations {
                            load: if layer_cleared { wgpu::LoadOp::Load } else { wgpu::LoadOp::Clear(1.0) },
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                layer_cleared = true;
                pass.set_pipeline(&self.depth_pipeline);
                pass.set_bind_group(0, &self.scene_bind_groups[cascade_index], &[]);
                pass.set_bind_group(1, &group1_bind_group, &[]);
                for (k, part_id) in subbatch_list.iter().enumerate() {
                    let Some(part) = mesh_registry.get(*part_id) else { continue };
                    pass.set_push_constants(wgpu::ShaderStages::VERTEX, 0, bytemuck::bytes_of(&PartDrawConstants::for_part(part)));
                    let offset = (k as u64) * std::mem::size_of::<IndirectCommand>() as u64 + 56;
                    pass.draw_indirect(&state.cull_buffers.indirect_commands, offset);
                }
            }

            if !layer_cleared {
                // No batch had instances this frame; still clear the layer so
                // the light pass never samples a stale depth from an earlier
                // frame's geometry.
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("shadow-cascade-clear-pass"),
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: self.maps.layer_view(cascade_index),
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }
        }
    }
}
