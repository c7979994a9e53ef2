//! Bindless quad batcher + bitmap font layout (§4 "SpriteBatch + Font (HUD)").
//!
//! A [`SpriteBatch`] is a single draw: every enqueued quad becomes one
//! [`SpriteInstance`] row in a storage buffer, drawn with one
//! `draw(0..4, 0..instance_count)` triangle-strip call per vertex-pulled
//! instance, the same instance-buffer-plus-indirect-free pattern
//! [`crate::material::MaterialTable`] uses for its own small, CPU-authored
//! table. Unlike the deferred pass graph, HUD quads have no per-instance
//! occlusion culling or G-buffer participation: the batch is just a list of
//! screen-space rectangles sampling the shared bindless texture array, blended
//! over whatever `render`'s target already holds -- typically the composited
//! frame, but any `TextureView` works, including an offscreen render target
//! meant for further compositing.
//!
//! [`Font`] turns UTF-8 text into a run of [`SpriteInstance`]s against a
//! pre-uploaded glyph atlas. It supports both fixed-width (monospace) and
//! variable-width bitmap fonts, mirroring the two font-loading entry points a
//! bitmap-font HUD API typically exposes; TrueType/vector rasterization is
//! out of scope here, same as the rest of the asset pipeline.

mod font;

pub use font::Font;

use bytemuck::{Pod, Zeroable};

use crate::device::GraphicsDevice;
use crate::shaders;

/// One quad: destination rect and atlas UV rect in pixels/normalized units,
/// a tint color, and the bindless slot of the texture to sample.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SpriteInstance {
    /// `(x, y, w, h)` in screen pixels, origin top-left.
    pub rect: [f32; 4],
    /// `(u, v, w, h)` normalized UV rect within the bound texture.
    pub uv_rect: [f32; 4],
    /// Linear RGBA tint multiplied into the sampled texel.
    pub color: [f32; 4],
    pub texture_slot: u32,
    _pad: [u32; 3],
}

impl SpriteInstance {
    #[must_use]
    pub fn new(rect: [f32; 4], uv_rect: [f32; 4], color: [f32; 4], texture_slot: u32) -> Self {
        Self { rect, uv_rect, color, texture_slot, _pad: [0; 3] }
    }
}

const _: () = assert!(std::mem::size_of::<SpriteInstance>() == 64);

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ScreenSizeGpu {
    size: [f32; 2],
    _pad: [f32; 2],
}

/// A growable CPU-staged quad list plus the GPU resources to draw it.
///
/// Call [`enqueue`](SpriteBatch::enqueue) (or [`push`](SpriteBatch::push))
/// any number of times per frame, then [`render`](SpriteBatch::render) once;
/// `render` uploads the full snapshot and clears the staging list, the same
/// clear-after-draw lifecycle [`crate::batch::InstanceBatch`] uses for its
/// per-frame channels.
pub struct SpriteBatch {
    instances: Vec<SpriteInstance>,
    instance_buffer: wgpu::Buffer,
    screen_size_buffer: wgpu::Buffer,
    pipeline: wgpu::RenderPipeline,
    bgl: wgpu::BindGroupLayout,
}

impl SpriteBatch {
    #[must_use]
    pub fn new(device: &GraphicsDevice, present_format: wgpu::TextureFormat) -> Self {
        let bgl = device.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only: true }, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture { sample_type: wgpu::TextureSampleType::Float { filterable: true }, view_dimension: wgpu::TextureViewDimension::D2, multisampled: false },
                    count: std::num::NonZeroU32::new(device.bindless_heap.capacity()),
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sprite-pipeline-layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });
        let module = shaders::create_module(&device.device, "sprite.wgsl");
        let pipeline = device.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState { module: &module, entry_point: Some("vs_main"), buffers: &[], compilation_options: wgpu::PipelineCompilationOptions::default() },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: present_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let instance_buffer = device.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite-instances"),
            size: std::mem::size_of::<SpriteInstance>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let screen_size_buffer = device.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite-screen-size"),
            size: std::mem::size_of::<ScreenSizeGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self { instances: Vec::new(), instance_buffer, screen_size_buffer, pipeline, bgl }
    }

    /// Appends one quad to the current frame's staging list.
    pub fn push(&mut self, instance: SpriteInstance) {
        self.instances.push(instance);
    }

    /// Convenience wrapper over [`push`](Self::push) taking raw fields.
    pub fn enqueue(&mut self, rect: [f32; 4], uv_rect: [f32; 4], color: [f32; 4], texture_slot: u32) {
        self.push(SpriteInstance::new(rect, uv_rect, color, texture_slot));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Uploads the staged quads and draws them into `target`, blended over
    /// whatever is already there. Clears the staging list for the next frame.
    pub fn render(&mut self, device: &GraphicsDevice, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView, screen_width: f32, screen_height: f32) {
        if self.instances.is_empty() {
            return;
        }

        let bytes: &[u8] = bytemuck::cast_slice(&self.instances);
        let needed_size = (bytes.len() as u64).next_power_of_two();
        if self.instance_buffer.size() < needed_size {
            self.instance_buffer = device.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("sprite-instances"),
                size: needed_size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        device.queue.write_buffer(&self.instance_buffer, 0, bytes);

        let screen_size = ScreenSizeGpu { size: [screen_width, screen_height], _pad: [0.0; 2] };
        device.queue.write_buffer(&self.screen_size_buffer, 0, bytemuck::bytes_of(&screen_size));

        let texture_views = device.texture_table.views();
        let bind_group = device.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sprite-bg"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.instance_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.screen_size_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureViewArray(&texture_views) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(&device.root_signature.samplers.point_clamp) },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("sprite-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..4, 0..self.instances.len() as u32);
        drop(pass);

        self.instances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_instance_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<SpriteInstance>(), 64);
        assert_eq!(std::mem::size_of::<ScreenSizeGpu>(), 16);
    }
}
