//! Hi-Z occlusion pyramid (§3 "Hi-Z pyramid", §4.11 step 7).
//!
//! Single-channel mip chain over the linear-depth G-buffer, rebuilt each
//! frame by iterated 2x2-max compute passes. Sampled during **next**
//! frame's visibility pass using **this** frame's view-projection matrix,
//! which is why [`HiZPyramid`] stores `view_projection` alongside the
//! texture rather than the caller tracking it separately.

use crate::shaders;

pub struct HiZPyramid {
    pub texture: wgpu::Texture,
    mip_views: Vec<wgpu::TextureView>,
    sampled_view: wgpu::TextureView,
    pub mip_count: u32,
    pub width: u32,
    pub height: u32,
    /// The view-projection matrix in effect when this pyramid was built;
    /// consumed by next frame's visibility pass (§4.9 pass 1).
    pub view_projection: glam::Mat4,
    build_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl HiZPyramid {
    #[must_use]
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let mip_count = 32 - (width.max(height).max(1)).leading_zeros();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("hiz-pyramid"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let mip_views: Vec<wgpu::TextureView> = (0..mip_count)
            .map(|mip| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("hiz-mip-view"),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let sampled_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("hiz-sampled-view"),
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("hiz-build-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::R32Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("hiz-build-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let module = shaders::create_module(device, "hiz_build.wgsl");
        let build_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("hiz-build-pipeline"),
            layout: Some(&layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Self {
            texture,
            mip_views,
            sampled_view,
            mip_count,
            width,
            height,
            view_projection: glam::Mat4::IDENTITY,
            build_pipeline,
            bind_group_layout,
        }
    }

    /// Full view for sampling during the next frame's visibility pass.
    #[must_use]
    pub fn sampled_view(&self) -> &wgpu::TextureView {
        &self.sampled_view
    }

    /// Copies the linear-depth G-buffer into mip 0 (via an external
    /// blit/copy the caller performs before calling this), then builds
    /// every coarser mip by 2x2 max reduction, and stamps `view_projection`
    /// for next frame's cull pass to consume.
    pub fn build(&mut self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, view_projection: glam::Mat4) {
        for mip in 1..self.mip_count {
            let src = &self.mip_views[(mip - 1) as usize];
            let dst = &self.mip_views[mip as usize];
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("hiz-build-bg"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(src) },
                    wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(dst) },
                ],
            });
            let dst_width = (self.width >> mip).max(1);
            let dst_height = (self.height >> mip).max(1);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("hiz-build-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.build_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dst_width.div_ceil(8), dst_height.div_ceil(8), 1);
        }
        self.view_projection = view_projection;
    }
}
