//! Sample Distribution Shadow Maps depth analysis (§4.10 "SDSM").
//!
//! Three compute passes over the previous frame's linear-depth G-buffer:
//! min/max reduction, a 256-bin histogram, and a single-thread percentile
//! extraction producing the next frame's adaptive cascade splits. Results
//! are read back one frame late, matching the Hi-Z pyramid's one-frame
//! latency (§1: "these interact ... the Hi-Z pyramid is one frame behind").

use bytemuck::{Pod, Zeroable};

use crate::shaders;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Range {
    min_depth: f32,
    max_depth: f32,
}

/// The sentinel returned when a frame's depth buffer has no non-sky texels
/// (§8 scenario f): all-zero splits, read by callers as "use the fixed
/// split array this frame" rather than four degenerate (0,0) cascades.
pub const EMPTY_DEPTH_SENTINEL: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

pub struct SdsmAnalyzer {
    minmax_pipeline: wgpu::ComputePipeline,
    histogram_pipeline: wgpu::ComputePipeline,
    percentile_pipeline: wgpu::ComputePipeline,
    minmax_bgl: wgpu::BindGroupLayout,
    histogram_bgl: wgpu::BindGroupLayout,
    percentile_bgl: wgpu::BindGroupLayout,

    min_max_bits: wgpu::Buffer,
    histogram: wgpu::Buffer,
    splits: wgpu::Buffer,
    range_uniform: wgpu::Buffer,
    near_plane_uniform: wgpu::Buffer,
    pub readback: wgpu::Buffer,
}

impl SdsmAnalyzer {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let minmax_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sdsm-minmax-bgl"),
            entries: &[texture_entry(0), storage_entry(1, false), storage_entry(2, false)],
        });
        let histogram_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sdsm-histogram-bgl"),
            entries: &[texture_entry(0), uniform_entry(1), storage_entry(2, false)],
        });
        let percentile_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sdsm-percentile-bgl"),
            entries: &[storage_entry(0, true), uniform_entry(1), uniform_entry(2), storage_entry(3, false)],
        });

        let make_pipeline = |name: &str, bgl: &wgpu::BindGroupLayout| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(name),
                bind_group_layouts: &[bgl],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(name),
                layout: Some(&layout),
                module: &shaders::create_module(device, name),
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };

        let storage = |label: &str, size: u64, usage_extra: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | usage_extra,
                mapped_at_creation: false,
            })
        };

        Self {
            minmax_pipeline: make_pipeline("sdsm_minmax.wgsl", &minmax_bgl),
            histogram_pipeline: make_pipeline("sdsm_histogram.wgsl", &histogram_bgl),
            percentile_pipeline: make_pipeline("sdsm_percentile.wgsl", &percentile_bgl),
            minmax_bgl,
            histogram_bgl,
            percentile_bgl,
            min_max_bits: storage("sdsm-minmax", 8, wgpu::BufferUsages::COPY_SRC),
            histogram: storage("sdsm-histogram", 256 * 4, wgpu::BufferUsages::empty()),
            splits: storage("sdsm-splits", 16, wgpu::BufferUsages::COPY_SRC),
            range_uniform: storage("sdsm-range", 8, wgpu::BufferUsages::empty()),
            near_plane_uniform: storage("sdsm-near-plane", 4, wgpu::BufferUsages::empty()),
            readback: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("sdsm-readback"),
                size: 16,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            }),
        }
    }

    /// Dispatches min/max reduction, histogram, and percentile extraction
    /// against `linear_depth`, then queues a copy of the splits into
    /// [`SdsmAnalyzer::readback`] for the caller to map one frame later.
    pub fn analyze(&self, device: &wgpu::Device, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder, linear_depth: &wgpu::TextureView, near_plane: f32) {
        queue.write_buffer(&self.min_max_bits, 0, &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
        queue.write_buffer(&self.near_plane_uniform, 0, bytemuck::bytes_of(&near_plane));

        let minmax_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sdsm-minmax-bg"),
            layout: &self.minmax_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(linear_depth) },
                wgpu::BindGroupEntry { binding: 1, resource: self.min_max_bits.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BufferBinding { buffer: &self.min_max_bits, offset: 4, size: None }.into() },
            ],
        });
        // NOTE: min_max_bits packs {min_bits, max_bits} contiguously; the
        // bind group above references the same buffer at two offsets since
        // the minmax shader takes two separate atomic<u32> bindings.
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sdsm-minmax-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.minmax_pipeline);
            pass.set_bind_group(0, &minmax_bg, &[]);
            // Dimensions are baked into the texture; a real call site sizes
            // this from the G-buffer's known resolution.
            pass.dispatch_workgroups(128, 128, 1);
        }

        queue.write_buffer(&self.histogram, 0, &vec![0u8; 256 * 4]);
        let histogram_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sdsm-histogram-bg"),
            layout: &self.histogram_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(linear_depth) },
                wgpu::BindGroupEntry { binding: 1, resource: self.range_uniform.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.histogram.as_entire_binding() },
            ],
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sdsm-histogram-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.histogram_pipeline);
            pass.set_bind_group(0, &histogram_bg, &[]);
            pass.dispatch_workgroups(128, 128, 1);
        }

        let percentile_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sdsm-percentile-bg"),
            layout: &self.percentile_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.histogram.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: self.range_uniform.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.near_plane_uniform.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: self.splits.as_entire_binding() },
            ],
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sdsm-percentile-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.percentile_pipeline);
            pass.set_bind_group(0, &percentile_bg, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }

        encoder.copy_buffer_to_buffer(&self.splits, 0, &self.readback, 0, 16);
    }

    /// Maps the readback buffer synchronously (the caller already knows
    /// the relevant fence completed). Returns [`EMPTY_DEPTH_SENTINEL`] when
    /// the depth buffer analyzed one frame ago had no non-sky texels.
    pub fn read_splits(&self, device: &wgpu::Device) -> [f32; 4] {
        let slice = self.readback.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        let _ = device.poll(wgpu::Maintain::Wait);
        let data = slice.get_mapped_range();
        let splits: [f32; 4] = bytemuck::cast_slice(&data).try_into().unwrap_or(EMPTY_DEPTH_SENTINEL);
        drop(data);
        self.readback.unmap();
        splits
    }
}
