//! PSO cache (§3 "PSO cache", §4.7). Grounded on the teacher's
//! `PipelineCache`: a cheap L1 lookup keyed by `(handle, version)` for the
//! hot path, backed by an L2 lookup keyed by the full render-state hash so
//! distinct effects that happen to produce identical pipeline descriptors
//! share one `wgpu::RenderPipeline`/`wgpu::ComputePipeline`.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::effect::{Effect, RenderStateDesc};

/// Fast key for the L1 cache: valid only within one effect's lifetime,
/// invalidated by bumping `version` on effect reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FastPipelineKey {
    pub effect_ptr: usize,
    pub effect_version: u32,
    pub pass_name_hash: u64,
}

/// Canonical key for the L2 cache: content-addressed by the effect's
/// (loaded) hash plus the pass name and any render-state overrides, so two
/// differently-named effects sharing a pass body collapse to one PSO.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub effect_content_hash: u64,
    pub pass_name: String,
    pub render_state: RenderStateHashable,
    pub color_target_format: Option<u32>,
}

/// `RenderStateDesc` is not `Hash`/`Eq` (it holds no floats, but keeping the
/// cache key's derivation in one place avoids re-deriving those on the
/// user-facing type). Mirrors every field the PSO actually depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderStateHashable {
    pub render_targets: u32,
    pub depth_write: bool,
    pub depth_test: bool,
    pub blend: u8,
    pub cull_mode: u8,
    pub depth_func: u8,
}

impl From<RenderStateDesc> for RenderStateHashable {
    fn from(s: RenderStateDesc) -> Self {
        use super::effect::{BlendMode, CullMode, DepthFunc};
        Self {
            render_targets: s.render_targets,
            depth_write: s.depth_write,
            depth_test: s.depth_test,
            blend: match s.blend {
                BlendMode::Opaque => 0,
                BlendMode::Additive => 1,
                BlendMode::AlphaBlend => 2,
            },
            cull_mode: match s.cull_mode {
                CullMode::None => 0,
                CullMode::Front => 1,
                CullMode::Back => 2,
            },
            depth_func: match s.depth_func {
                DepthFunc::Less => 0,
                DepthFunc::LessEqual => 1,
                DepthFunc::Greater => 2,
                DepthFunc::GreaterEqual => 3,
            },
        }
    }
}

/// Two-level PSO cache. Once created, PSOs are never mutated; disposed only
/// on engine shutdown or effect reload (§3).
pub struct PipelineCache {
    fast: FxHashMap<FastPipelineKey, Arc<wgpu::RenderPipeline>>,
    canonical: FxHashMap<PipelineKey, Arc<wgpu::RenderPipeline>>,
    compute_fast: FxHashMap<FastPipelineKey, Arc<wgpu::ComputePipeline>>,
    compute_canonical: FxHashMap<PipelineKey, Arc<wgpu::ComputePipeline>>,
}

impl PipelineCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fast: FxHashMap::default(),
            canonical: FxHashMap::default(),
            compute_fast: FxHashMap::default(),
            compute_canonical: FxHashMap::default(),
        }
    }

    /// Resolves (or compiles and caches) the graphics PSO for `effect`'s
    /// named pass with `render_state` overrides. `build` constructs the
    /// pipeline on an L2 miss; it is expected to use the engine's global
    /// root signature (`PipelineLayout`) for every PSO (§4.1).
    pub fn get_or_create_graphics(
        &mut self,
        effect: &Effect,
        pass_name: &str,
        render_state: RenderStateDesc,
        effect_version: u32,
        color_target_format: Option<u32>,
        build: impl FnOnce() -> wgpu::RenderPipeline,
    ) -> Arc<wgpu::RenderPipeline> {
        let fast_key = FastPipelineKey {
            effect_ptr: std::ptr::from_ref(effect) as usize,
            effect_version,
            pass_name_hash: hash_str(pass_name),
        };
        if let Some(pso) = self.fast.get(&fast_key) {
            return pso.clone();
        }

        let canonical_key = PipelineKey {
            effect_content_hash: effect.content_hash,
            pass_name: pass_name.to_string(),
            render_state: render_state.into(),
            color_target_format,
        };
        let pso = self
            .canonical
            .entry(canonical_key)
            .or_insert_with(|| Arc::new(build()))
            .clone();
        self.fast.insert(fast_key, pso.clone());
        pso
    }

    /// Same two-level strategy for compute pipelines (the GPUCuller's five
    /// passes and the Hi-Z/SDSM passes all resolve through here).
    pub fn get_or_create_compute(
        &mut self,
        cache_name: &str,
        effect_content_hash: u64,
        build: impl FnOnce() -> wgpu::ComputePipeline,
    ) -> Arc<wgpu::ComputePipeline> {
        let fast_key = FastPipelineKey {
            effect_ptr: 0,
            effect_version: 0,
            pass_name_hash: hash_str(cache_name) ^ effect_content_hash,
        };
        if let Some(pso) = self.compute_fast.get(&fast_key) {
            return pso.clone();
        }
        let canonical_key = PipelineKey {
            effect_content_hash,
            pass_name: cache_name.to_string(),
            render_state: RenderStateHashable {
                render_targets: 0,
                depth_write: false,
                depth_test: false,
                blend: 0,
                cull_mode: 0,
                depth_func: 0,
            },
            color_target_format: None,
        };
        let pso = self
            .compute_canonical
            .entry(canonical_key)
            .or_insert_with(|| Arc::new(build()))
            .clone();
        self.compute_fast.insert(fast_key, pso.clone());
        pso
    }

    /// Drops every cached pipeline (engine shutdown or effect reload).
    pub fn clear(&mut self) {
        self.fast.clear();
        self.canonical.clear();
        self.compute_fast.clear();
        self.compute_canonical.clear();
    }

    #[must_use]
    pub fn canonical_pso_count(&self) -> usize {
        self.canonical.len() + self.compute_canonical.len()
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_str(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}
