//! Material / Effect / PSO cache (§4.7).

mod effect;
mod material;
mod pso_cache;
mod table;

pub use effect::{Effect, EffectPass, RenderStateDesc, ResourceBinding, Technique};
pub use material::{Material, MaterialBlock, MaterialData, Param};
pub use pso_cache::{FastPipelineKey, PipelineCache, PipelineKey};
pub use table::MaterialTable;
