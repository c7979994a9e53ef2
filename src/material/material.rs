//! Material and parameter blocks (§4.7, §9 "Dynamic-dispatch parameter blocks").

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use rustc_hash::FxHashMap;

use super::effect::Effect;

/// Tagged variant for heterogeneous per-instance/per-material parameter
/// values, keyed by parameter-name hash (§9).
#[derive(Debug, Clone)]
pub enum Param {
    F32(f32),
    Vec4(Vec4),
    Mat4(Mat4),
    Vec4Array(Vec<Vec4>),
    Mat4Array(Vec<Mat4>),
    Texture(u32),
}

impl Param {
    /// `elementStride x elementsPerInstance` byte-copy function used when a
    /// batch stages this parameter into a per-instance channel (§4.8).
    #[must_use]
    pub fn element_stride(&self) -> usize {
        match self {
            Param::F32(_) => 4,
            Param::Vec4(_) | Param::Texture(_) => 16,
            Param::Mat4(_) => 64,
            Param::Vec4Array(_) => 16,
            Param::Mat4Array(_) => 64,
        }
    }

    #[must_use]
    pub fn elements_per_instance(&self) -> usize {
        match self {
            Param::F32(_) | Param::Vec4(_) | Param::Mat4(_) | Param::Texture(_) => 1,
            Param::Vec4Array(v) => v.len(),
            Param::Mat4Array(v) => v.len(),
        }
    }

    /// Appends this parameter's bytes to `out`, in the same layout a batch
    /// channel expects.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Param::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Param::Texture(slot) => out.extend_from_slice(&slot.to_le_bytes()),
            Param::Vec4(v) => out.extend_from_slice(bytemuck::bytes_of(v)),
            Param::Mat4(m) => out.extend_from_slice(bytemuck::bytes_of(m)),
            Param::Vec4Array(vs) => {
                for v in vs {
                    out.extend_from_slice(bytemuck::bytes_of(v));
                }
            }
            Param::Mat4Array(ms) => {
                for m in ms {
                    out.extend_from_slice(bytemuck::bytes_of(m));
                }
            }
        }
    }
}

/// `name_hash -> Param` map (§9).
#[derive(Debug, Clone, Default)]
pub struct MaterialBlock {
    params: FxHashMap<u64, Param>,
    names: FxHashMap<u64, String>,
}

fn hash_name(name: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

impl MaterialBlock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parameter(&mut self, name: &str, value: Param) {
        let hash = hash_name(name);
        self.params.insert(hash, value);
        self.names.insert(hash, name.to_string());
    }

    #[must_use]
    pub fn get_parameter(&self, name: &str) -> Option<&Param> {
        self.params.get(&hash_name(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.params
            .iter()
            .map(|(hash, param)| (self.names[hash].as_str(), param))
    }
}

/// Per-material GPU row: bindless texture indices only (§4.7). Bound through
/// the root signature's materials-buffer SRV (root constants slot 14).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialData {
    pub albedo: u32,
    pub normal: u32,
    pub roughness: u32,
    pub metallic: u32,
    pub emissive: u32,
    pub ao: u32,
    _pad: [u32; 2],
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            albedo: crate::bindless::NULL_SLOT,
            normal: crate::bindless::NULL_SLOT,
            roughness: crate::bindless::NULL_SLOT,
            metallic: crate::bindless::NULL_SLOT,
            emissive: crate::bindless::NULL_SLOT,
            ao: crate::bindless::NULL_SLOT,
            _pad: [0; 2],
        }
    }
}

/// `{effect, parameter block, pass-set}` (§3). Owns an [`Effect`] reference
/// and a stable `materialId` indexing the materials table.
pub struct Material {
    pub material_id: u32,
    pub effect: Arc<Effect>,
    pub block: MaterialBlock,
    active_pass: String,
    dirty: bool,
}

impl Material {
    #[must_use]
    pub fn new(material_id: u32, effect: Arc<Effect>, default_pass: &str) -> Self {
        Self {
            material_id,
            effect,
            block: MaterialBlock::new(),
            active_pass: default_pass.to_string(),
            dirty: true,
        }
    }

    pub fn set_pass(&mut self, pass: &str) {
        self.active_pass = pass.to_string();
    }

    #[must_use]
    pub fn active_pass(&self) -> &str {
        &self.active_pass
    }

    pub fn set_parameter(&mut self, name: &str, value: Param) {
        self.block.set_parameter(name, value);
        self.dirty = true;
    }

    /// Derives the materials-table row from whichever texture parameters
    /// are bound, defaulting any unset slot to [`crate::bindless::NULL_SLOT`].
    #[must_use]
    pub fn to_material_data(&self) -> MaterialData {
        let texture_slot = |name: &str| -> u32 {
            match self.block.get_parameter(name) {
                Some(Param::Texture(slot)) => *slot,
                _ => crate::bindless::NULL_SLOT,
            }
        };
        MaterialData {
            albedo: texture_slot("Albedo"),
            normal: texture_slot("Normal"),
            roughness: texture_slot("Roughness"),
            metallic: texture_slot("Metallic"),
            emissive: texture_slot("Emissive"),
            ao: texture_slot("AO"),
            _pad: [0; 2],
        }
    }

    #[must_use]
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}
