//! Mesh-part registry (§4.6).

mod registry;

pub use registry::{MeshPartEntry, MeshRegistry, MAX_MESH_PARTS};

use bytemuck::{Pod, Zeroable};

/// Per-draw push constants for the vertex-pulling gbuffer/shadow-depth
/// pipelines: the current mesh part's bindless buffer-table slots plus its
/// base index, pushed once per part immediately before that part's
/// `draw_indirect` call (§4.6, `crate::cull`'s module doc).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, Default)]
pub struct PartDrawConstants {
    pub pos_srv: u32,
    pub norm_srv: u32,
    pub uv_srv: u32,
    pub index_srv: u32,
    pub base_index: u32,
    pub _pad: [u32; 3],
}

/// Byte size of [`PartDrawConstants`]; also the push-constant range every
/// vertex-pulling render pipeline declares.
pub const DRAW_CONSTANTS_SIZE: u32 = std::mem::size_of::<PartDrawConstants>() as u32;

const _: () = assert!(std::mem::size_of::<PartDrawConstants>() == 32);

impl PartDrawConstants {
    #[must_use]
    pub fn for_part(part: &MeshPartEntry) -> Self {
        Self {
            pos_srv: part.pos_idx,
            norm_srv: part.norm_idx,
            uv_srv: part.uv_idx,
            index_srv: part.index_idx,
            base_index: part.base_index,
            _pad: [0; 3],
        }
    }
}
