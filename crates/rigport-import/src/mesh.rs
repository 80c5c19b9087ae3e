use rigport_core::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Number of bone influences stored per vertex.
pub const MAX_INFLUENCES: usize = 4;

/// Up to four `(bone index, weight)` influences on one vertex. Unused slots
/// are `(0, 0.0)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoneWeight {
    pub indices: [u32; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
}

impl BoneWeight {
    /// Build from an influence list. Anything past the fourth entry is dropped.
    pub fn from_influences(influences: &[(u32, f32)]) -> Self {
        let mut bw = BoneWeight::default();
        for (slot, &(index, weight)) in influences.iter().take(MAX_INFLUENCES).enumerate() {
            bw.indices[slot] = index;
            bw.weights[slot] = weight;
        }
        bw
    }
}

/// A triangle mesh fragment, unrolled so every triangle corner owns its
/// position, normal and UV.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uv0: Vec<Vec2>,
    /// Three entries per triangle.
    pub triangle_indices: Vec<u32>,
    /// One entry per corner when the mesh is skinned.
    pub bone_weights: Option<Vec<BoneWeight>>,
    /// Joint names that `bone_weights` indices refer to. Empty when unskinned.
    pub joint_names: Vec<String>,
}

impl MeshData {
    /// An empty, unskinned mesh.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_indices.len() / 3
    }

    pub fn is_skinned(&self) -> bool {
        self.bone_weights.is_some()
    }
}
