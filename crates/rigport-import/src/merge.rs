//! Concatenation of mesh fragments into a single mesh.

use std::collections::HashMap;

use crate::error::{checked_index, ImportError};
use crate::mesh::{BoneWeight, MeshData};

/// Append `b` to `a`.
///
/// Attribute buffers are concatenated, `b`'s triangle indices are rebased
/// past `a`'s vertices, and `b`'s bone indices are remapped into a joint list
/// that starts with `a`'s names followed by `b`'s unseen ones. Either both
/// meshes carry bone weights or neither does.
pub fn merge_meshes(a: &MeshData, b: &MeshData) -> Result<MeshData, ImportError> {
    let base = a.positions.len() as u32;
    let mut triangle_indices = a.triangle_indices.clone();
    triangle_indices.extend(b.triangle_indices.iter().map(|i| i + base));

    let (bone_weights, joint_names) = match (&a.bone_weights, &b.bone_weights) {
        (None, None) => (None, Vec::new()),
        (Some(a_weights), Some(b_weights)) => {
            let (weights, names) = merge_skins(a, a_weights, b, b_weights)?;
            (Some(weights), names)
        }
        _ => return Err(ImportError::PartialSkinMerge(a.name.clone(), b.name.clone())),
    };

    Ok(MeshData {
        name: a.name.clone(),
        positions: [a.positions.as_slice(), b.positions.as_slice()].concat(),
        normals: [a.normals.as_slice(), b.normals.as_slice()].concat(),
        uv0: [a.uv0.as_slice(), b.uv0.as_slice()].concat(),
        triangle_indices,
        bone_weights,
        joint_names,
    })
}

fn merge_skins(
    a: &MeshData,
    a_weights: &[BoneWeight],
    b: &MeshData,
    b_weights: &[BoneWeight],
) -> Result<(Vec<BoneWeight>, Vec<String>), ImportError> {
    let mut names = a.joint_names.clone();
    let mut lookup: HashMap<&str, u32> = HashMap::new();
    for (i, name) in a.joint_names.iter().enumerate() {
        lookup.entry(name.as_str()).or_insert(i as u32);
    }
    for name in &b.joint_names {
        if !lookup.contains_key(name.as_str()) {
            lookup.insert(name.as_str(), names.len() as u32);
            names.push(name.clone());
        }
    }

    let mut weights = a_weights.to_vec();
    weights.reserve(b_weights.len());
    for bw in b_weights {
        let mut remapped = *bw;
        for slot in remapped.indices.iter_mut() {
            let old = checked_index("joint", i64::from(*slot), b.joint_names.len())?;
            *slot = lookup[b.joint_names[old].as_str()];
        }
        weights.push(remapped);
    }
    Ok((weights, names))
}

/// Fold `meshes` left to right with [`merge_meshes`].
pub fn merge_all(meshes: &[MeshData]) -> Result<Option<MeshData>, ImportError> {
    let Some((first, rest)) = meshes.split_first() else {
        return Ok(None);
    };
    rest.iter()
        .try_fold(first.clone(), |acc, next| merge_meshes(&acc, next))
        .map(Some)
}

impl MeshData {
    /// See [`merge_meshes`].
    pub fn merge(&self, other: &MeshData) -> Result<MeshData, ImportError> {
        merge_meshes(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigport_core::{Vec2, Vec3};

    fn triangle(name: &str, x: f32) -> MeshData {
        MeshData {
            name: name.to_string(),
            positions: vec![Vec3::new(x, 0.0, 0.0), Vec3::new(x, 1.0, 0.0), Vec3::new(x, 0.0, 1.0)],
            normals: vec![Vec3::X; 3],
            uv0: vec![Vec2::ZERO, Vec2::Y, Vec2::X],
            triangle_indices: vec![0, 1, 2],
            bone_weights: None,
            joint_names: Vec::new(),
        }
    }

    fn skinned(name: &str, joints: &[&str], weights: Vec<BoneWeight>) -> MeshData {
        MeshData {
            bone_weights: Some(weights),
            joint_names: joints.iter().map(|s| s.to_string()).collect(),
            ..triangle(name, 0.0)
        }
    }

    #[test]
    fn concatenates_and_rebases() {
        let merged = merge_meshes(&triangle("a", 0.0), &triangle("b", 5.0)).unwrap();
        assert_eq!(merged.name, "a");
        assert_eq!(merged.positions.len(), 6);
        assert_eq!(merged.normals.len(), 6);
        assert_eq!(merged.uv0.len(), 6);
        assert_eq!(merged.triangle_indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(merged.positions[3], Vec3::new(5.0, 0.0, 0.0));
        assert!(merged.bone_weights.is_none());
        assert!(merged.joint_names.is_empty());
    }

    #[test]
    fn rebases_flipped_indices() {
        let mut b = triangle("b", 1.0);
        b.triangle_indices.reverse();
        let merged = merge_meshes(&triangle("a", 0.0), &b).unwrap();
        assert_eq!(merged.triangle_indices, vec![0, 1, 2, 5, 4, 3]);
    }

    #[test]
    fn joint_names_keep_first_seen_order() {
        let a = skinned("a", &["Hip", "Spine"], vec![BoneWeight::from_influences(&[(1, 1.0)]); 3]);
        let b = skinned(
            "b",
            &["Arm", "Hip", "Hand"],
            vec![BoneWeight::from_influences(&[(0, 0.5), (1, 0.3), (2, 0.2)]); 3],
        );
        let merged = merge_meshes(&a, &b).unwrap();
        assert_eq!(merged.joint_names, vec!["Hip", "Spine", "Arm", "Hand"]);

        let weights = merged.bone_weights.unwrap();
        assert_eq!(weights.len(), 6);
        // a's weights are untouched.
        assert_eq!(weights[0].indices, [1, 0, 0, 0]);
        // b: Arm -> 2, Hip -> 0, Hand -> 3; empty slots pointed at b's joint 0 (Arm).
        assert_eq!(weights[3].indices, [2, 0, 3, 2]);
        assert_eq!(weights[3].weights, [0.5, 0.3, 0.2, 0.0]);
    }

    #[test]
    fn partial_skin_is_rejected() {
        let a = skinned("a", &["Hip"], vec![BoneWeight::default(); 3]);
        let b = triangle("b", 0.0);
        assert!(matches!(merge_meshes(&a, &b), Err(ImportError::PartialSkinMerge(_, _))));
        assert!(matches!(merge_meshes(&b, &a), Err(ImportError::PartialSkinMerge(_, _))));
    }

    #[test]
    fn bad_joint_index_in_b_is_an_error() {
        let a = skinned("a", &["Hip"], vec![BoneWeight::default(); 3]);
        let b = skinned("b", &["Hip"], vec![BoneWeight::from_influences(&[(4, 1.0)]); 3]);
        assert!(matches!(
            merge_meshes(&a, &b),
            Err(ImportError::IndexOutOfRange { what: "joint", index: 4, .. })
        ));
    }

    #[test]
    fn merge_all_folds_in_order() {
        let meshes = vec![triangle("a", 0.0), triangle("b", 1.0), triangle("c", 2.0)];
        let merged = merge_all(&meshes).unwrap().unwrap();
        assert_eq!(merged.vertex_count(), 9);
        assert_eq!(merged.triangle_indices, (0..9).collect::<Vec<u32>>());
        assert_eq!(merged.positions[8], Vec3::new(2.0, 0.0, 1.0));
        assert!(merge_all(&[]).unwrap().is_none());
    }

    #[test]
    fn method_matches_free_function() {
        let a = triangle("a", 0.0);
        let b = triangle("b", 3.0);
        assert_eq!(a.merge(&b).unwrap(), merge_meshes(&a, &b).unwrap());
    }
}
