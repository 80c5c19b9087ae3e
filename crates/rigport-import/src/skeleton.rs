//! Bone hierarchy reconstruction from armature nodes in the scene graph.

use rigport_core::{mat4_from_row_major, CoordinateConverter, Mat4, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::Element;
use crate::error::ImportError;
use crate::skin::SkinController;

/// Authored tip offsets shorter than this are treated as absent.
pub const TIP_EPSILON: f32 = 0.05;

/// Profile of the `<technique>` carrying bone roll and tip metadata.
const BLENDER_PROFILE: &str = "blender";

/// One bone in bind pose. Owns its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    /// Position of the sanitized name in the skin's joint list, or -1.
    pub bone_index: i32,
    pub local_to_root: Mat4,
    /// End point of the bone in root space.
    pub tip: Vec3,
    pub roll: f32,
    pub children: Vec<Bone>,
}

impl Bone {
    /// Head of the bone in root space.
    pub fn position(&self) -> Vec3 {
        self.local_to_root.w_axis.truncate()
    }

    /// This bone and all its descendants, depth-first pre-order.
    pub fn iter(&self) -> BoneIter<'_> {
        BoneIter { stack: vec![self] }
    }
}

pub struct BoneIter<'a> {
    stack: Vec<&'a Bone>,
}

impl<'a> Iterator for BoneIter<'a> {
    type Item = &'a Bone;

    fn next(&mut self) -> Option<Self::Item> {
        let bone = self.stack.pop()?;
        self.stack.extend(bone.children.iter().rev());
        Some(bone)
    }
}

/// A skeleton in bind pose.
///
/// Only the first root joint of an armature is kept; sibling roots are
/// dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonData {
    pub name: String,
    pub root_bone: Bone,
    /// The skin's joint names, in bone-weight index order.
    pub bone_names: Vec<String>,
}

impl SkeletonData {
    pub fn bone_count(&self) -> usize {
        self.root_bone.iter().count()
    }

    pub fn find_bone(&self, name: &str) -> Option<&Bone> {
        self.root_bone.iter().find(|b| b.name == name)
    }
}

/// Replace every run of non-alphanumeric characters with a single `_`, the
/// way joint names are written into skin joint lists.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

pub fn is_joint(node: Element<'_, '_>) -> bool {
    node.attr("type") == Some("JOINT")
}

/// Whether `node` or anything below it is a joint.
pub fn contains_joint(node: Element<'_, '_>) -> bool {
    is_joint(node) || node.children("node").any(contains_joint)
}

fn node_name<'a>(node: Element<'a, '_>) -> &'a str {
    node.attr("name").or_else(|| node.attr("id")).unwrap_or("")
}

/// The top-level scene node named `name` that holds joints.
pub fn find_armature<'a, 'input>(
    visual_scene: Element<'a, 'input>,
    name: &str,
) -> Option<Element<'a, 'input>> {
    visual_scene
        .children("node")
        .filter(|n| contains_joint(*n))
        .find(|n| node_name(*n) == name)
}

/// Build the skeleton `controller` deforms with, rooted at `armature`.
pub fn build_skeleton(
    controller: &SkinController<'_, '_>,
    armature: Element<'_, '_>,
    converter: &CoordinateConverter,
) -> Result<SkeletonData, ImportError> {
    let joints = controller.joint_names()?;
    let root_matrix = converter.root_matrix();

    let mut roots = armature
        .children("node")
        .filter(|n| is_joint(*n))
        .map(|n| bone_from_node(n, &joints, &root_matrix, converter))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();

    let root_bone = roots
        .next()
        .ok_or_else(|| ImportError::NoRootBone(controller.name.to_string()))?;
    let dropped = roots.len();
    if dropped > 0 {
        debug!(
            "Skeleton '{}': keeping root '{}', dropping {} sibling roots",
            controller.name, root_bone.name, dropped
        );
    }

    Ok(SkeletonData {
        name: controller.name.to_string(),
        root_bone,
        bone_names: joints,
    })
}

fn bone_from_node(
    node: Element<'_, '_>,
    joints: &[String],
    parent: &Mat4,
    converter: &CoordinateConverter,
) -> Result<Bone, ImportError> {
    let name = node_name(node).to_string();
    let sanitized = sanitize_name(&name);
    let bone_index = joints
        .iter()
        .position(|j| *j == sanitized)
        .map_or(-1, |i| i as i32);

    let values = node.required_child("matrix")?.floats()?;
    let local = mat4_from_row_major(&values).ok_or(ImportError::MalformedMatrix(values.len()))?;
    let local_to_root = *parent * local;

    let (roll, raw_tip) = blender_extras(node)?;
    let authored_tip = raw_tip.length() > TIP_EPSILON;
    let mut tip = Vec3::ZERO;
    if authored_tip {
        tip = local_to_root.w_axis.truncate() + converter.convert_point(raw_tip);
    }

    let children = node
        .children("node")
        .filter(|n| is_joint(*n))
        .map(|child| bone_from_node(child, joints, &local_to_root, converter))
        .collect::<Result<Vec<_>, _>>()?;

    if !authored_tip {
        if let Some(first) = children.first() {
            tip = first.position();
        }
    }

    Ok(Bone {
        name,
        bone_index,
        local_to_root,
        tip,
        roll,
        children,
    })
}

/// Roll and raw tip offset from the Blender extra block. Missing values are 0.
fn blender_extras(node: Element<'_, '_>) -> Result<(f32, Vec3), ImportError> {
    let technique = node
        .children("extra")
        .flat_map(|extra| extra.children("technique"))
        .find(|t| t.attr("profile") == Some(BLENDER_PROFILE));

    let mut roll = 0.0;
    let mut tip = Vec3::ZERO;
    let Some(technique) = technique else {
        return Ok((roll, tip));
    };

    for element in technique.elements() {
        let slot = match element.attr("sid") {
            Some("roll") => &mut roll,
            Some("tip_x") => &mut tip.x,
            Some("tip_y") => &mut tip.y,
            Some("tip_z") => &mut tip.z,
            _ => continue,
        };
        let raw = element.text().trim();
        *slot = raw
            .parse()
            .map_err(|_| ImportError::InvalidNumber(raw.to_string()))?;
    }
    Ok((roll, tip))
}
