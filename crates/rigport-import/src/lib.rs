//! Rigport Import - COLLADA mesh and skeleton extraction
//!
//! Turns a Blender-style COLLADA document into runtime-ready data:
//! unrolled per-corner mesh buffers with optional bone weights, and bone
//! hierarchies in bind pose. Fragments can be merged afterwards.

mod diagnostics;
mod document;
mod error;
mod geometry;
mod importer;
mod input;
mod merge;
mod mesh;
mod skeleton;
mod skin;

pub use diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
pub use document::{load_file, strip_reference, Document, Element};
pub use error::ImportError;
pub use geometry::{extract_geometry, MeshConversion};
pub use importer::{import_file, import_str, ImportConfig, ImportOutput};
pub use input::{find_input, Input, Semantic};
pub use merge::{merge_all, merge_meshes};
pub use mesh::{BoneWeight, MeshData, MAX_INFLUENCES};
pub use skeleton::{
    build_skeleton, contains_joint, find_armature, is_joint, sanitize_name, Bone, BoneIter,
    SkeletonData, TIP_EPSILON,
};
pub use skin::{SkinController, VertexWeights};
