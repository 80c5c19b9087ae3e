use std::path::Path;

use rigport_core::{CoordinateConverter, UpAxis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::document::{self, strip_reference, Document, Element};
use crate::error::ImportError;
use crate::geometry::{extract_geometry, MeshConversion};
use crate::mesh::MeshData;
use crate::skeleton::{build_skeleton, find_armature, SkeletonData};
use crate::skin::SkinController;

/// Options for one import call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Overrides the document's declared up axis when set.
    pub up_axis: Option<UpAxis>,
    /// Reverse the corner order of every triangle.
    pub flip_faces: bool,
    pub read_meshes: bool,
    pub read_skeletons: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            up_axis: None,
            flip_faces: false,
            read_meshes: true,
            read_skeletons: true,
        }
    }
}

/// Everything produced by one import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutput {
    pub source_name: String,
    /// Up axis the document was converted from.
    pub up_axis: UpAxis,
    pub meshes: Vec<MeshData>,
    pub skeletons: Vec<SkeletonData>,
}

/// Import a document from disk.
pub fn import_file(
    path: &Path,
    config: &ImportConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<ImportOutput, ImportError> {
    let text = document::load_file(path)?;
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    import_str(&text, &source_name, config, sink)
}

/// Import a document held in memory. `source_name` labels the output.
///
/// Only a document that fails to parse is an error. Geometries and skeletons
/// that fail are reported to `sink` and left out.
pub fn import_str(
    text: &str,
    source_name: &str,
    config: &ImportConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<ImportOutput, ImportError> {
    let doc = Document::parse(text)?;
    let root = doc.root();

    let up_axis = match config.up_axis {
        Some(axis) => axis,
        None => declared_up_axis(root, source_name, sink),
    };
    let converter = CoordinateConverter::new(up_axis);
    debug!("Importing '{}' with up axis {}", source_name, up_axis);

    let controllers = skin_controllers(root, sink);
    let visual_scene = root
        .child("library_visual_scenes")
        .and_then(|l| l.child("visual_scene"));

    let skeletons = if config.read_skeletons {
        read_skeletons(&controllers, visual_scene, &converter, sink)
    } else {
        Vec::new()
    };

    let meshes = if config.read_meshes {
        let conversion = MeshConversion {
            converter,
            flip_faces: config.flip_faces,
        };
        read_meshes(root, &controllers, visual_scene, &conversion, sink)
    } else {
        Vec::new()
    };

    info!(
        "Imported '{}': {} meshes, {} skeletons",
        source_name,
        meshes.len(),
        skeletons.len()
    );

    Ok(ImportOutput {
        source_name: source_name.to_string(),
        up_axis,
        meshes,
        skeletons,
    })
}

fn declared_up_axis(root: Element<'_, '_>, source_name: &str, sink: &mut dyn DiagnosticSink) -> UpAxis {
    let Some(token) = root.child("asset").and_then(|a| a.child("up_axis")) else {
        return UpAxis::default();
    };
    match token.text().parse() {
        Ok(axis) => axis,
        Err(e) => {
            sink.report(Diagnostic::new(source_name, format!("{e}; assuming Y_UP")));
            UpAxis::default()
        }
    }
}

fn skin_controllers<'a, 'input>(
    root: Element<'a, 'input>,
    sink: &mut dyn DiagnosticSink,
) -> Vec<SkinController<'a, 'input>> {
    let Some(library) = root.child("library_controllers") else {
        return Vec::new();
    };
    library
        .children("controller")
        .filter_map(|c| match SkinController::from_element(c) {
            Ok(skin) => skin,
            Err(e) => {
                sink.report(Diagnostic::new(c.describe(), e.to_string()));
                None
            }
        })
        .collect()
}

fn read_skeletons(
    controllers: &[SkinController<'_, '_>],
    visual_scene: Option<Element<'_, '_>>,
    converter: &CoordinateConverter,
    sink: &mut dyn DiagnosticSink,
) -> Vec<SkeletonData> {
    let mut skeletons = Vec::new();
    for controller in controllers {
        let result = visual_scene
            .and_then(|scene| find_armature(scene, controller.name))
            .ok_or_else(|| ImportError::ArmatureNotFound(controller.name.to_string()))
            .and_then(|armature| build_skeleton(controller, armature, converter));
        match result {
            Ok(skeleton) => {
                debug!("Skeleton '{}': {} bones", skeleton.name, skeleton.bone_count());
                skeletons.push(skeleton);
            }
            Err(e) => sink.report(Diagnostic::new(controller.name, e.to_string())),
        }
    }
    skeletons
}

fn read_meshes(
    root: Element<'_, '_>,
    controllers: &[SkinController<'_, '_>],
    visual_scene: Option<Element<'_, '_>>,
    conversion: &MeshConversion,
    sink: &mut dyn DiagnosticSink,
) -> Vec<MeshData> {
    let Some(library) = root.child("library_geometries") else {
        return Vec::new();
    };
    let mut meshes = Vec::new();
    for geometry in library.children("geometry") {
        let node = visual_scene.and_then(|scene| scene_node_for(scene, geometry));
        match extract_geometry(geometry, node, controllers, conversion, sink) {
            Ok(extracted) => meshes.extend(extracted),
            Err(e) => sink.report(Diagnostic::new(geometry.describe(), e.to_string())),
        }
    }
    meshes
}

/// The scene node whose id is the geometry's name, or failing that the
/// first node instancing the geometry.
fn scene_node_for<'a, 'input>(
    scene: Element<'a, 'input>,
    geometry: Element<'_, '_>,
) -> Option<Element<'a, 'input>> {
    let id = geometry.attr("id").unwrap_or("");
    let name = geometry.attr("name").unwrap_or(id);
    scene
        .children("node")
        .find(|n| n.attr("id") == Some(name))
        .or_else(|| {
            scene.descendants("node").find(|n| {
                n.children("instance_geometry")
                    .any(|i| i.attr("url").map(strip_reference) == Some(id))
            })
        })
}
