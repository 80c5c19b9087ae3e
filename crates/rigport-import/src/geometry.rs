//! Geometry extraction: resolves each semantic's index stream against its
//! source and unrolls triangle lists into flat per-corner buffers.

use std::collections::HashMap;

use rigport_core::{mat4_from_row_major, CoordinateConverter, RoundToDigits, Vec2, Vec3, QUANTIZE_DIGITS};
use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::document::Element;
use crate::error::{checked_index, ImportError};
use crate::input::{find_input, Input, Semantic};
use crate::mesh::{BoneWeight, MeshData};
use crate::skin::SkinController;

/// Conversion settings applied to every extracted mesh.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshConversion {
    pub converter: CoordinateConverter,
    /// Reverse triangle corner order in every mesh.
    pub flip_faces: bool,
}

/// A decoded `<source>` float array with its accessor stride.
struct AttributeSource {
    id: String,
    values: Vec<f32>,
    stride: usize,
}

impl AttributeSource {
    fn from_element(source: Element<'_, '_>, components: usize) -> Result<Self, ImportError> {
        let values = source.required_child("float_array")?.floats()?;
        let accessor = source
            .child("technique_common")
            .and_then(|t| t.child("accessor"));
        let stride = match accessor.and_then(|a| a.attr("stride")) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ImportError::InvalidNumber(raw.to_string()))?,
            None => components,
        };
        Ok(Self {
            id: source.attr("id").unwrap_or("").to_string(),
            values,
            stride: stride.max(components),
        })
    }

    fn len(&self) -> usize {
        self.values.len() / self.stride
    }

    fn element(&self, index: i64) -> Result<&[f32], ImportError> {
        let i = checked_index("source element", index, self.len())?;
        Ok(&self.values[i * self.stride..(i + 1) * self.stride])
    }

    fn vec3(&self, index: i64) -> Result<Vec3, ImportError> {
        let v = self.element(index)?;
        Ok(Vec3::new(v[0], v[1], v[2]))
    }

    fn vec2(&self, index: i64) -> Result<Vec2, ImportError> {
        let v = self.element(index)?;
        Ok(Vec2::new(v[0], v[1]))
    }
}

/// Where to read each required attribute inside one index tuple.
struct GroupLayout {
    vertex: Input,
    normal: Input,
    uv: Input,
    stride: usize,
}

impl GroupLayout {
    fn from_inputs(inputs: Vec<Input>, context: &str) -> Result<Self, ImportError> {
        let take = |semantic| {
            find_input(&inputs, semantic)
                .cloned()
                .ok_or_else(|| ImportError::MissingInput {
                    context: context.to_string(),
                    semantic,
                })
        };
        let vertex = take(Semantic::Vertex)?;
        let normal = take(Semantic::Normal)?;
        let uv = take(Semantic::TexCoord)?;
        // Stride follows the highest offset, not the input count: inputs
        // sharing an offset share one slot in the tuple.
        let stride = inputs.iter().map(|i| i.offset + 1).max().unwrap_or(1);
        Ok(Self {
            vertex,
            normal,
            uv,
            stride,
        })
    }
}

/// The three attribute sources one primitive group reads from.
struct GroupSources {
    positions: AttributeSource,
    normals: AttributeSource,
    uvs: AttributeSource,
}

impl GroupSources {
    fn resolve(
        mesh: Element<'_, '_>,
        sources: &HashMap<&str, Element<'_, '_>>,
        layout: &GroupLayout,
    ) -> Result<Self, ImportError> {
        let position_id = resolve_vertices(mesh, &layout.vertex.source)?;
        Ok(Self {
            positions: AttributeSource::from_element(lookup(sources, &position_id)?, 3)?,
            normals: AttributeSource::from_element(lookup(sources, &layout.normal.source)?, 3)?,
            uvs: AttributeSource::from_element(lookup(sources, &layout.uv.source)?, 2)?,
        })
    }
}

/// Bone data for a skinned geometry.
struct SkinBinding {
    weights: Vec<BoneWeight>,
    joint_names: Vec<String>,
}

/// Extract one [`MeshData`] per triangle list of `geometry`.
///
/// `scene_node` supplies the pivot used for coordinate conversion. If one of
/// `controllers` binds this geometry, every corner gets its vertex's bone
/// weights. A primitive group with a missing input or bad indices is
/// reported to `sink` and skipped; an unresolved source reference fails the
/// whole geometry.
pub fn extract_geometry(
    geometry: Element<'_, '_>,
    scene_node: Option<Element<'_, '_>>,
    controllers: &[SkinController<'_, '_>],
    conversion: &MeshConversion,
    sink: &mut dyn DiagnosticSink,
) -> Result<Vec<MeshData>, ImportError> {
    let id = geometry.attr("id").unwrap_or("");
    let name = geometry.attr("name").unwrap_or(id);
    let converter = &conversion.converter;

    let pivot = match scene_node.and_then(transform_matrix) {
        Some(values) => {
            let m = mat4_from_row_major(&values).ok_or(ImportError::MalformedMatrix(values.len()))?;
            converter.convert_point(m.w_axis.truncate())
        }
        None => Vec3::ZERO,
    };

    let mesh = geometry.required_child("mesh")?;
    let sources: HashMap<&str, Element<'_, '_>> = mesh
        .children("source")
        .filter_map(|s| s.attr("id").map(|id| (id, s)))
        .collect();

    let groups: Vec<_> = mesh.children("triangles").collect();
    if groups.is_empty() {
        sink.report(Diagnostic::new(
            name,
            "geometry contains no triangle list; make sure the mesh is triangulated",
        ));
        return Ok(Vec::new());
    }

    let skin = match controllers.iter().find(|c| c.mesh_id == id) {
        Some(controller) => {
            let joint_names = controller.joint_names()?;
            let weights = controller.bone_weights(joint_names.len())?;
            debug!("Geometry '{}' is skinned by '{}' ({} joints)", name, controller.name, joint_names.len());
            Some(SkinBinding {
                weights,
                joint_names,
            })
        }
        None => None,
    };

    let mut meshes = Vec::with_capacity(groups.len());
    for group in groups {
        let layout = match Input::all_from(group).and_then(|inputs| GroupLayout::from_inputs(inputs, name)) {
            Ok(layout) => layout,
            Err(e) => {
                sink.report(Diagnostic::new(name, e.to_string()));
                continue;
            }
        };

        // Unresolved references fail the geometry; anything else skips the group.
        let group_sources = match GroupSources::resolve(mesh, &sources, &layout) {
            Ok(group_sources) => group_sources,
            Err(e) if e.is_lookup_mismatch() => return Err(e),
            Err(e) => {
                sink.report(Diagnostic::new(name, e.to_string()));
                continue;
            }
        };

        let result = unroll_triangles(group, &layout, &group_sources, skin.as_ref(), pivot, conversion);
        match result {
            Ok(Some(mut mesh_data)) => {
                mesh_data.name = name.to_string();
                debug!(
                    "Extracted '{}': {} triangles from sources {}/{}/{}",
                    name,
                    mesh_data.triangle_count(),
                    group_sources.positions.id,
                    group_sources.normals.id,
                    group_sources.uvs.id
                );
                meshes.push(mesh_data);
            }
            Ok(None) => sink.report(Diagnostic::new(name, "primitive group has no triangle data")),
            Err(e) => sink.report(Diagnostic::new(name, e.to_string())),
        }
    }
    Ok(meshes)
}

/// Expand every triangle corner into its own position, normal and UV.
/// Returns `None` when the group carries no `<p>` index list.
fn unroll_triangles(
    group: Element<'_, '_>,
    layout: &GroupLayout,
    sources: &GroupSources,
    skin: Option<&SkinBinding>,
    pivot: Vec3,
    conversion: &MeshConversion,
) -> Result<Option<MeshData>, ImportError> {
    let Some(p) = group.child("p") else {
        return Ok(None);
    };
    let indices = p.ints()?;
    let count_attr = group.required_attr("count")?;
    let triangle_count: usize = count_attr
        .trim()
        .parse()
        .map_err(|_| ImportError::InvalidNumber(count_attr.to_string()))?;

    let overflow = || ImportError::InvalidNumber(count_attr.to_string());
    let corner_count = triangle_count.checked_mul(3).ok_or_else(overflow)?;
    let needed = corner_count.checked_mul(layout.stride).ok_or_else(overflow)?;
    if indices.len() < needed {
        return Err(ImportError::IndexOutOfRange {
            what: "triangle index list",
            index: i64::try_from(needed).unwrap_or(i64::MAX) - 1,
            len: indices.len(),
        });
    }

    let converter = &conversion.converter;
    let mut mesh = MeshData {
        positions: Vec::with_capacity(corner_count),
        normals: Vec::with_capacity(corner_count),
        uv0: Vec::with_capacity(corner_count),
        triangle_indices: (0..corner_count as u32).collect(),
        bone_weights: skin.map(|_| Vec::with_capacity(corner_count)),
        joint_names: skin.map(|s| s.joint_names.clone()).unwrap_or_default(),
        ..Default::default()
    };

    for corner in 0..corner_count {
        let tuple = &indices[corner * layout.stride..];
        let vertex_index = tuple[layout.vertex.offset];

        let position = sources.positions.vec3(vertex_index)?.round_to_digits(QUANTIZE_DIGITS);
        mesh.positions.push(converter.convert_point_about(position, pivot));

        let normal = sources.normals.vec3(tuple[layout.normal.offset])?.round_to_digits(QUANTIZE_DIGITS);
        mesh.normals.push(converter.convert_point(normal));

        mesh.uv0.push(sources.uvs.vec2(tuple[layout.uv.offset])?.round_to_digits(QUANTIZE_DIGITS));

        if let (Some(skin), Some(weights)) = (skin, mesh.bone_weights.as_mut()) {
            let i = checked_index("skinned vertex", vertex_index, skin.weights.len())?;
            weights.push(skin.weights[i]);
        }
    }

    if conversion.flip_faces {
        mesh.triangle_indices.reverse();
    }
    Ok(Some(mesh))
}

/// Values of the node's `<matrix sid="transform">`, if any.
fn transform_matrix(node: Element<'_, '_>) -> Option<Vec<f32>> {
    node.children("matrix")
        .find(|m| m.attr("sid") == Some("transform"))
        .and_then(|m| m.floats().ok())
}

/// Follow a VERTEX input through `<vertices>` to its POSITION source id.
fn resolve_vertices(mesh: Element<'_, '_>, vertices_id: &str) -> Result<String, ImportError> {
    let vertices = mesh
        .children("vertices")
        .find(|v| v.attr("id") == Some(vertices_id))
        .ok_or_else(|| ImportError::UnresolvedReference(vertices_id.to_string()))?;
    let inputs = Input::all_from(vertices)?;
    find_input(&inputs, Semantic::Position)
        .or_else(|| inputs.first())
        .map(|input| input.source.clone())
        .ok_or_else(|| ImportError::MissingInput {
            context: vertices.describe(),
            semantic: Semantic::Position,
        })
}

fn lookup<'a, 'input>(
    sources: &HashMap<&str, Element<'a, 'input>>,
    id: &str,
) -> Result<Element<'a, 'input>, ImportError> {
    sources
        .get(id)
        .copied()
        .ok_or_else(|| ImportError::UnresolvedReference(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use rigport_core::UpAxis;

    fn quad_geometry(extra_group: &str) -> String {
        format!(
            r##"<geometry id="Plane-mesh" name="Plane">
              <mesh>
                <source id="Plane-positions">
                  <float_array count="12">0 0 0 1 0 0 1 1 0 0 1 0</float_array>
                  <technique_common><accessor source="#a" count="4" stride="3"/></technique_common>
                </source>
                <source id="Plane-normals">
                  <float_array count="3">0 0 1</float_array>
                </source>
                <source id="Plane-map">
                  <float_array count="8">0 0 1 0 1 1 0 1</float_array>
                  <technique_common><accessor source="#m" count="4" stride="2"/></technique_common>
                </source>
                <vertices id="Plane-vertices">
                  <input semantic="POSITION" source="#Plane-positions"/>
                </vertices>
                <triangles count="2">
                  <input semantic="VERTEX" source="#Plane-vertices" offset="0"/>
                  <input semantic="NORMAL" source="#Plane-normals" offset="1"/>
                  <input semantic="TEXCOORD" source="#Plane-map" offset="2" set="0"/>
                  <p>0 0 0 1 0 1 2 0 2  0 0 0 2 0 2 3 0 3</p>
                </triangles>
                {extra_group}
              </mesh>
            </geometry>"##
        )
    }

    fn extract(xml: &str, conversion: MeshConversion, sink: &mut Vec<Diagnostic>) -> Result<Vec<MeshData>, ImportError> {
        let doc = Document::parse(xml).unwrap();
        extract_geometry(doc.root(), None, &[], &conversion, sink)
    }

    #[test]
    fn unrolls_quad_into_independent_corners() {
        let mut sink = Vec::new();
        let meshes = extract(&quad_geometry(""), MeshConversion::default(), &mut sink).unwrap();
        assert!(sink.is_empty());
        assert_eq!(meshes.len(), 1);

        let mesh = &meshes[0];
        assert_eq!(mesh.name, "Plane");
        assert_eq!(mesh.positions.len(), 6);
        assert_eq!(mesh.normals.len(), 6);
        assert_eq!(mesh.uv0.len(), 6);
        assert_eq!(mesh.triangle_indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.positions[2], Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(mesh.positions[5], Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(mesh.uv0[4], Vec2::new(1.0, 1.0));
        assert!(mesh.normals.iter().all(|n| *n == Vec3::Z));
        assert!(mesh.bone_weights.is_none());
        assert!(mesh.joint_names.is_empty());
    }

    #[test]
    fn flip_faces_reverses_corner_order() {
        let conversion = MeshConversion {
            flip_faces: true,
            ..Default::default()
        };
        let meshes = extract(&quad_geometry(""), conversion, &mut Vec::new()).unwrap();
        assert_eq!(meshes[0].triangle_indices, vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn z_up_converts_positions_and_normals() {
        let conversion = MeshConversion {
            converter: CoordinateConverter::new(UpAxis::ZUp),
            flip_faces: false,
        };
        let meshes = extract(&quad_geometry(""), conversion, &mut Vec::new()).unwrap();
        let mesh = &meshes[0];
        // (1, 1, 0) -> (1, 0, -1); the +Z normal becomes +Y.
        assert_eq!(mesh.positions[2], Vec3::new(1.0, 0.0, -1.0));
        assert!(mesh.normals.iter().all(|n| *n == Vec3::Y));
    }

    #[test]
    fn positions_are_quantized() {
        let xml = quad_geometry("").replace("1 1 0 0 1 0", "1.0000004 0.9999996 0 0 1 0");
        let meshes = extract(&xml, MeshConversion::default(), &mut Vec::new()).unwrap();
        assert_eq!(meshes[0].positions[2], Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn group_without_normals_is_skipped() {
        let extra = r##"<triangles count="1">
            <input semantic="VERTEX" source="#Plane-vertices" offset="0"/>
            <input semantic="TEXCOORD" source="#Plane-map" offset="1"/>
            <p>0 0 1 1 2 2</p>
          </triangles>"##;
        let mut sink = Vec::new();
        let meshes = extract(&quad_geometry(extra), MeshConversion::default(), &mut sink).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(sink.len(), 1);
        assert!(sink[0].message.contains("NORMAL"));
    }

    #[test]
    fn group_without_index_list_is_skipped() {
        let extra = r##"<triangles count="1">
            <input semantic="VERTEX" source="#Plane-vertices" offset="0"/>
            <input semantic="NORMAL" source="#Plane-normals" offset="1"/>
            <input semantic="TEXCOORD" source="#Plane-map" offset="2"/>
          </triangles>"##;
        let mut sink = Vec::new();
        let meshes = extract(&quad_geometry(extra), MeshConversion::default(), &mut sink).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(sink, vec![Diagnostic::new("Plane", "primitive group has no triangle data")]);
    }

    #[test]
    fn out_of_range_index_skips_group() {
        let xml = quad_geometry("").replace("3 0 3</p>", "9 0 3</p>");
        let mut sink = Vec::new();
        let meshes = extract(&xml, MeshConversion::default(), &mut sink).unwrap();
        assert!(meshes.is_empty());
        assert_eq!(sink.len(), 1);
        assert!(sink[0].message.contains("out of range"));
    }

    #[test]
    fn oversized_triangle_count_skips_group() {
        let xml = quad_geometry("").replace(
            r#"<triangles count="2">"#,
            r#"<triangles count="6148914691236517206">"#,
        );
        let mut sink = Vec::new();
        let meshes = extract(&xml, MeshConversion::default(), &mut sink).unwrap();
        assert!(meshes.is_empty());
        assert_eq!(sink.len(), 1);
        assert!(sink[0].message.contains("6148914691236517206"));
    }

    #[test]
    fn source_without_float_array_skips_group() {
        let xml = quad_geometry("").replace(r#"<float_array count="3">0 0 1</float_array>"#, "");
        let mut sink = Vec::new();
        let meshes = extract(&xml, MeshConversion::default(), &mut sink).unwrap();
        assert!(meshes.is_empty());
        assert_eq!(sink.len(), 1);
        assert!(sink[0].message.contains("float_array"));
    }

    #[test]
    fn each_triangle_list_becomes_its_own_mesh() {
        let extra = r##"<triangles count="1">
            <input semantic="VERTEX" source="#Plane-vertices" offset="0"/>
            <input semantic="NORMAL" source="#Plane-normals" offset="1"/>
            <input semantic="TEXCOORD" source="#Plane-map" offset="2"/>
            <p>1 0 1 2 0 2 3 0 3</p>
          </triangles>"##;
        let mut sink = Vec::new();
        let meshes = extract(&quad_geometry(extra), MeshConversion::default(), &mut sink).unwrap();
        assert!(sink.is_empty());
        assert_eq!(meshes.len(), 2);
        assert!(meshes.iter().all(|m| m.name == "Plane"));
        assert_eq!(meshes[0].triangle_indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(meshes[1].triangle_indices, vec![0, 1, 2]);
        assert_eq!(meshes[1].positions[0], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(meshes[1].uv0[2], Vec2::new(0.0, 1.0));
    }

    #[test]
    fn inputs_sharing_an_offset_share_a_slot() {
        let xml = r##"<geometry id="Tri-mesh" name="Tri">
            <mesh>
              <source id="Tri-positions"><float_array>0 0 0 1 0 0 0 1 0</float_array></source>
              <source id="Tri-normals"><float_array>0 0 1 0 0 1 0 0 1</float_array></source>
              <source id="Tri-map"><float_array>0 0 1 0 0 1</float_array></source>
              <vertices id="Tri-vertices"><input semantic="POSITION" source="#Tri-positions"/></vertices>
              <triangles count="1">
                <input semantic="VERTEX" source="#Tri-vertices" offset="0"/>
                <input semantic="NORMAL" source="#Tri-normals" offset="0"/>
                <input semantic="TEXCOORD" source="#Tri-map" offset="1"/>
                <p>0 0 1 1 2 2</p>
              </triangles>
            </mesh>
          </geometry>"##;
        let mut sink = Vec::new();
        let meshes = extract(xml, MeshConversion::default(), &mut sink).unwrap();
        assert!(sink.is_empty());
        let mesh = &meshes[0];
        assert_eq!(mesh.positions, vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
        assert_eq!(mesh.uv0, vec![Vec2::ZERO, Vec2::X, Vec2::Y]);
        assert!(mesh.normals.iter().all(|n| *n == Vec3::Z));
    }

    #[test]
    fn unresolved_source_fails_geometry() {
        let xml = quad_geometry("").replace("#Plane-normals\" offset", "#Missing-normals\" offset");
        let err = extract(&xml, MeshConversion::default(), &mut Vec::new()).unwrap_err();
        assert!(err.is_lookup_mismatch());
    }

    #[test]
    fn polylist_only_geometry_is_reported() {
        let xml = r##"<geometry id="Ngon-mesh" name="Ngon">
            <mesh>
              <source id="p"><float_array>0 0 0</float_array></source>
              <vertices id="v"><input semantic="POSITION" source="#p"/></vertices>
              <polylist count="1"><vcount>5</vcount></polylist>
            </mesh>
          </geometry>"##;
        let mut sink = Vec::new();
        let meshes = extract(xml, MeshConversion::default(), &mut sink).unwrap();
        assert!(meshes.is_empty());
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].subject, "Ngon");
    }

    #[test]
    fn pivot_from_scene_node_anchors_conversion() {
        let scene = r##"<node id="Plane" name="Plane" type="NODE">
            <matrix sid="transform">1 0 0 0 0 1 0 2 0 0 1 0 0 0 0 1</matrix>
          </node>"##;
        let scene_doc = Document::parse(scene).unwrap();
        let xml = quad_geometry("");
        let geo_doc = Document::parse(&xml).unwrap();
        let conversion = MeshConversion {
            converter: CoordinateConverter::new(UpAxis::ZUp),
            flip_faces: false,
        };
        let meshes = extract_geometry(
            geo_doc.root(),
            Some(scene_doc.root()),
            &[],
            &conversion,
            &mut Vec::new(),
        )
        .unwrap();
        // Pivot (0, 2, 0) converts to (0, 0, -2); corner (1, 1, 0) is
        // converted relative to it: (1, 1, 2) -> (1, 2, -1), plus pivot.
        assert_eq!(meshes[0].positions[2], Vec3::new(1.0, 2.0, -3.0));
    }
}
