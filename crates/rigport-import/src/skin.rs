//! Skin controllers: joint name tables and per-vertex bone weights.

use tracing::debug;

use crate::document::{strip_reference, Element};
use crate::error::{checked_index, ImportError};
use crate::input::{find_input, Input, Semantic};
use crate::mesh::{BoneWeight, MAX_INFLUENCES};

/// The `<vertex_weights>` block of a skin: a flat stream of index tuples plus
/// the number of tuples belonging to each vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexWeights {
    /// Influence count per pre-triangulation vertex (`<vcount>`).
    pub counts: Vec<i64>,
    /// Interleaved index tuples (`<v>`).
    pub indices: Vec<i64>,
    pub stride: usize,
    pub joint_offset: usize,
    pub weight_offset: usize,
    /// Id of the source holding the weight values.
    pub weight_source: String,
}

impl VertexWeights {
    pub fn from_element(element: Element<'_, '_>) -> Result<Self, ImportError> {
        let inputs = Input::all_from(element)?;
        let joint = find_input(&inputs, Semantic::Joint).ok_or_else(|| ImportError::MissingInput {
            context: element.describe(),
            semantic: Semantic::Joint,
        })?;
        let weight = find_input(&inputs, Semantic::Weight).ok_or_else(|| ImportError::MissingInput {
            context: element.describe(),
            semantic: Semantic::Weight,
        })?;
        let stride = inputs.iter().map(|i| i.offset + 1).max().unwrap_or(2);

        Ok(Self {
            counts: element.required_child("vcount")?.ints()?,
            indices: element.required_child("v")?.ints()?,
            stride,
            joint_offset: joint.offset,
            weight_offset: weight.offset,
            weight_source: weight.source.clone(),
        })
    }

    /// Decode one [`BoneWeight`] per vertex.
    ///
    /// Tuples are consumed in order, exactly `counts[i]` of them for vertex
    /// `i`. Only the first four influences survive; the rest are still
    /// bounds-checked and then dropped. A joint index outside `joint_count`
    /// or a weight index outside `weights` is an error.
    pub fn decode(&self, weights: &[f32], joint_count: usize) -> Result<Vec<BoneWeight>, ImportError> {
        let mut out = Vec::with_capacity(self.counts.len());
        let mut cursor = 0usize;
        let mut truncated = 0usize;

        for &count in &self.counts {
            let count = usize::try_from(count).map_err(|_| ImportError::IndexOutOfRange {
                what: "influence count",
                index: count,
                len: 0,
            })?;
            let mut influences = [(0u32, 0f32); MAX_INFLUENCES];

            for slot in 0..count {
                let base = cursor * self.stride;
                let joint = self.tuple_value(base + self.joint_offset)?;
                let weight = self.tuple_value(base + self.weight_offset)?;
                let joint = checked_index("joint", joint, joint_count)?;
                let weight = weights[checked_index("weight", weight, weights.len())?];
                if slot < MAX_INFLUENCES {
                    influences[slot] = (joint as u32, weight);
                }
                cursor += 1;
            }
            if count > MAX_INFLUENCES {
                truncated += 1;
            }
            out.push(BoneWeight::from_influences(&influences[..count.min(MAX_INFLUENCES)]));
        }

        if truncated > 0 {
            debug!("{} vertices had more than {} influences; extras dropped", truncated, MAX_INFLUENCES);
        }
        Ok(out)
    }

    fn tuple_value(&self, position: usize) -> Result<i64, ImportError> {
        self.indices
            .get(position)
            .copied()
            .ok_or(ImportError::IndexOutOfRange {
                what: "vertex weight tuple",
                index: position as i64,
                len: self.indices.len(),
            })
    }
}

/// A `<controller>` holding a `<skin>` that binds a mesh to joints.
#[derive(Debug, Clone, Copy)]
pub struct SkinController<'a, 'input> {
    pub id: &'a str,
    /// Controller name; matches the armature node it deforms with.
    pub name: &'a str,
    /// Id of the bound geometry, `#` stripped.
    pub mesh_id: &'a str,
    skin: Element<'a, 'input>,
}

impl<'a, 'input: 'a> SkinController<'a, 'input> {
    /// Returns `None` for controllers that are not skins (morph targets).
    pub fn from_element(controller: Element<'a, 'input>) -> Result<Option<Self>, ImportError> {
        let Some(skin) = controller.child("skin") else {
            return Ok(None);
        };
        let id = controller.attr("id").unwrap_or("");
        Ok(Some(Self {
            id,
            name: controller.attr("name").unwrap_or(id),
            mesh_id: strip_reference(skin.required_attr("source")?),
            skin,
        }))
    }

    /// Joint names referenced by bone-weight indices, in index order.
    pub fn joint_names(&self) -> Result<Vec<String>, ImportError> {
        let joints = self.skin.required_child("joints")?;
        let inputs = Input::all_from(joints)?;
        let input = find_input(&inputs, Semantic::Joint).ok_or_else(|| ImportError::MissingInput {
            context: self.skin.describe(),
            semantic: Semantic::Joint,
        })?;
        let source = self.source(&input.source)?;
        let names = source
            .child("Name_array")
            .or_else(|| source.child("IDREF_array"))
            .ok_or_else(|| ImportError::MissingElement {
                element: "Name_array",
                context: source.describe(),
            })?;
        Ok(names.names())
    }

    /// Per-vertex bone weights, indexed by the geometry's position index.
    pub fn bone_weights(&self, joint_count: usize) -> Result<Vec<BoneWeight>, ImportError> {
        let block = VertexWeights::from_element(self.skin.required_child("vertex_weights")?)?;
        let weights = self
            .source(&block.weight_source)?
            .required_child("float_array")?
            .floats()?;
        block.decode(&weights, joint_count)
    }

    fn source(&self, id: &str) -> Result<Element<'a, 'input>, ImportError> {
        self.skin
            .children("source")
            .find(|s| s.attr("id") == Some(id))
            .ok_or_else(|| ImportError::UnresolvedReference(id.to_string()))
    }
}
