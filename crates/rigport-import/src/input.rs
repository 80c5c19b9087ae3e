use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{strip_reference, Element};
use crate::error::ImportError;

/// Semantic tag on an `<input>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Semantic {
    Vertex,
    Position,
    Normal,
    TexCoord,
    Joint,
    Weight,
    InvBindMatrix,
    /// Any semantic the importer does not consume (COLOR, TANGENT, ...).
    Other,
}

impl Semantic {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "VERTEX" => Semantic::Vertex,
            "POSITION" => Semantic::Position,
            "NORMAL" => Semantic::Normal,
            "TEXCOORD" => Semantic::TexCoord,
            "JOINT" => Semantic::Joint,
            "WEIGHT" => Semantic::Weight,
            "INV_BIND_MATRIX" => Semantic::InvBindMatrix,
            _ => Semantic::Other,
        }
    }
}

impl fmt::Display for Semantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Semantic::Vertex => "VERTEX",
            Semantic::Position => "POSITION",
            Semantic::Normal => "NORMAL",
            Semantic::TexCoord => "TEXCOORD",
            Semantic::Joint => "JOINT",
            Semantic::Weight => "WEIGHT",
            Semantic::InvBindMatrix => "INV_BIND_MATRIX",
            Semantic::Other => "OTHER",
        };
        f.write_str(tag)
    }
}

/// One `<input>`: which source feeds which semantic, and where its index
/// sits inside an interleaved index tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub semantic: Semantic,
    /// Source id with the leading `#` removed.
    pub source: String,
    pub offset: usize,
    pub set: Option<u32>,
}

impl Input {
    pub fn from_element(element: Element<'_, '_>) -> Result<Self, ImportError> {
        let semantic = Semantic::parse(element.required_attr("semantic")?);
        let source = strip_reference(element.required_attr("source")?).to_string();
        let offset = parse_attr(element, "offset")?.unwrap_or(0);
        let set = parse_attr(element, "set")?;
        Ok(Self {
            semantic,
            source,
            offset,
            set,
        })
    }

    /// All `<input>` children of `parent`, in document order.
    pub fn all_from(parent: Element<'_, '_>) -> Result<Vec<Self>, ImportError> {
        parent.children("input").map(Input::from_element).collect()
    }
}

/// First input with `semantic`; for TEXCOORD-like repeats the lowest `set` wins.
pub fn find_input(inputs: &[Input], semantic: Semantic) -> Option<&Input> {
    inputs
        .iter()
        .filter(|input| input.semantic == semantic)
        .min_by_key(|input| input.set.unwrap_or(0))
}

fn parse_attr<T: std::str::FromStr>(
    element: Element<'_, '_>,
    name: &str,
) -> Result<Option<T>, ImportError> {
    element
        .attr(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ImportError::InvalidNumber(raw.to_string()))
        })
        .transpose()
}
