//! Thin access layer over the parsed XML tree.
//!
//! Lookups are by local element name so the COLLADA namespace never has to
//! be spelled out. Array elements (`float_array`, `Name_array`, `p`, ...)
//! decode their whitespace-separated text into typed vectors.

use std::path::Path;

use tracing::debug;

use crate::error::ImportError;

/// Read a document from disk into memory. Parsing happens in [`Document::parse`],
/// which borrows the returned text.
pub fn load_file(path: &Path) -> Result<String, ImportError> {
    if !path.exists() {
        return Err(ImportError::NotFound(path.to_path_buf()));
    }
    let text =
        std::fs::read_to_string(path).map_err(|e| ImportError::Io(path.to_path_buf(), e))?;
    debug!("Read {} bytes from '{}'", text.len(), path.display());
    Ok(text)
}

/// A parsed interchange document. Lives only as long as one import call.
pub struct Document<'input> {
    tree: roxmltree::Document<'input>,
}

impl<'input> Document<'input> {
    pub fn parse(text: &'input str) -> Result<Self, ImportError> {
        let tree = roxmltree::Document::parse(text).map_err(|e| ImportError::Parse(e.to_string()))?;
        Ok(Self { tree })
    }

    pub fn root(&self) -> Element<'_, 'input> {
        Element(self.tree.root_element())
    }
}

/// An element of the document tree.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a, 'input>(roxmltree::Node<'a, 'input>);

impl<'a, 'input: 'a> Element<'a, 'input> {
    /// Local tag name, without namespace.
    pub fn name(&self) -> &'a str {
        self.0.tag_name().name()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.0.attribute(name)
    }

    pub fn required_attr(&self, name: &'static str) -> Result<&'a str, ImportError> {
        self.attr(name).ok_or_else(|| ImportError::MissingAttribute {
            element: self.describe(),
            attribute: name,
        })
    }

    /// First direct child element with the given local name.
    pub fn child(&self, name: &str) -> Option<Element<'a, 'input>> {
        self.children(name).next()
    }

    pub fn required_child(&self, name: &'static str) -> Result<Element<'a, 'input>, ImportError> {
        self.child(name).ok_or_else(|| ImportError::MissingElement {
            element: name,
            context: self.describe(),
        })
    }

    /// Direct child elements with the given local name, in document order.
    pub fn children<'n>(&self, name: &'n str) -> impl Iterator<Item = Element<'a, 'input>> + 'n
    where
        'a: 'n,
    {
        self.0
            .children()
            .filter(move |n| n.is_element() && n.tag_name().name() == name)
            .map(Element)
    }

    /// All direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = Element<'a, 'input>> {
        self.0.children().filter(|n| n.is_element()).map(Element)
    }

    /// Every element below this one (excluding itself) with the given name.
    pub fn descendants<'n>(&self, name: &'n str) -> impl Iterator<Item = Element<'a, 'input>> + 'n
    where
        'a: 'n,
    {
        let this = self.0;
        self.0
            .descendants()
            .filter(move |n| *n != this && n.is_element() && n.tag_name().name() == name)
            .map(Element)
    }

    pub fn text(&self) -> &'a str {
        self.0.text().unwrap_or("")
    }

    pub fn floats(&self) -> Result<Vec<f32>, ImportError> {
        parse_tokens(self.text())
    }

    pub fn ints(&self) -> Result<Vec<i64>, ImportError> {
        parse_tokens(self.text())
    }

    pub fn names(&self) -> Vec<String> {
        self.text().split_whitespace().map(str::to_string).collect()
    }

    /// Short label for error messages: tag name plus id or name if present.
    pub fn describe(&self) -> String {
        match self.attr("id").or_else(|| self.attr("name")) {
            Some(id) => format!("{} '{}'", self.name(), id),
            None => self.name().to_string(),
        }
    }
}

fn parse_tokens<T: std::str::FromStr>(text: &str) -> Result<Vec<T>, ImportError> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse()
                .map_err(|_| ImportError::InvalidNumber(token.to_string()))
        })
        .collect()
}

/// Strip the leading `#` from a URI fragment reference.
pub fn strip_reference(reference: &str) -> &str {
    reference.strip_prefix('#').unwrap_or(reference)
}
