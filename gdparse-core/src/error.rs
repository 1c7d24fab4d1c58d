//! Error types for parsing, resolution, and tree building
//!
//! Each failure class gets its own enum so callers can catch the condition
//! they care about; [`Error`] combines them for APIs that can hit several.

use thiserror::Error;

/// Errors produced while parsing text into a [`Document`](crate::Document)
/// or a [`Value`](crate::Value).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Malformed header, property, or value syntax.
    #[error("parse error at line {line}, column {column}: {message}")]
    Syntax {
        /// Byte offset into the source text
        offset: usize,
        /// 1-based line number
        line: usize,
        /// 1-based column number
        column: usize,
        message: String,
    },

    /// The input does not begin with a `[section]` header. The common cause
    /// is feeding in a compiled binary scene (`.scn`), which tooling should
    /// report distinctly from a syntax error.
    #[error("input does not look like a text scene file; it may be a compiled binary scene")]
    BinaryFormat,
}

impl ParseError {
    /// Byte offset of the error, when one is known.
    pub fn offset(&self) -> Option<usize> {
        match self {
            ParseError::Syntax { offset, .. } => Some(*offset),
            ParseError::BinaryFormat => None,
        }
    }
}

/// Errors produced while resolving resource references or base scenes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// An `ExtResource(id)` reference with no matching `ext_resource` section.
    #[error("no ext_resource with id {0}")]
    UnknownExtResource(i64),

    /// A `SubResource(id)` reference with no matching `sub_resource` section.
    #[error("no sub_resource with id {0}")]
    UnknownSubResource(i64),

    /// The value handed to `get_resource` is not a resource reference at all.
    #[error("value is not an ExtResource or SubResource reference")]
    NotAReference,

    /// The scene resolver could not supply the base document of an
    /// inherited scene.
    #[error("cannot resolve base scene \"{path}\": {reason}")]
    BaseScene { path: String, reason: String },
}

/// Errors produced while building or mutating the tree view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// A node section whose `parent` path does not resolve to a known node.
    #[error("cannot find parent node \"{parent}\" of node \"{name}\"")]
    OrphanNode { name: String, parent: String },

    /// More than one node section without a `parent` attribute.
    #[error("node \"{0}\" has no parent attribute but a root node already exists")]
    DuplicateRoot(String),

    /// A node section without the required `name` attribute.
    #[error("node section is missing the \"name\" attribute")]
    MissingName,

    /// The scene has no root node where one is required (e.g. building a
    /// tree for an inherited scene whose base document is rootless).
    #[error("scene has no root node")]
    MissingRoot,

    /// An attempt to rename, retype, re-instance, or remove a node that is
    /// inherited from a base scene.
    #[error("cannot {action} inherited node \"{name}\"")]
    InheritedNode {
        name: String,
        /// What was attempted: "rename", "retype", "re-instance", "remove"
        action: &'static str,
    },
}

/// Any error the format engine can surface.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Structural(#[from] StructuralError),
}
