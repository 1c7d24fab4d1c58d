//! GdParse Core Library
//!
//! This crate is the format engine for Godot's textual scene/resource
//! files (`.tscn` / `.tres`):
//! - Value literal grammar (primitives, arrays, dicts, constructor forms)
//! - Section/document model with round-trip fidelity
//! - Resource table (`ext_resource` / `sub_resource` ids and references)
//! - Scene-tree view with inherited-scene merging and scoped edits
//! - Serializer reproducing the surface syntax
//!
//! The core performs no filesystem I/O: text comes in through [`parse`],
//! text goes out through [`serialize`], and inherited base scenes are
//! supplied by an injected [`SceneResolver`].

pub mod error;
pub mod parser;
pub mod resources;
pub mod section;
pub mod tree;
pub mod value;
pub mod writer;

// Re-export the API surface
pub use error::{Error, ParseError, ResolutionError, StructuralError};
pub use parser::{parse, parse_value};
pub use resources::ResourceTable;
pub use section::{Document, Section, SectionHeader};
pub use tree::{no_resolver, Node, NodeId, NodeKind, SceneResolver, SceneTree, TreeEdit};
pub use value::{Constructor, Value};
pub use writer::serialize;
