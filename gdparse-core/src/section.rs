//! Sections and the flat document model
//!
//! A scene file is an ordered list of sections: a `[tag attr=value ...]`
//! header line plus `key = value` body lines. Attribute and property
//! insertion order is semantic (round-trip fidelity), so both maps are
//! [`IndexMap`]s.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::value::Value;

/// Canonical ordering of section tags within a file. `add_section` keeps
/// the document in this order; unknown tags sort last.
const SCENE_ORDER: &[&str] = &[
    "gd_scene",
    "gd_resource",
    "ext_resource",
    "sub_resource",
    "resource",
    "node",
    "connection",
    "editable",
];

fn tag_rank(tag: &str) -> usize {
    SCENE_ORDER
        .iter()
        .position(|t| *t == tag)
        .unwrap_or(SCENE_ORDER.len())
}

/// A section header: tag plus ordered attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionHeader {
    pub tag: String,
    pub attributes: IndexMap<String, Value>,
}

impl SectionHeader {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: IndexMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    /// Remove an attribute, preserving the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.shift_remove(key)
    }
}

/// One section: header plus ordered properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub header: SectionHeader,
    pub properties: IndexMap<String, Value>,
}

impl Section {
    pub fn new(header: SectionHeader) -> Self {
        Self {
            header,
            properties: IndexMap::new(),
        }
    }

    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self::new(SectionHeader::new(tag))
    }

    /// Build an `[ext_resource path=... type=... id=...]` section.
    pub fn ext_resource(path: &str, resource_type: &str, id: i64) -> Self {
        let mut header = SectionHeader::new("ext_resource");
        header.set("path", Value::String(path.to_string()));
        header.set("type", Value::String(resource_type.to_string()));
        header.set("id", Value::Int(id));
        Self::new(header)
    }

    /// Build a `[sub_resource type=... id=...]` section.
    pub fn sub_resource(resource_type: &str, id: i64) -> Self {
        let mut header = SectionHeader::new("sub_resource");
        header.set("type", Value::String(resource_type.to_string()));
        header.set("id", Value::Int(id));
        Self::new(header)
    }

    /// Build a `[node name=... type=...]` section.
    pub fn node(name: &str, node_type: Option<&str>, parent: Option<&str>) -> Self {
        let mut header = SectionHeader::new("node");
        header.set("name", Value::String(name.to_string()));
        if let Some(t) = node_type {
            header.set("type", Value::String(t.to_string()));
        }
        if let Some(p) = parent {
            header.set("parent", Value::String(p.to_string()));
        }
        Self::new(header)
    }

    pub fn tag(&self) -> &str {
        &self.header.tag
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    // Accessors for the structurally meaningful attributes. These are
    // meaningful on `node` and resource sections; on other tags they are
    // simply absent.

    /// The `name` attribute.
    pub fn name(&self) -> Option<&str> {
        self.header.get_str("name")
    }

    /// The `parent` path attribute.
    pub fn parent_path(&self) -> Option<&str> {
        self.header.get_str("parent")
    }

    /// The `type` attribute.
    pub fn node_type(&self) -> Option<&str> {
        self.header.get_str("type")
    }

    /// The ext-resource id referenced by the `instance` attribute.
    pub fn instance(&self) -> Option<i64> {
        self.header.get("instance").and_then(Value::as_ext_resource)
    }

    /// The `index` attribute; Godot emits it both as an integer and as a
    /// quoted integer, so the read is lenient.
    pub fn index(&self) -> Option<i64> {
        self.header.get("index").and_then(Value::as_int_lenient)
    }

    /// The `id` attribute of a resource section.
    pub fn id(&self) -> Option<i64> {
        self.header.get("id").and_then(Value::as_int)
    }

    /// Group names from the `groups` attribute.
    pub fn groups(&self) -> Vec<String> {
        match self.header.get("groups") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// An ordered sequence of sections; the unit passed between `parse` and
/// `serialize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    sections: Vec<Section>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh scene document with its `[gd_scene]` root.
    pub fn scene() -> Self {
        let mut doc = Document::new();
        let mut header = SectionHeader::new("gd_scene");
        header.set("load_steps", Value::Int(1));
        header.set("format", Value::Int(2));
        doc.sections.push(Section::new(header));
        doc
    }

    /// A fresh resource document with its `[gd_resource]` root.
    pub fn resource() -> Self {
        let mut doc = Document::new();
        let mut header = SectionHeader::new("gd_resource");
        header.set("load_steps", Value::Int(1));
        header.set("format", Value::Int(2));
        doc.sections.push(Section::new(header));
        doc
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn sections_mut(&mut self) -> &mut [Section] {
        &mut self.sections
    }

    /// Append a section verbatim, preserving file order. The parser uses
    /// this; edits should go through [`Document::add_section`].
    pub(crate) fn push_section(&mut self, section: Section) {
        self.sections.push(section);
    }

    pub(crate) fn retain_sections(&mut self, f: impl FnMut(&Section) -> bool) {
        self.sections.retain(f);
    }

    /// Insert a section at its canonical position (after the last section
    /// of the same or earlier tag class). Returns the insertion index.
    pub fn add_section(&mut self, section: Section) -> usize {
        let rank = tag_rank(section.tag());
        let is_resource = matches!(section.tag(), "ext_resource" | "sub_resource");
        let idx = self
            .sections
            .iter()
            .position(|s| tag_rank(s.tag()) > rank)
            .unwrap_or(self.sections.len());
        self.sections.insert(idx, section);
        if is_resource {
            self.refresh_load_steps();
        }
        idx
    }

    /// Remove the section at `index`.
    pub fn remove_section(&mut self, index: usize) -> Section {
        let section = self.sections.remove(index);
        if matches!(section.tag(), "ext_resource" | "sub_resource") {
            self.refresh_load_steps();
        }
        section
    }

    pub fn get_sections<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Section> {
        self.sections.iter().filter(move |s| s.tag() == tag)
    }

    pub fn find_section(&self, tag: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.tag() == tag)
    }

    pub fn find_section_mut(&mut self, tag: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.tag() == tag)
    }

    /// The root section (`gd_scene` or `gd_resource`), if present.
    pub fn root(&self) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| matches!(s.tag(), "gd_scene" | "gd_resource"))
    }

    fn root_mut(&mut self) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|s| matches!(s.tag(), "gd_scene" | "gd_resource"))
    }

    /// Add a `[node]` section; returns its index.
    pub fn add_node(&mut self, name: &str, node_type: Option<&str>, parent: Option<&str>) -> usize {
        self.add_section(Section::node(name, node_type, parent))
    }

    /// Add a `[node]` section instancing another scene by ext-resource id.
    pub fn add_instance_node(&mut self, name: &str, ext_resource_id: i64, parent: Option<&str>) -> usize {
        let mut section = Section::node(name, None, parent);
        section.header.set("instance", Value::ext_resource(ext_resource_id));
        self.add_section(section)
    }

    /// Keep the root's `load_steps` attribute in sync with the number of
    /// declared resources (`1 + ext + sub`). The attribute is added only
    /// once there is something to count.
    pub(crate) fn refresh_load_steps(&mut self) {
        let steps = 1
            + self.get_sections("ext_resource").count() as i64
            + self.get_sections("sub_resource").count() as i64;
        if let Some(root) = self.root_mut() {
            if root.header.get("load_steps").is_some() {
                root.header.set("load_steps", Value::Int(steps));
            } else if steps > 1 {
                root.header
                    .attributes
                    .shift_insert(0, "load_steps".to_string(), Value::Int(steps));
            }
        }
    }

    /// Reassign dense ids (1..n, in section order) per resource class and
    /// rewrite every `ExtResource`/`SubResource` reference to match,
    /// however deeply nested.
    pub fn renumber_resource_ids(&mut self) {
        for (tag, ctor) in [("ext_resource", "ExtResource"), ("sub_resource", "SubResource")] {
            let mut mapping: HashMap<i64, i64> = HashMap::new();
            let mut next = 1;
            for section in self.sections.iter_mut().filter(|s| s.tag() == tag) {
                if let Some(old) = section.id() {
                    mapping.insert(old, next);
                    section.header.set("id", Value::Int(next));
                    next += 1;
                }
            }
            if mapping.is_empty() {
                continue;
            }
            self.rewrite_references(ctor, &mapping);
        }
    }

    fn rewrite_references(&mut self, ctor: &str, mapping: &HashMap<i64, i64>) {
        for section in &mut self.sections {
            let values = section
                .header
                .attributes
                .values_mut()
                .chain(section.properties.values_mut());
            for value in values {
                value.visit_constructors_mut(&mut |c| {
                    if c.name != ctor {
                        return;
                    }
                    if let [Value::Int(id)] = c.args.as_slice() {
                        if let Some(new_id) = mapping.get(id) {
                            c.args[0] = Value::Int(*new_id);
                        }
                    }
                });
            }
        }
    }

    /// Drop `ext_resource`/`sub_resource` sections whose id is referenced
    /// nowhere else in the document.
    pub fn remove_unused_resources(&mut self) {
        let mut ext_used: HashSet<i64> = HashSet::new();
        let mut sub_used: HashSet<i64> = HashSet::new();
        for section in &self.sections {
            let values = section
                .header
                .attributes
                .values()
                .chain(section.properties.values());
            for value in values {
                value.visit_constructors(&mut |c| {
                    if let [Value::Int(id)] = c.args.as_slice() {
                        match c.name.as_str() {
                            "ExtResource" => {
                                ext_used.insert(*id);
                            }
                            "SubResource" => {
                                sub_used.insert(*id);
                            }
                            _ => {}
                        }
                    }
                });
            }
        }
        self.sections.retain(|s| match s.tag() {
            "ext_resource" => s.id().map(|id| ext_used.contains(&id)).unwrap_or(true),
            "sub_resource" => s.id().map(|id| sub_used.contains(&id)).unwrap_or(true),
            _ => true,
        });
        self.refresh_load_steps();
    }
}
