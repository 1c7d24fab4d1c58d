//! Scene-tree view over the flat `node` sections
//!
//! The tree is a derived view: built from the document's node sections,
//! edited, and flattened back. Nodes live in an arena indexed by
//! [`NodeId`], which keeps parent/child links simple and ids stable across
//! edits.
//!
//! Inherited scenes: when the root section carries an `instance` reference,
//! the base document is obtained through the injected [`SceneResolver`]
//! (the core itself never touches the filesystem), built recursively, and
//! the local sections are overlaid on it. Inherited nodes keep a folded
//! snapshot of their base state so property lookups fall through and
//! unchanged nodes can be omitted on flatten.

use indexmap::IndexMap;

use crate::error::{Error, ResolutionError, StructuralError};
use crate::section::{Document, Section};
use crate::value::Value;

/// Injected capability for loading the base document of an inherited
/// scene. Implemented for closures, so tests can use in-memory fixtures.
pub trait SceneResolver {
    fn resolve(&self, path: &str) -> Result<Document, ResolutionError>;
}

impl<F> SceneResolver for F
where
    F: Fn(&str) -> Result<Document, ResolutionError>,
{
    fn resolve(&self, path: &str) -> Result<Document, ResolutionError> {
        self(path)
    }
}

/// Resolver for documents that do not use scene inheritance: any attempt
/// to load a base scene fails.
pub fn no_resolver(path: &str) -> Result<Document, ResolutionError> {
    Err(ResolutionError::BaseScene {
        path: path.to_string(),
        reason: "no scene resolver provided".to_string(),
    })
}

/// Stable handle to a node in a [`SceneTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a node is: an engine type, or an instance of another scene
/// (referenced by ext-resource id).
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Type(String),
    Instance(i64),
}

/// Folded base-scene state of an inherited node.
#[derive(Debug, Clone, PartialEq)]
struct BaseNode {
    kind: Option<NodeKind>,
    properties: IndexMap<String, Value>,
    groups: Vec<String>,
}

/// One node of the tree view.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    kind: Option<NodeKind>,
    properties: IndexMap<String, Value>,
    groups: Vec<String>,
    /// Raw `index` attribute from the section (kept verbatim because the
    /// format writes it both as `index=2` and `index="2"`)
    index: Option<Value>,
    base: Option<Box<BaseNode>>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    /// A new node of an engine type.
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self::bare(name.into(), Some(NodeKind::Type(node_type.into())))
    }

    /// A new node instancing another scene by ext-resource id.
    pub fn instance(name: impl Into<String>, ext_resource_id: i64) -> Self {
        Self::bare(name.into(), Some(NodeKind::Instance(ext_resource_id)))
    }

    fn bare(name: String, kind: Option<NodeKind>) -> Self {
        Self {
            name,
            kind,
            properties: IndexMap::new(),
            groups: Vec::new(),
            index: None,
            base: None,
            children: Vec::new(),
            parent: None,
        }
    }

    fn from_section(section: &Section, name: String) -> Self {
        let kind = if let Some(t) = section.node_type() {
            Some(NodeKind::Type(t.to_string()))
        } else {
            section.instance().map(NodeKind::Instance)
        };
        let mut node = Self::bare(name, kind);
        node.properties = section.properties.clone();
        node.groups = section.groups();
        node.index = section.header.get("index").cloned();
        node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine type, falling back to the inherited base.
    pub fn node_type(&self) -> Option<&str> {
        match self.kind_effective() {
            Some(NodeKind::Type(t)) => Some(t),
            _ => None,
        }
    }

    /// The instanced-scene ext-resource id, falling back to the base.
    pub fn instance_id(&self) -> Option<i64> {
        match self.kind_effective() {
            Some(NodeKind::Instance(id)) => Some(*id),
            _ => None,
        }
    }

    fn kind_effective(&self) -> Option<&NodeKind> {
        self.kind
            .as_ref()
            .or_else(|| self.base.as_ref().and_then(|b| b.kind.as_ref()))
    }

    /// Whether this node comes from an inherited base scene.
    pub fn is_inherited(&self) -> bool {
        self.base.is_some()
    }

    /// Whether this node carries local content that must be serialized.
    pub fn has_changes(&self) -> bool {
        !self.properties.is_empty() || !self.groups.is_empty()
    }

    /// Look up a property, falling back to the inherited base.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties
            .get(key)
            .or_else(|| self.base.as_ref().and_then(|b| b.properties.get(key)))
    }

    /// Set a property. Setting an inherited node's property to the value it
    /// inherits removes the local override, so the node can drop out of the
    /// serialized file again.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(base) = &self.base {
            if base.properties.get(&key) == Some(&value) {
                self.properties.shift_remove(&key);
                return;
            }
        }
        self.properties.insert(key, value);
    }

    /// Remove a local property (inherited values cannot be removed).
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    /// Local property overrides, in insertion order.
    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    /// Effective group membership: inherited groups unioned with local ones.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .base
            .as_ref()
            .map(|b| b.groups.clone())
            .unwrap_or_default();
        for g in &self.groups {
            if !groups.contains(g) {
                groups.push(g.clone());
            }
        }
        groups
    }

    pub fn add_to_group(&mut self, group: impl Into<String>) {
        let group = group.into();
        if !self.groups().contains(&group) {
            self.groups.push(group);
        }
    }

    pub fn remove_from_group(&mut self, group: &str) {
        self.groups.retain(|g| g != group);
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), StructuralError> {
        self.guard("rename")?;
        self.name = name.into();
        Ok(())
    }

    /// Set the engine type; clears any instance reference.
    pub fn set_type(&mut self, node_type: impl Into<String>) -> Result<(), StructuralError> {
        self.guard("retype")?;
        self.kind = Some(NodeKind::Type(node_type.into()));
        Ok(())
    }

    /// Set the instanced-scene reference; clears any engine type.
    pub fn set_instance(&mut self, ext_resource_id: i64) -> Result<(), StructuralError> {
        self.guard("re-instance")?;
        self.kind = Some(NodeKind::Instance(ext_resource_id));
        Ok(())
    }

    fn guard(&self, action: &'static str) -> Result<(), StructuralError> {
        if self.is_inherited() {
            return Err(StructuralError::InheritedNode {
                name: self.name.clone(),
                action,
            });
        }
        Ok(())
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Fold the node's current effective state into a base snapshot; called
    /// on every node of a base scene when it is instanced. Folding keeps
    /// inheritance chains flat: the base of a base collapses into one
    /// snapshot, which makes re-merging the same overrides idempotent.
    fn mark_inherited(&mut self) {
        let prior = self.base.take().map(|b| *b);
        let mut properties = prior
            .as_ref()
            .map(|b| b.properties.clone())
            .unwrap_or_default();
        for (key, value) in self.properties.drain(..) {
            properties.insert(key, value);
        }
        let kind = self
            .kind
            .take()
            .or_else(|| prior.as_ref().and_then(|b| b.kind.clone()));
        let mut groups = prior.map(|b| b.groups).unwrap_or_default();
        for group in std::mem::take(&mut self.groups) {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        self.base = Some(Box::new(BaseNode {
            kind,
            properties,
            groups,
        }));
        self.index = None;
    }
}

/// The mutable tree view of one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl SceneTree {
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Install a root node (for building a scene from scratch).
    pub fn set_root(&mut self, node: Node) -> NodeId {
        let id = self.alloc(node);
        self.root = Some(id);
        id
    }

    /// Append a child node; returns its id.
    pub fn add_child(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        node.parent = Some(parent);
        let id = self.alloc(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Insert a child node at `position` among the parent's children.
    pub fn insert_child(&mut self, parent: NodeId, position: usize, mut node: Node) -> NodeId {
        node.parent = Some(parent);
        let id = self.alloc(node);
        self.nodes[parent.0].children.insert(position, id);
        id
    }

    /// Detach a child from its parent. Inherited nodes cannot be removed.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), StructuralError> {
        if self.node(child).is_inherited() {
            return Err(StructuralError::InheritedNode {
                name: self.node(child).name.clone(),
                action: "remove",
            });
        }
        self.nodes[parent.0].children.retain(|c| *c != child);
        self.nodes[child.0].parent = None;
        Ok(())
    }

    /// Look up a node by slash path relative to the root (`"."` or `""`
    /// mean the root itself). A single segment that matches no direct
    /// child falls back to a depth-first search by exact name.
    pub fn get_node(&self, path: &str) -> Option<NodeId> {
        let root = self.root?;
        if path.is_empty() || path == "." {
            return Some(root);
        }
        if let Some(id) = self.resolve_path(path) {
            return Some(id);
        }
        if !path.contains('/') {
            return self.find_by_name(root, path);
        }
        None
    }

    /// Strict slash-path resolution (no name fallback); used for `parent`
    /// attributes.
    fn resolve_path(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root?;
        if path.is_empty() || path == "." {
            return Some(current);
        }
        'segments: for segment in path.split('/') {
            for child in self.node(current).children() {
                if self.node(*child).name == segment {
                    current = *child;
                    continue 'segments;
                }
            }
            return None;
        }
        Some(current)
    }

    fn find_by_name(&self, from: NodeId, name: &str) -> Option<NodeId> {
        if self.node(from).name == name {
            return Some(from);
        }
        for child in self.node(from).children() {
            if let Some(found) = self.find_by_name(*child, name) {
                return Some(found);
            }
        }
        None
    }

    /// The node's path relative to the root: `"."` for the root itself,
    /// otherwise slash-joined ancestor names.
    pub fn path_of(&self, id: NodeId) -> String {
        if Some(id) == self.root {
            return ".".to_string();
        }
        let mut segments = vec![self.node(id).name.clone()];
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            if Some(parent) == self.root {
                break;
            }
            segments.push(self.node(parent).name.clone());
            current = parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Build the tree from a document's node sections, resolving scene
    /// inheritance through `resolver`.
    pub(crate) fn from_document(
        doc: &Document,
        resolver: &dyn SceneResolver,
    ) -> Result<SceneTree, Error> {
        let mut tree = SceneTree::default();
        for section in doc.get_sections("node") {
            let name = section
                .name()
                .ok_or(StructuralError::MissingName)?
                .to_string();
            match section.parent_path() {
                None => {
                    if tree.root.is_some() {
                        return Err(StructuralError::DuplicateRoot(name).into());
                    }
                    if let Some(ext_id) = section.instance() {
                        tree = Self::build_inherited(doc, section, name, ext_id, resolver)?;
                    } else {
                        tree.set_root(Node::from_section(section, name));
                    }
                }
                Some(parent_path) => {
                    let parent = tree.resolve_path(parent_path).ok_or_else(|| {
                        StructuralError::OrphanNode {
                            name: name.clone(),
                            parent: parent_path.to_string(),
                        }
                    })?;
                    let existing = tree
                        .node(parent)
                        .children()
                        .iter()
                        .copied()
                        .find(|c| tree.node(*c).name == name);
                    match existing {
                        // same-named child exists (inherited): overlay the
                        // local section onto it
                        Some(child) => tree.overlay(child, section),
                        None => {
                            tree.add_child(parent, Node::from_section(section, name));
                        }
                    }
                }
            }
        }
        tracing::debug!(nodes = tree.nodes.len(), "built scene tree");
        Ok(tree)
    }

    fn build_inherited(
        doc: &Document,
        root_section: &Section,
        name: String,
        ext_id: i64,
        resolver: &dyn SceneResolver,
    ) -> Result<SceneTree, Error> {
        let base_path = doc
            .get_sections("ext_resource")
            .find(|s| s.id() == Some(ext_id))
            .and_then(|s| s.header.get_str("path"))
            .ok_or(ResolutionError::UnknownExtResource(ext_id))?;
        let base_doc = resolver.resolve(base_path)?;
        let mut tree = SceneTree::from_document(&base_doc, resolver)?;
        let root = tree.root.ok_or(StructuralError::MissingRoot)?;
        for node in &mut tree.nodes {
            node.mark_inherited();
        }
        // the root keeps its local identity on top of the inherited base
        let root_node = tree.node_mut(root);
        root_node.name = name;
        root_node.kind = Some(NodeKind::Instance(ext_id));
        root_node.properties = root_section.properties.clone();
        root_node.groups = root_section.groups();
        root_node.index = root_section.header.get("index").cloned();
        Ok(tree)
    }

    /// Apply a local section to an inherited node.
    fn overlay(&mut self, id: NodeId, section: &Section) {
        let node = self.node_mut(id);
        node.properties = section.properties.clone();
        node.groups = section.groups();
        node.index = section.header.get("index").cloned();
        if let Some(t) = section.node_type() {
            node.kind = Some(NodeKind::Type(t.to_string()));
        } else if let Some(ext_id) = section.instance() {
            node.kind = Some(NodeKind::Instance(ext_id));
        }
    }

    /// Flatten the tree back into `node` sections, parent before child.
    /// Nodes inherited unmodified from the base scene are omitted; the
    /// engine re-derives them from the `instance` reference.
    pub(crate) fn flatten(&self) -> Vec<Section> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.flatten_node(root, None, None, &mut out);
        }
        out
    }

    fn flatten_node(
        &self,
        id: NodeId,
        parent_path: Option<&str>,
        assigned_index: Option<i64>,
        out: &mut Vec<Section>,
    ) {
        let node = self.node(id);
        let is_root = parent_path.is_none();
        if is_root || !node.is_inherited() || node.has_changes() {
            out.push(self.node_section(node, parent_path, assigned_index));
        }

        let child_path = match parent_path {
            None => ".".to_string(),
            Some(".") => node.name.clone(),
            Some(path) => format!("{}/{}", path, node.name),
        };
        // children of an instanced root (or of any node that itself got an
        // index) carry indexes so the engine can reattach them in order;
        // positions count omitted siblings too
        let use_index = assigned_index.is_some()
            || (is_root && matches!(node.kind, Some(NodeKind::Instance(_))));
        for (i, child) in node.children.iter().enumerate() {
            let child_index = use_index.then_some(i as i64);
            self.flatten_node(*child, Some(&child_path), child_index, out);
        }
    }

    fn node_section(
        &self,
        node: &Node,
        parent_path: Option<&str>,
        assigned_index: Option<i64>,
    ) -> Section {
        let node_type = match (&node.kind, node.is_inherited()) {
            (Some(NodeKind::Type(t)), _) => Some(t.as_str()),
            _ => None,
        };
        let mut section = Section::node(&node.name, node_type, parent_path);
        if let Some(i) = assigned_index {
            // keep the stored spelling (int vs quoted int) when it agrees
            let value = match &node.index {
                Some(stored) if stored.as_int_lenient() == Some(i) => stored.clone(),
                _ => Value::Int(i),
            };
            section.header.set("index", value);
        } else if let Some(stored) = &node.index {
            section.header.set("index", stored.clone());
        }
        if !node.groups.is_empty() {
            section.header.set(
                "groups",
                Value::Array(node.groups.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(NodeKind::Instance(id)) = &node.kind {
            section.header.set("instance", Value::ext_resource(*id));
        }
        section.properties = node.properties.clone();
        section
    }

    /// Replace the document's node sections with this tree's flattened
    /// form.
    pub(crate) fn commit_into(&self, doc: &mut Document) {
        let flattened = self.flatten();
        tracing::debug!(sections = flattened.len(), "committing tree into document");
        doc.retain_sections(|s| s.tag() != "node");
        for section in flattened {
            doc.add_section(section);
        }
    }
}

/// An open tree-editing session. Obtained from [`Document::edit_tree`];
/// [`TreeEdit::commit`] flattens the tree back into the document, dropping
/// the handle without committing discards every edit. Ownership guarantees
/// commit-or-discard happens exactly once.
pub struct TreeEdit<'a> {
    doc: &'a mut Document,
    tree: SceneTree,
}

impl<'a> TreeEdit<'a> {
    pub fn tree(&self) -> &SceneTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut SceneTree {
        &mut self.tree
    }

    /// Flatten the tree back into the document.
    pub fn commit(self) {
        let TreeEdit { doc, tree } = self;
        tree.commit_into(doc);
    }

    /// Drop every edit, leaving the document untouched.
    pub fn discard(self) {}
}

impl std::ops::Deref for TreeEdit<'_> {
    type Target = SceneTree;

    fn deref(&self) -> &SceneTree {
        &self.tree
    }
}

impl std::ops::DerefMut for TreeEdit<'_> {
    fn deref_mut(&mut self) -> &mut SceneTree {
        &mut self.tree
    }
}

impl Document {
    /// Open an explicit tree-editing session.
    pub fn edit_tree(&mut self, resolver: &dyn SceneResolver) -> Result<TreeEdit<'_>, Error> {
        let tree = SceneTree::from_document(self, resolver)?;
        Ok(TreeEdit { doc: self, tree })
    }

    /// Scoped tree edit: build the tree, run `f`, and commit the flattened
    /// result back — but only if `f` succeeds. On error the document is
    /// left exactly as it was.
    pub fn with_tree<R>(
        &mut self,
        resolver: &dyn SceneResolver,
        f: impl FnOnce(&mut SceneTree) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut edit = self.edit_tree(resolver)?;
        let result = f(&mut edit.tree)?;
        edit.commit();
        Ok(result)
    }
}
