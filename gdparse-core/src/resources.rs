//! Resource table: a live view over `ext_resource`/`sub_resource` sections
//!
//! The table is derived from the document's current section list on each
//! lookup, so there is no cached state to invalidate. Id allocation keeps a
//! high-water mark for the lifetime of the view, so ids handed out by one
//! editing session never repeat even if sections are removed in between.

use crate::error::ResolutionError;
use crate::section::{Document, Section};
use crate::value::Value;

/// Mutable resource-table view over a [`Document`].
pub struct ResourceTable<'a> {
    doc: &'a mut Document,
    next_ext: i64,
    next_sub: i64,
}

impl Document {
    /// Open the resource-table view.
    pub fn resources(&mut self) -> ResourceTable<'_> {
        let next_ext = next_id(self, "ext_resource");
        let next_sub = next_id(self, "sub_resource");
        ResourceTable {
            doc: self,
            next_ext,
            next_sub,
        }
    }
}

fn next_id(doc: &Document, tag: &str) -> i64 {
    doc.get_sections(tag)
        .filter_map(Section::id)
        .max()
        .unwrap_or(0)
        + 1
}

impl<'a> ResourceTable<'a> {
    /// Declare an external resource; returns the allocated id.
    pub fn add_ext_resource(&mut self, path: &str, resource_type: &str) -> i64 {
        let id = self.next_ext;
        self.next_ext += 1;
        self.doc
            .add_section(Section::ext_resource(path, resource_type, id));
        id
    }

    /// Declare an inline sub-resource; returns the allocated id.
    pub fn add_sub_resource(&mut self, resource_type: &str) -> i64 {
        let id = self.next_sub;
        self.next_sub += 1;
        self.doc.add_section(Section::sub_resource(resource_type, id));
        id
    }

    /// Find the id of the `ext_resource` declared for `path`, if any.
    pub fn find_ext_resource(&self, path: &str) -> Option<i64> {
        self.doc
            .get_sections("ext_resource")
            .find(|s| s.header.get_str("path") == Some(path))
            .and_then(Section::id)
    }

    /// Resolve an `ExtResource`/`SubResource` reference to its declaring
    /// section. A dangling id is an error, never a default.
    pub fn get_resource(&self, reference: &Value) -> Result<&Section, ResolutionError> {
        if let Some(id) = reference.as_ext_resource() {
            return self
                .doc
                .get_sections("ext_resource")
                .find(|s| s.id() == Some(id))
                .ok_or(ResolutionError::UnknownExtResource(id));
        }
        if let Some(id) = reference.as_sub_resource() {
            return self
                .doc
                .get_sections("sub_resource")
                .find(|s| s.id() == Some(id))
                .ok_or(ResolutionError::UnknownSubResource(id));
        }
        Err(ResolutionError::NotAReference)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_id_allocation_monotonic() {
        let mut doc = Document::scene();
        let mut table = doc.resources();
        assert_eq!(table.add_ext_resource("res://Res.tscn", "PackedScene"), 1);
        assert_eq!(table.add_ext_resource("res://Sprite.png", "Texture"), 2);
        assert_eq!(table.add_sub_resource("CircleShape2D"), 1);
        assert_eq!(table.add_sub_resource("Animation"), 2);
        assert_eq!(table.add_ext_resource("res://More.png", "Texture"), 3);
    }

    #[test]
    fn test_allocation_continues_from_existing_ids() {
        let mut doc = Document::scene();
        doc.add_section(Section::ext_resource("res://a.png", "Texture", 5));
        assert_eq!(doc.resources().add_ext_resource("res://b.png", "Texture"), 6);
    }

    #[test]
    fn test_find_ext_resource() {
        let mut doc = Document::scene();
        let mut table = doc.resources();
        let id = table.add_ext_resource("res://Other.tscn", "PackedScene");
        assert_eq!(table.find_ext_resource("res://Other.tscn"), Some(id));
        assert_eq!(table.find_ext_resource("res://Missing.tscn"), None);
    }

    #[test]
    fn test_get_resource() {
        let mut doc = Document::scene();
        let mut table = doc.resources();
        let ext = table.add_ext_resource("res://Other.tscn", "PackedScene");
        let sub = table.add_sub_resource("CircleShape2D");

        let section = table.get_resource(&Value::ext_resource(ext)).unwrap();
        assert_eq!(section.header.get_str("path"), Some("res://Other.tscn"));
        let section = table.get_resource(&Value::sub_resource(sub)).unwrap();
        assert_eq!(section.header.get_str("type"), Some("CircleShape2D"));
    }

    #[test]
    fn test_dangling_reference_is_an_error() {
        let mut doc = Document::scene();
        let table = doc.resources();
        assert_eq!(
            table.get_resource(&Value::ext_resource(3)),
            Err(ResolutionError::UnknownExtResource(3))
        );
        assert_eq!(
            table.get_resource(&Value::Int(3)),
            Err(ResolutionError::NotAReference)
        );
    }

    #[test]
    fn test_ids_not_reused_after_removal_within_session() {
        let mut doc = Document::scene();
        let mut table = doc.resources();
        table.add_ext_resource("res://a.png", "Texture");
        let second = table.add_ext_resource("res://b.png", "Texture");
        // drop the highest-numbered section behind the table's back
        let idx = table
            .doc
            .sections()
            .iter()
            .position(|s| s.id() == Some(second) && s.tag() == "ext_resource")
            .unwrap();
        table.doc.remove_section(idx);
        // the high-water mark still advances
        assert_eq!(table.add_ext_resource("res://c.png", "Texture"), 3);
    }
}
