//! Serialization of a [`Document`] back to the text format
//!
//! Output re-parses to a value-equal document. Formatting is normalized:
//! minimal string escaping, no trailing commas, `Name( a, b )` constructor
//! spacing, multiline dictionaries.

use std::fmt::{self, Write};

use crate::section::{Document, Section};

/// Serialize a document to scene-file text.
pub fn serialize(doc: &Document) -> String {
    doc.to_string()
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections().iter().enumerate() {
            if i > 0 {
                f.write_char('\n')?;
            }
            write_section(f, section)?;
        }
        Ok(())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_section(f, self)
    }
}

fn write_section(f: &mut impl Write, section: &Section) -> fmt::Result {
    f.write_char('[')?;
    f.write_str(section.tag())?;
    for (key, value) in &section.header.attributes {
        write!(f, " {}={}", key, value)?;
    }
    f.write_str("]\n")?;
    for (key, value) in &section.properties {
        write_property_key(f, key)?;
        write!(f, " = {}\n", value)?;
    }
    Ok(())
}

/// Property keys are written bare when the grammar allows it, quoted
/// otherwise (e.g. `"with spaces"`).
fn write_property_key(f: &mut impl Write, key: &str) -> fmt::Result {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '/');
    if bare {
        f.write_str(key)
    } else {
        f.write_char('"')?;
        for c in key.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                c => f.write_char(c)?,
            }
        }
        f.write_char('"')
    }
}
