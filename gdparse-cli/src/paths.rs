//! Project-root discovery and `res://` path mapping
//!
//! Godot scene files reference each other with `res://` paths rooted at
//! the directory containing `project.godot`. The core never touches the
//! filesystem, so this module supplies the [`SceneResolver`] used for
//! inherited scenes.

use std::fs;
use std::path::{Path, PathBuf};

use gdparse_core::{parse, Document, ResolutionError, SceneResolver};

/// Walk up from `start` looking for the directory containing
/// `project.godot`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let start = if start.is_dir() { start } else { start.parent()? };
    for dir in start.ancestors() {
        if dir.join("project.godot").is_file() {
            return Some(dir.to_path_buf());
        }
    }
    None
}

/// Map a `res://` resource path to a filesystem path under `root`.
pub fn resource_path_to_file(root: &Path, resource_path: &str) -> Option<PathBuf> {
    let relative = resource_path.strip_prefix("res://")?;
    Some(root.join(relative))
}

/// Resolver that loads base scenes relative to a Godot project root.
pub struct ProjectResolver {
    pub root: PathBuf,
}

impl ProjectResolver {
    /// Build a resolver for the project containing `scene_path`, when one
    /// can be found.
    pub fn for_scene(scene_path: &Path) -> Option<Self> {
        find_project_root(scene_path).map(|root| Self { root })
    }
}

impl SceneResolver for ProjectResolver {
    fn resolve(&self, path: &str) -> Result<Document, ResolutionError> {
        let file = resource_path_to_file(&self.root, path).ok_or_else(|| {
            ResolutionError::BaseScene {
                path: path.to_string(),
                reason: "not a res:// path".to_string(),
            }
        })?;
        let text = fs::read_to_string(&file).map_err(|e| ResolutionError::BaseScene {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        parse(&text).map_err(|e| ResolutionError::BaseScene {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}
