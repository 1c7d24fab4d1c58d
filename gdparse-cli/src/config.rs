//! Checker configuration loaded from gdparse.toml

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Configuration for the `check` command, loaded from `gdparse.toml` when
/// present next to the checked directory.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    /// File extensions to check
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names to skip while walking
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_dirs: default_ignore_dirs(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["tscn".to_string(), "tres".to_string()]
}

fn default_ignore_dirs() -> Vec<String> {
    vec![".git".to_string(), ".import".to_string(), ".godot".to_string()]
}

impl CheckConfig {
    /// Load `gdparse.toml` from `dir`, falling back to defaults when the
    /// file does not exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("gdparse.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known == e))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CheckConfig::default();
        assert_eq!(config.extensions, vec!["tscn", "tres"]);
        assert!(config.ignore_dirs.contains(&".git".to_string()));
    }

    #[test]
    fn test_matches_extension() {
        let config = CheckConfig::default();
        assert!(config.matches_extension(Path::new("Player.tscn")));
        assert!(config.matches_extension(Path::new("dir/theme.tres")));
        assert!(!config.matches_extension(Path::new("script.gd")));
        assert!(!config.matches_extension(Path::new("no_extension")));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("gdparse.toml"),
            "extensions = [\"tscn\"]\nignore_dirs = [\"addons\"]\n",
        )
        .unwrap();
        let config = CheckConfig::load(dir.path()).unwrap();
        assert_eq!(config.extensions, vec!["tscn"]);
        assert_eq!(config.ignore_dirs, vec!["addons"]);
    }

    #[test]
    fn test_load_missing_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckConfig::load(dir.path()).unwrap();
        assert_eq!(config.extensions, CheckConfig::default().extensions);
    }
}
