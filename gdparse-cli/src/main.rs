//! GdParse CLI
//!
//! Command-line tooling around the gdparse-core format engine: bulk
//! round-trip checking of scene files, tree inspection, and JSON dumps.
//! All filesystem I/O lives here; the core only sees text.

mod config;
mod paths;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gdparse_core::{no_resolver, parse, serialize, NodeId, ParseError, SceneResolver, SceneTree};

use config::CheckConfig;
use paths::ProjectResolver;

#[derive(Parser)]
#[command(name = "gdparse")]
#[command(about = "Godot text scene/resource file parser and checker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse every scene file under a path and verify it round-trips
    Check {
        /// File or directory to check
        path: PathBuf,
    },

    /// Print the node tree of a scene file (resolving scene inheritance)
    Tree {
        /// Scene file to inspect
        file: PathBuf,
    },

    /// Print a parsed document as JSON
    Dump {
        /// Scene or resource file to dump
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gdparse=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { path } => cmd_check(path),
        Commands::Tree { file } => cmd_tree(file),
        Commands::Dump { file } => cmd_dump(file),
    }
}

/// Outcome of checking one file.
#[derive(Debug)]
enum CheckOutcome {
    Passed,
    /// Input looks like a compiled binary scene, not text
    Binary,
    ParseFailed(ParseError),
    /// Serialized output did not re-parse to an equal document
    Mismatch,
}

fn cmd_check(path: PathBuf) -> Result<()> {
    let config_dir = if path.is_dir() {
        path.clone()
    } else {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    };
    let config = CheckConfig::load(&config_dir)?;

    let mut files = Vec::new();
    if path.is_file() {
        files.push(path.clone());
    } else {
        collect_files(&path, &config, &mut files)
            .with_context(|| format!("Failed to walk {}", path.display()))?;
    }
    if files.is_empty() {
        println!("No scene files found under {}", path.display());
        return Ok(());
    }

    let mut failed = 0usize;
    for file in &files {
        match check_file(file)? {
            CheckOutcome::Passed => {
                println!("ok      {}", file.display());
            }
            CheckOutcome::Binary => {
                failed += 1;
                println!(
                    "binary  {} (looks like a compiled binary scene, not text)",
                    file.display()
                );
            }
            CheckOutcome::ParseFailed(err) => {
                failed += 1;
                println!("error   {}: {}", file.display(), err);
            }
            CheckOutcome::Mismatch => {
                failed += 1;
                println!("differs {} (round-trip produced a different document)", file.display());
            }
        }
    }

    println!("{} checked, {} failed", files.len(), failed);
    if failed > 0 {
        bail!("{} of {} files failed the round-trip check", failed, files.len());
    }
    Ok(())
}

fn collect_files(dir: &Path, config: &CheckConfig, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if config.ignore_dirs.iter().any(|d| d == name) {
                continue;
            }
            collect_files(&path, config, out)?;
        } else if config.matches_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn check_file(path: &Path) -> Result<CheckOutcome> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return Ok(CheckOutcome::Binary),
    };
    let doc = match parse(&text) {
        Ok(doc) => doc,
        Err(ParseError::BinaryFormat) => return Ok(CheckOutcome::Binary),
        Err(err) => return Ok(CheckOutcome::ParseFailed(err)),
    };
    let written = serialize(&doc);
    match parse(&written) {
        Ok(reparsed) if reparsed == doc => Ok(CheckOutcome::Passed),
        Ok(_) => Ok(CheckOutcome::Mismatch),
        Err(err) => {
            tracing::debug!(file = %path.display(), %err, "re-parse of serialized output failed");
            Ok(CheckOutcome::Mismatch)
        }
    }
}

fn cmd_tree(file: PathBuf) -> Result<()> {
    let text =
        fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
    let mut doc = parse(&text).with_context(|| format!("Failed to parse {}", file.display()))?;

    let resolver: Box<dyn SceneResolver> = match ProjectResolver::for_scene(&file) {
        Some(resolver) => Box::new(resolver),
        None => Box::new(no_resolver),
    };

    let edit = doc
        .edit_tree(resolver.as_ref())
        .with_context(|| format!("Failed to build tree for {}", file.display()))?;
    match edit.root() {
        Some(root) => print_node(&edit, root, 0),
        None => println!("(no nodes)"),
    }
    edit.discard();
    Ok(())
}

fn print_node(tree: &SceneTree, id: NodeId, depth: usize) {
    let node = tree.node(id);
    let kind = match (node.node_type(), node.instance_id()) {
        (Some(t), _) => format!(" ({})", t),
        (None, Some(ext)) => format!(" (instance of ExtResource {})", ext),
        (None, None) => String::new(),
    };
    let inherited = if node.is_inherited() && !node.has_changes() {
        " [inherited]"
    } else if node.is_inherited() {
        " [inherited, modified]"
    } else {
        ""
    };
    println!("{}{}{}{}", "  ".repeat(depth), node.name(), kind, inherited);
    for child in tree.node(id).children() {
        print_node(tree, *child, depth + 1);
    }
}

fn cmd_dump(file: PathBuf) -> Result<()> {
    let text =
        fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
    let doc = parse(&text).with_context(|| format!("Failed to parse {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_check_file_passes_on_valid_scene() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(
            dir.path(),
            "Player.tscn",
            concat!(
                "[gd_scene load_steps=1 format=2]\n",
                "\n",
                "[node name=\"Player\" type=\"Node2D\"]\n",
                "position = Vector2( 1, 2 )\n",
            ),
        );
        assert!(matches!(check_file(&file).unwrap(), CheckOutcome::Passed));
    }

    #[test]
    fn test_check_file_reports_binary() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Compiled.tscn");
        fs::write(&file, b"RSRC\x00\x01\xff\xfegarbage").unwrap();
        assert!(matches!(check_file(&file).unwrap(), CheckOutcome::Binary));
    }

    #[test]
    fn test_check_file_reports_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "Broken.tscn", "[node name=\"A\"]\nx = [1, ?\n");
        assert!(matches!(
            check_file(&file).unwrap(),
            CheckOutcome::ParseFailed(ParseError::Syntax { .. })
        ));
    }

    #[test]
    fn test_collect_files_respects_config() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.tscn", "[gd_scene format=2]\n");
        write(dir.path(), "b.tres", "[gd_resource format=2]\n");
        write(dir.path(), "notes.txt", "not a scene");
        let ignored = dir.path().join(".import");
        fs::create_dir(&ignored).unwrap();
        write(&ignored, "c.tscn", "[gd_scene format=2]\n");
        let nested = dir.path().join("scenes");
        fs::create_dir(&nested).unwrap();
        write(&nested, "d.tscn", "[gd_scene format=2]\n");

        let mut files = Vec::new();
        collect_files(dir.path(), &CheckConfig::default(), &mut files).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.tscn", "b.tres", "d.tscn"]);
    }
}
