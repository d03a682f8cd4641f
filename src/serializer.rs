//! Serialization of an analyzed [`System`] to YAML or JSON.
//!
//! Field names are the record field names; empty sequences serialize as
//! `[]` and absent shapes as `null`, nothing is omitted. Shape keys and
//! decorator arguments are ordered collections, so serializing the same
//! system twice yields byte-identical output.

use crate::system_builder::System;
use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Serializes a system to YAML format.
///
/// # Arguments
///
/// * `system` - The analyzed system to serialize
///
/// # Errors
///
/// Returns an error if serialization fails.
///
/// # Example
///
/// ```no_run
/// use pysurface::serializer::serialize_yaml;
/// use pysurface::system_builder::build_system;
/// use std::path::Path;
///
/// let system = build_system(Path::new("./platform"), None).unwrap();
/// let yaml = serialize_yaml(&system).unwrap();
/// println!("{}", yaml);
/// ```
pub fn serialize_yaml(system: &System) -> Result<String> {
    debug!("Serializing system '{}' to YAML", system.name);
    serde_yaml::to_string(system).context("Failed to serialize system to YAML")
}

/// Serializes a system to JSON format with pretty printing.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_json(system: &System) -> Result<String> {
    debug!("Serializing system '{}' to JSON", system.name);
    serde_json::to_string_pretty(system).context("Failed to serialize system to JSON")
}

/// Writes content to a file, creating parent directories if needed.
///
/// # Arguments
///
/// * `content` - The string content to write
/// * `path` - The file path to write to
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{DecoratorInfo, EntryPoint, ExitPoint, Literal};
    use crate::shape::Shape;
    use crate::system_builder::Interface;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Helper function to create a small system for testing
    fn create_test_system() -> System {
        let mut arguments = BTreeMap::new();
        arguments.insert("methods".to_string(), vec![Literal::Str("POST".to_string())]);

        System {
            name: "platform".to_string(),
            interfaces: vec![
                Interface {
                    name: "shop".to_string(),
                    entry_points: vec![EntryPoint {
                        display_name: "widgets".to_string(),
                        declared_name: Some("widgets".to_string()),
                        resolved_function_name: "list_widgets".to_string(),
                        source_file: PathBuf::from("/srv/shop/views.py"),
                        declaration_line: 7,
                        url_path: "widgets/".to_string(),
                        parameter_names: vec!["request".to_string()],
                        decorators: vec![DecoratorInfo {
                            name: "require_http_methods".to_string(),
                            arguments,
                        }],
                        payload_shape: Some(Shape::unknown()),
                        response_shape: None,
                    }],
                    exit_points: vec![ExitPoint {
                        http_verb: "post".to_string(),
                        enclosing_function_name: "sync".to_string(),
                        source_file: PathBuf::from("/srv/shop/sync.py"),
                        declaration_line: 5,
                        url: "http://x/a/b".to_string(),
                        payload_shape: Some(Shape::dict(vec!["k".to_string()])),
                        response_shape: None,
                    }],
                },
                Interface {
                    name: "empty".to_string(),
                    entry_points: Vec::new(),
                    exit_points: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn test_serialize_json_field_names() {
        let json = serialize_json(&create_test_system()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let entry = &value["interfaces"][0]["entry_points"][0];
        assert_eq!(entry["display_name"], "widgets");
        assert_eq!(entry["resolved_function_name"], "list_widgets");
        assert_eq!(entry["source_file"], "/srv/shop/views.py");
        assert_eq!(entry["decorators"][0]["arguments"]["methods"][0], "POST");
        assert_eq!(entry["payload_shape"]["kind"], "unknown");
        assert!(entry["response_shape"].is_null());

        let exit = &value["interfaces"][0]["exit_points"][0];
        assert_eq!(exit["http_verb"], "post");
        assert_eq!(exit["payload_shape"]["keys_or_attributes"][0], "k");
    }

    #[test]
    fn test_empty_sequences_are_kept() {
        let json = serialize_json(&create_test_system()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let empty = &value["interfaces"][1];
        assert_eq!(empty["entry_points"], serde_json::json!([]));
        assert_eq!(empty["exit_points"], serde_json::json!([]));
    }

    #[test]
    fn test_serialize_json_pretty_format() {
        let json = serialize_json(&create_test_system()).unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("  "));
    }

    #[test]
    fn test_serialize_yaml() {
        let yaml = serialize_yaml(&create_test_system()).unwrap();
        assert!(yaml.contains("name: platform"));
        assert!(yaml.contains("url_path: widgets/"));
        assert!(yaml.contains("http_verb: post"));
        assert!(yaml.contains("response_shape: null"));
    }

    #[test]
    fn test_serialization_is_stable() {
        let first = serialize_json(&create_test_system()).unwrap();
        let second = serialize_json(&create_test_system()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_write_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("surface.yaml");

        write_to_file("test content", &file_path).unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "test content");
    }

    #[test]
    fn test_write_to_file_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("subdir").join("nested").join("surface.json");

        write_to_file("{}", &file_path).unwrap();

        assert!(file_path.exists());
    }

    #[test]
    fn test_write_to_file_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("surface.yaml");

        write_to_file("initial content", &file_path).unwrap();
        write_to_file("new content", &file_path).unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "new content");
    }
}
