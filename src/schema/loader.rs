//! Loading authored YAML records from disk

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::EntityPrefix;
use crate::entities::{ApprovalLine, Template};
use crate::schema::validator::SchemaValidator;
use crate::yaml::{parse_yaml_file_to_json, YamlError};

fn load_validated<T: DeserializeOwned>(
    validator: &SchemaValidator,
    prefix: EntityPrefix,
    path: &Path,
) -> Result<T, YamlError> {
    let (value, _) = parse_yaml_file_to_json(path)?;
    let file = path.display().to_string();
    validator.validate(prefix, &value, &file)?;
    serde_json::from_value(value).map_err(|e| YamlError::Schema {
        file,
        kind: prefix.as_str().to_lowercase(),
        violations: vec![e.to_string()],
    })
}

/// Parse, validate and type a template file
pub fn load_template_file(validator: &SchemaValidator, path: &Path) -> Result<Template, YamlError> {
    load_validated(validator, EntityPrefix::Tpl, path)
}

/// Parse, validate and type an approval line file, including its conditions
pub fn load_line_file(validator: &SchemaValidator, path: &Path) -> Result<ApprovalLine, YamlError> {
    load_validated(validator, EntityPrefix::Line, path)
}

/// All `.yaml`/`.yml` files under a directory, sorted. A missing directory is empty.
pub fn yaml_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    files.sort();
    files
}

/// Expand a list of files and directories into YAML files
pub fn collect_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .flat_map(|p| if p.is_dir() { yaml_files(p) } else { vec![p.clone()] })
        .collect()
}
