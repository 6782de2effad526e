//! YAML parsing with error handling

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::yaml::diagnostics::{YamlError, YamlSyntaxError};

/// Parse YAML content into a typed value with source-pointing errors
pub fn parse_yaml<T: DeserializeOwned>(content: &str, filename: &str) -> Result<T, YamlError> {
    serde_yml::from_str(content).map_err(|e| {
        YamlError::Syntax(YamlSyntaxError::from_serde_error(&e, content, filename))
    })
}

/// Parse YAML from a file path
pub fn parse_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T, YamlError> {
    let content = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();
    parse_yaml(&content, &filename)
}

/// Parse a file into JSON, for schema validation before typing it
pub fn parse_yaml_file_to_json(path: &Path) -> Result<(serde_json::Value, String), YamlError> {
    let content = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();
    let value: serde_json::Value = parse_yaml(&content, &filename)?;
    Ok((value, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Member {
        username: String,
        active: bool,
    }

    #[test]
    fn test_parse_valid_yaml() {
        let yaml = "username: jsmith\nactive: true";
        let result: Member = parse_yaml(yaml, "team.yaml").unwrap();
        assert_eq!(result.username, "jsmith");
        assert!(result.active);
    }

    #[test]
    fn test_parse_invalid_yaml_returns_error() {
        let yaml = "username: jsmith\n  invalid indentation";
        let result: Result<Member, _> = parse_yaml(yaml, "team.yaml");
        assert!(matches!(result, Err(YamlError::Syntax(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result: Result<Member, _> = parse_yaml_file(Path::new("/nonexistent/team.yaml"));
        assert!(matches!(result, Err(YamlError::Io(_))));
    }
}
