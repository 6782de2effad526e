//! JSON schema validation of authored YAML records

use std::collections::HashMap;
use tracing::warn;

use crate::core::EntityPrefix;
use crate::schema::registry::SchemaRegistry;
use crate::yaml::YamlError;

fn compile(name: &str, source: &str) -> Option<jsonschema::Validator> {
    let schema: serde_json::Value = match serde_json::from_str(source) {
        Ok(schema) => schema,
        Err(e) => {
            warn!(schema = name, error = %e, "embedded schema is not JSON");
            return None;
        }
    };
    match jsonschema::validator_for(&schema) {
        Ok(validator) => Some(validator),
        Err(e) => {
            warn!(schema = name, error = %e, "embedded schema does not compile");
            None
        }
    }
}

fn violations(validator: &jsonschema::Validator, value: &serde_json::Value) -> Vec<String> {
    validator
        .iter_errors(value)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect()
}

/// Compiled validators for every embedded schema
pub struct SchemaValidator {
    validators: HashMap<EntityPrefix, jsonschema::Validator>,
    conditions: Option<jsonschema::Validator>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        let registry = SchemaRegistry::new();
        let validators = EntityPrefix::all()
            .iter()
            .filter_map(|prefix| {
                let source = registry.get(*prefix)?;
                compile(prefix.as_str(), source).map(|v| (*prefix, v))
            })
            .collect();
        Self {
            validators,
            conditions: registry.conditions().and_then(|s| compile("conditions", s)),
        }
    }

    /// Check a record against the schema of its type. Types without a schema pass.
    pub fn validate(
        &self,
        prefix: EntityPrefix,
        value: &serde_json::Value,
        file: &str,
    ) -> Result<(), YamlError> {
        if let Some(validator) = self.validators.get(&prefix) {
            let found = violations(validator, value);
            if !found.is_empty() {
                return Err(YamlError::Schema {
                    file: file.to_string(),
                    kind: prefix.as_str().to_lowercase(),
                    violations: found,
                });
            }
        }

        if prefix == EntityPrefix::Line {
            if let (Some(validator), Some(conditions)) = (&self.conditions, value.get("conditions")) {
                if !conditions.is_null() {
                    let found = violations(validator, conditions);
                    if !found.is_empty() {
                        return Err(YamlError::Schema {
                            file: file.to_string(),
                            kind: "conditions".to_string(),
                            violations: found,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}
