//! Schema registry - embedded JSON schemas

use rust_embed::Embed;
use std::collections::HashMap;

use crate::core::EntityPrefix;

#[derive(Embed)]
#[folder = "schemas/"]
struct EmbeddedSchemas;

/// Schema for the free-form `conditions` object of an approval line
pub const CONDITIONS_SCHEMA: &str = "conditions.schema.json";

/// Registry of JSON schemas for authored records
pub struct SchemaRegistry {
    schemas: HashMap<EntityPrefix, String>,
    conditions: Option<String>,
}

fn embedded(filename: &str) -> Option<String> {
    let file = EmbeddedSchemas::get(filename)?;
    std::str::from_utf8(&file.data).ok().map(|s| s.to_string())
}

impl SchemaRegistry {
    /// Create a new schema registry with embedded schemas
    pub fn new() -> Self {
        let mut schemas = HashMap::new();

        for prefix in EntityPrefix::all() {
            let filename = format!("{}.schema.json", prefix.as_str().to_lowercase());
            if let Some(content) = embedded(&filename) {
                schemas.insert(*prefix, content);
            }
        }

        Self {
            schemas,
            conditions: embedded(CONDITIONS_SCHEMA),
        }
    }

    /// Get the JSON schema for a record type
    pub fn get(&self, prefix: EntityPrefix) -> Option<&str> {
        self.schemas.get(&prefix).map(|s| s.as_str())
    }

    pub fn has_schema(&self, prefix: EntityPrefix) -> bool {
        self.schemas.contains_key(&prefix)
    }

    pub fn conditions(&self) -> Option<&str> {
        self.conditions.as_deref()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authored_records_have_schemas() {
        let registry = SchemaRegistry::new();
        assert!(registry.has_schema(EntityPrefix::Tpl));
        assert!(registry.has_schema(EntityPrefix::Line));
        assert!(!registry.has_schema(EntityPrefix::Inst));
        assert!(registry.conditions().is_some());
    }

    #[test]
    fn test_schemas_are_json() {
        let registry = SchemaRegistry::new();
        let tpl: serde_json::Value = serde_json::from_str(registry.get(EntityPrefix::Tpl).unwrap()).unwrap();
        assert_eq!(tpl["title"], "Approval template");
    }
}
