//! Scaffold generation for new templates and lines

use chrono::{DateTime, Utc};
use rust_embed::Embed;
use tera::Tera;
use thiserror::Error;

use crate::core::identity::{EntityId, EntityPrefix, TenantId};

#[derive(Embed)]
#[folder = "scaffolds/"]
struct EmbeddedScaffolds;

const TEMPLATE_SCAFFOLD: &str = "template.yaml.tera";
const LINE_SCAFFOLD: &str = "line.yaml.tera";

/// Values substituted into a scaffold
#[derive(Debug, Clone)]
pub struct ScaffoldContext {
    pub tenant: TenantId,
    pub code: String,
    pub author: String,
    pub created: DateTime<Utc>,
    pub name: Option<String>,
    pub document_type: Option<String>,
    pub approval_type: Option<String>,
    pub is_default: bool,
    // Line fields
    pub template_code: Option<String>,
    pub department: Option<String>,
}

impl ScaffoldContext {
    pub fn new(tenant: TenantId, code: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            tenant,
            code: code.into(),
            author: author.into(),
            created: Utc::now(),
            name: None,
            document_type: None,
            approval_type: None,
            is_default: false,
            template_code: None,
            department: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = Some(document_type.into());
        self
    }

    pub fn with_approval_type(mut self, approval_type: impl Into<String>) -> Self {
        self.approval_type = Some(approval_type.into());
        self
    }

    pub fn as_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn with_template_code(mut self, template_code: impl Into<String>) -> Self {
        self.template_code = Some(template_code.into());
        self
    }

    pub fn with_department(mut self, department: Option<String>) -> Self {
        self.department = department;
        self
    }

    fn base_context(&self, prefix: EntityPrefix) -> tera::Context {
        let mut context = tera::Context::new();
        context.insert("id", &EntityId::new(prefix).to_string());
        context.insert("tenant", self.tenant.as_str());
        context.insert("code", &self.code);
        context.insert("author", &self.author);
        context.insert("created", &self.created.to_rfc3339());
        context.insert("name", &self.name.clone().unwrap_or_else(|| self.code.clone()));
        context.insert(
            "document_type",
            &self.document_type.clone().unwrap_or_else(|| "purchase_order".to_string()),
        );
        context
    }
}

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("Scaffold not found: {0}")]
    NotFound(String),

    #[error("Scaffold rendering error: {0}")]
    RenderError(String),
}

/// Scaffold generator using Tera
pub struct ScaffoldGenerator {
    tera: Tera,
}

impl ScaffoldGenerator {
    /// Create a generator over the embedded scaffolds
    pub fn new() -> Result<Self, ScaffoldError> {
        let mut tera = Tera::default();

        for file in EmbeddedScaffolds::iter() {
            let filename = file.as_ref();
            if let Some(content) = EmbeddedScaffolds::get(filename) {
                if let Ok(source) = std::str::from_utf8(&content.data) {
                    tera.add_raw_template(filename, source)
                        .map_err(|e| ScaffoldError::RenderError(e.to_string()))?;
                }
            }
        }

        Ok(Self { tera })
    }

    fn render(&self, name: &str, context: &tera::Context) -> Result<String, ScaffoldError> {
        if !self.tera.get_template_names().any(|n| n == name) {
            return Err(ScaffoldError::NotFound(name.to_string()));
        }
        self.tera
            .render(name, context)
            .map_err(|e| ScaffoldError::RenderError(e.to_string()))
    }

    /// Generate a template file with a single manager step
    pub fn generate_template(&self, ctx: &ScaffoldContext) -> Result<String, ScaffoldError> {
        let mut context = ctx.base_context(EntityPrefix::Tpl);
        context.insert(
            "approval_type",
            &ctx.approval_type.clone().unwrap_or_else(|| "sequential".to_string()),
        );
        context.insert("is_default", &ctx.is_default);
        self.render(TEMPLATE_SCAFFOLD, &context)
    }

    /// Generate a routing line file
    pub fn generate_line(&self, ctx: &ScaffoldContext) -> Result<String, ScaffoldError> {
        let mut context = ctx.base_context(EntityPrefix::Line);
        context.insert("template_code", &ctx.template_code.clone().unwrap_or_default());
        context.insert("department", &ctx.department);
        self.render(LINE_SCAFFOLD, &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ApprovalLine, Template};

    #[test]
    fn test_template_scaffold_parses_and_validates() {
        let generator = ScaffoldGenerator::new().unwrap();
        let ctx = ScaffoldContext::new(TenantId::new("acme"), "PO-STD", "jsmith")
            .with_name("Standard PO")
            .with_document_type("purchase_order");

        let yaml = generator.generate_template(&ctx).unwrap();
        let template: Template = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(template.code, "PO-STD");
        assert_eq!(template.name, "Standard PO");
        assert_eq!(template.steps.len(), 1);
        template.validate().unwrap();
    }

    #[test]
    fn test_line_scaffold_with_department() {
        let generator = ScaffoldGenerator::new().unwrap();
        let ctx = ScaffoldContext::new(TenantId::new("acme"), "L-ENG", "jsmith")
            .with_template_code("PO-STD")
            .with_department(Some("engineering".to_string()));

        let yaml = generator.generate_line(&ctx).unwrap();
        let line: ApprovalLine = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(line.template_code, "PO-STD");
        assert_eq!(line.department.as_deref(), Some("engineering"));
        assert_eq!(line.min_amount(), Some(0.0));
    }
}
