//! Template resolver - picks the template that governs a document
//!
//! Templates and legacy approval lines both compete as candidates. The
//! winner is the lowest priority value, then a default over a non-default,
//! then the smaller code.

use std::cmp::Ordering;
use tracing::debug;

use crate::core::error::ApprovalError;
use crate::core::identity::TenantId;
use crate::entities::line::ApprovalLine;
use crate::entities::template::Template;

/// Document attributes used for routing
#[derive(Debug, Clone, Copy)]
pub struct TemplateQuery<'a> {
    pub tenant: &'a TenantId,
    pub document_type: &'a str,
    pub amount: Option<f64>,
    pub department: Option<&'a str>,
}

/// The chosen template and, when routed through one, the line
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub template: &'a Template,
    pub line: Option<&'a ApprovalLine>,
}

struct Candidate<'a> {
    priority: i32,
    is_default: bool,
    code: &'a str,
    selection: Selection<'a>,
}

impl Candidate<'_> {
    fn rank(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.is_default.cmp(&self.is_default))
            .then_with(|| self.code.cmp(other.code))
    }
}

fn department_matches(scope: Option<&str>, department: Option<&str>) -> bool {
    match (scope, department) {
        (None, _) => true,
        (Some(scope), Some(department)) => scope.eq_ignore_ascii_case(department),
        (Some(_), None) => false,
    }
}

pub struct TemplateResolver<'a> {
    templates: &'a [Template],
    lines: &'a [ApprovalLine],
}

impl<'a> TemplateResolver<'a> {
    pub fn new(templates: &'a [Template], lines: &'a [ApprovalLine]) -> Self {
        Self { templates, lines }
    }

    fn template_by_code(&self, tenant: &TenantId, code: &str) -> Option<&'a Template> {
        self.templates
            .iter()
            .find(|t| &t.tenant == tenant && t.code == code && t.is_active)
    }

    pub fn resolve(&self, query: &TemplateQuery<'_>) -> Result<Selection<'a>, ApprovalError> {
        let templates = self
            .templates
            .iter()
            .filter(|t| t.is_active && &t.tenant == query.tenant)
            .filter(|t| t.document_type == query.document_type)
            .filter(|t| department_matches(t.department.as_deref(), query.department))
            .map(|t| Candidate {
                priority: t.priority,
                is_default: t.is_default,
                code: &t.code,
                selection: Selection {
                    template: t,
                    line: None,
                },
            });

        let lines = self
            .lines
            .iter()
            .filter(|l| l.is_active && &l.tenant == query.tenant)
            .filter(|l| l.document_type == query.document_type)
            .filter(|l| department_matches(l.department.as_deref(), query.department))
            .filter(|l| l.accepts_amount(query.amount))
            .filter_map(|l| {
                let template = self.template_by_code(query.tenant, &l.template_code)?;
                Some(Candidate {
                    priority: l.priority,
                    is_default: l.is_default,
                    code: &l.code,
                    selection: Selection {
                        template,
                        line: Some(l),
                    },
                })
            });

        let best = templates
            .chain(lines)
            .min_by(|a, b| a.rank(b))
            .ok_or_else(|| ApprovalError::TemplateNotFound {
                tenant: query.tenant.clone(),
                document_type: query.document_type.to_string(),
            })?;

        debug!(
            template = %best.selection.template.code,
            line = ?best.selection.line.map(|l| l.code.as_str()),
            document_type = query.document_type,
            "template resolved"
        );
        Ok(best.selection)
    }
}
