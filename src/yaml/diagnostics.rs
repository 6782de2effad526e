//! miette diagnostics for YAML files

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// A YAML syntax or shape error pointing into the source file
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(aprv::yaml::syntax), help("check indentation, quoting and field names"))]
pub struct YamlSyntaxError {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl YamlSyntaxError {
    pub fn from_serde_error(e: &serde_yml::Error, content: &str, filename: &str) -> Self {
        let span = e.location().map(|loc| {
            let offset = loc.index().min(content.len());
            let len = usize::from(offset < content.len());
            SourceSpan::from((offset, len))
        });
        Self {
            message: e.to_string(),
            src: NamedSource::new(filename, content.to_string()),
            span,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum YamlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] YamlSyntaxError),

    #[error("{file} does not match the {kind} schema:\n{}", .violations.join("\n"))]
    #[diagnostic(code(aprv::yaml::schema))]
    Schema {
        file: String,
        kind: String,
        violations: Vec<String>,
    },

    #[error("Failed to read file: {0}")]
    #[diagnostic(code(aprv::yaml::io))]
    Io(#[from] std::io::Error),
}
