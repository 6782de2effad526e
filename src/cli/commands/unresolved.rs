//! `aprv unresolved` command - Steps parked without an approver

use clap::Args;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::commands::utils::print_instance;
use crate::cli::helpers::{parse_instance_id, truncate_str};
use crate::cli::output::print_rows;
use crate::cli::{GlobalOpts, Session};
use crate::core::UnresolvedStep;

#[derive(Debug, Args)]
pub struct UnresolvedArgs {
    /// Re-resolve the parked steps of this instance instead of listing
    #[arg(long, value_name = "ID")]
    pub retry: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct UnresolvedRow {
    #[tabled(rename = "INSTANCE")]
    instance_id: String,
    #[tabled(rename = "STEP")]
    step_order: u32,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "APPROVER")]
    approver: String,
    #[tabled(rename = "DOCUMENT")]
    document: String,
    #[tabled(rename = "SINCE")]
    since: String,
}

impl From<&UnresolvedStep> for UnresolvedRow {
    fn from(u: &UnresolvedStep) -> Self {
        Self {
            instance_id: u.instance_id.to_string(),
            step_order: u.step_order,
            name: truncate_str(&u.name, 24),
            approver: format!("{} '{}'", u.approver_type, u.approver),
            document: format!(
                "{} {}",
                u.document.document_type,
                u.document.document_no.as_deref().unwrap_or(&u.document.document_id)
            ),
            since: u
                .since
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

impl UnresolvedArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;

        if let Some(id) = &self.retry {
            let user = session.user()?;
            let id = parse_instance_id(id)?;
            let instance = session.retrying(|| {
                session.service.retry_unresolved(&session.tenant, &id, user)
            })?;
            return print_instance(&instance, global.format);
        }

        let queue = session
            .service
            .get_unresolved_steps(&session.tenant)
            .into_diagnostic()?;
        let rows: Vec<UnresolvedRow> = queue.iter().map(UnresolvedRow::from).collect();
        let ids: Vec<String> = queue.iter().map(|u| u.instance_id.to_string()).collect();
        print_rows(&rows, &ids, global.format, "No steps waiting on an approver.")
    }
}
