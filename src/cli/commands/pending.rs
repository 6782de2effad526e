//! `aprv pending` command - Steps waiting on a user

use clap::Args;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::helpers::truncate_str;
use crate::cli::output::print_rows;
use crate::cli::{GlobalOpts, Session};
use crate::core::{PendingStep, UserId};

#[derive(Debug, Args)]
pub struct PendingArgs {
    /// User to list steps for (defaults to the acting user)
    #[arg(long, short = 'u')]
    pub user: Option<String>,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Serialize, Tabled)]
struct PendingRow {
    #[tabled(rename = "INSTANCE")]
    instance_id: String,
    #[tabled(rename = "STEP")]
    step_order: u32,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "DOCUMENT")]
    document: String,
    #[tabled(rename = "REQUESTER")]
    requester: String,
    #[tabled(rename = "FOR")]
    on_behalf_of: String,
    #[tabled(rename = "DUE")]
    due_at: String,
}

impl From<&PendingStep> for PendingRow {
    fn from(p: &PendingStep) -> Self {
        Self {
            instance_id: p.instance_id.to_string(),
            step_order: p.step_order,
            name: truncate_str(&p.name, 24),
            document: format!(
                "{} {}",
                p.document.document_type,
                p.document.document_no.as_deref().unwrap_or(&p.document.document_id)
            ),
            requester: p.requester_id.to_string(),
            on_behalf_of: or_dash(p.on_behalf_of.as_ref()),
            due_at: or_dash(p.due_at.map(|d| d.format("%Y-%m-%d %H:%M"))),
        }
    }
}

impl PendingArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;
        let user = match &self.user {
            Some(user) => UserId::new(user.as_str()),
            None => session.user()?.clone(),
        };

        let pending = session
            .service
            .get_pending_steps_for_user(&session.tenant, &user)
            .into_diagnostic()?;

        let rows: Vec<PendingRow> = pending.iter().map(PendingRow::from).collect();
        let ids: Vec<String> = pending.iter().map(|p| p.instance_id.to_string()).collect();
        print_rows(&rows, &ids, global.format, &format!("Nothing waiting on {}.", user))
    }
}
