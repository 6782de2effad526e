//! `aprv history` command - Event history of an instance

use chrono::{DateTime, Utc};
use clap::Args;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::helpers::parse_instance_id;
use crate::cli::output::print_rows;
use crate::cli::{GlobalOpts, Session};
use crate::entities::ApprovalEvent;

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Instance ID
    pub id: String,

    /// Only the last N events
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    #[tabled(rename = "AT")]
    at: DateTime<Utc>,
    #[tabled(rename = "ACTION")]
    action: String,
    #[tabled(rename = "STEP")]
    step: String,
    #[tabled(rename = "ACTOR")]
    actor: String,
    #[tabled(rename = "FOR")]
    on_behalf_of: String,
    #[tabled(rename = "COMMENT")]
    comment: String,
}

impl From<&ApprovalEvent> for EventRow {
    fn from(e: &ApprovalEvent) -> Self {
        Self {
            at: e.at,
            action: e.action.to_string(),
            step: e.step_order.map(|s| s.to_string()).unwrap_or_default(),
            actor: e.actor.as_ref().map(|a| a.to_string()).unwrap_or_default(),
            on_behalf_of: e.on_behalf_of.as_ref().map(|a| a.to_string()).unwrap_or_default(),
            comment: e.comment.clone().unwrap_or_default(),
        }
    }
}

impl HistoryArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;
        let id = parse_instance_id(&self.id)?;
        let mut events = session
            .service
            .get_instance_history(&session.tenant, &id)
            .into_diagnostic()?;

        if let Some(limit) = self.limit {
            let skip = events.len().saturating_sub(limit);
            events.drain(..skip);
        }

        let rows: Vec<EventRow> = events.iter().map(EventRow::from).collect();
        let ids: Vec<String> = events.iter().map(|_| id.to_string()).collect();
        print_rows(&rows, &ids, global.format, "No events.")
    }
}
