//! `aprv delegation` command - Temporary transfer of approval authority

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use console::style;
use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::output::{print_rows, print_success};
use crate::cli::{GlobalOpts, Session};
use crate::core::{EntityId, UserId};
use crate::entities::Delegation;

#[derive(Subcommand, Debug)]
pub enum DelegationCommands {
    /// Delegate approvals to another user
    Add(AddArgs),

    /// List delegations
    List(ListArgs),

    /// Deactivate a delegation
    Revoke(RevokeArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// User receiving the authority
    pub delegate: String,

    /// User giving up the authority (defaults to the acting user)
    #[arg(long)]
    pub from: Option<String>,

    /// First day, YYYY-MM-DD (defaults to today)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day, YYYY-MM-DD, inclusive
    #[arg(long)]
    pub end: NaiveDate,

    /// Restrict to these document types (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,

    #[arg(long, short = 'r')]
    pub reason: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Include revoked delegations
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct RevokeArgs {
    /// Delegation ID
    pub id: String,
}

#[derive(Debug, Serialize, Tabled)]
struct DelegationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "FROM")]
    delegator: String,
    #[tabled(rename = "TO")]
    delegate: String,
    #[tabled(rename = "SCOPE")]
    scope: String,
    #[tabled(rename = "START")]
    start_date: NaiveDate,
    #[tabled(rename = "END")]
    end_date: NaiveDate,
    #[tabled(rename = "ACTIVE")]
    is_active: bool,
}

impl From<&Delegation> for DelegationRow {
    fn from(d: &Delegation) -> Self {
        let scope = if d.document_types.is_empty() {
            d.delegation_type.to_string()
        } else {
            d.document_types.join(",")
        };
        Self {
            id: d.id.to_string(),
            delegator: d.delegator_id.to_string(),
            delegate: d.delegate_id.to_string(),
            scope,
            start_date: d.start_date,
            end_date: d.end_date,
            is_active: d.is_active,
        }
    }
}

pub fn run(cmd: DelegationCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        DelegationCommands::Add(args) => run_add(args, global),
        DelegationCommands::List(args) => run_list(args, global),
        DelegationCommands::Revoke(args) => run_revoke(args, global),
    }
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let delegator = match args.from {
        Some(from) => UserId::new(from),
        None => session.user()?.clone(),
    };
    let start = args.start.unwrap_or_else(|| session.service.today());

    let mut delegation = Delegation::new(
        session.tenant.clone(),
        delegator,
        UserId::new(args.delegate),
        start,
        args.end,
    );
    if !args.types.is_empty() {
        delegation = delegation.partial(args.types);
    }
    delegation.reason = args.reason;
    delegation.created = session.service.now();

    session.service.add_delegation(&delegation).into_diagnostic()?;
    print_success(&format!(
        "{} {} → {} ({} to {})",
        style(&delegation.id).cyan(),
        delegation.delegator_id,
        delegation.delegate_id,
        delegation.start_date,
        delegation.end_date
    ));
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let mut delegations: Vec<Delegation> = session
        .service
        .delegations(&session.tenant)
        .into_diagnostic()?
        .into_iter()
        .filter(|d| args.all || d.is_active)
        .collect();
    delegations.sort_by_key(|d| (d.start_date, d.created));

    let rows: Vec<DelegationRow> = delegations.iter().map(DelegationRow::from).collect();
    let ids: Vec<String> = delegations.iter().map(|d| d.id.to_string()).collect();
    print_rows(&rows, &ids, global.format, "No delegations.")
}

fn run_revoke(args: RevokeArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let id: EntityId = args
        .id
        .trim()
        .parse()
        .map_err(|e| miette!("Invalid delegation ID '{}': {}", args.id, e))?;
    session
        .service
        .revoke_delegation(&session.tenant, &id)
        .into_diagnostic()?;
    print_success(&format!("Revoked {}", style(id).cyan()));
    Ok(())
}
