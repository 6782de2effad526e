//! Command-line argument definitions

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    approve::ApproveArgs, cancel::CancelArgs, completions::CompletionsArgs,
    delegation::DelegationCommands, history::HistoryArgs, init::InitArgs, line::LineCommands,
    pending::PendingArgs, reject::RejectArgs, request::RequestArgs, skip::SkipArgs,
    start::StartArgs, status::StatusArgs, sweep::SweepArgs, template::TemplateCommands,
    unresolved::UnresolvedArgs,
};

/// aprv - document approval workflows from the command line
#[derive(Debug, Parser)]
#[command(name = "aprv", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options accepted by every command
#[derive(Debug, Clone, clap::Args)]
pub struct GlobalOpts {
    /// Tenant to operate on (overrides config and APRV_TENANT)
    #[arg(long, global = true)]
    pub tenant: Option<String>,

    /// Act as this user (overrides config, APRV_USER and $USER)
    #[arg(long = "as", global = true, value_name = "USER")]
    pub as_user: Option<String>,

    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value_t = OutputFormat::Auto)]
    pub format: OutputFormat,

    /// Debug logging (APRV_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, env = "APRV_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table for lists, YAML for single records
    #[default]
    Auto,
    Table,
    Yaml,
    Json,
    Csv,
    /// IDs only, one per line
    Id,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create an aprv project in the current directory
    Init(InitArgs),

    /// Manage approval templates
    #[command(subcommand)]
    Template(TemplateCommands),

    /// Manage legacy approval lines
    #[command(subcommand)]
    Line(LineCommands),

    /// Request approval of a document
    Request(RequestArgs),

    /// Start a pending instance
    Start(StartArgs),

    /// Approve a step
    Approve(ApproveArgs),

    /// Reject a step
    Reject(RejectArgs),

    /// Skip a step
    Skip(SkipArgs),

    /// Cancel an instance
    Cancel(CancelArgs),

    /// Show the status of an instance
    Status(StatusArgs),

    /// List steps waiting for a user
    Pending(PendingArgs),

    /// Show the event history of an instance
    History(HistoryArgs),

    /// Time out overdue steps
    Sweep(SweepArgs),

    /// List or retry steps no approver could be found for
    Unresolved(UnresolvedArgs),

    /// Manage delegations
    #[command(subcommand)]
    Delegation(DelegationCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
