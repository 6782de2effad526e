//! CLI module - argument parsing and command dispatch

pub mod args;
pub mod commands;
pub mod filters;
pub mod helpers;
pub mod output;

pub use args::{Cli, Commands, GlobalOpts, OutputFormat};
pub use filters::StatusFilter;
pub use helpers::Session;

use miette::Result;

/// Run a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Init(args) => args.run(&global),
        Commands::Template(cmd) => commands::template::run(cmd, &global),
        Commands::Line(cmd) => commands::line::run(cmd, &global),
        Commands::Request(args) => args.run(&global),
        Commands::Start(args) => args.run(&global),
        Commands::Approve(args) => args.run(&global),
        Commands::Reject(args) => args.run(&global),
        Commands::Skip(args) => args.run(&global),
        Commands::Cancel(args) => args.run(&global),
        Commands::Status(args) => args.run(&global),
        Commands::Pending(args) => args.run(&global),
        Commands::History(args) => args.run(&global),
        Commands::Sweep(args) => args.run(&global),
        Commands::Unresolved(args) => args.run(&global),
        Commands::Delegation(cmd) => commands::delegation::run(cmd, &global),
        Commands::Completions(args) => args.run(),
    }
}
