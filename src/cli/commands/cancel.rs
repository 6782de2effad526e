//! `aprv cancel` command - Cancel an instance

use clap::Args;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{bail, IntoDiagnostic, Result};
use std::io::IsTerminal;

use crate::cli::commands::utils::print_instance;
use crate::cli::helpers::parse_instance_id;
use crate::cli::{GlobalOpts, Session};

#[derive(Debug, Args)]
pub struct CancelArgs {
    /// Instance ID
    pub id: String,

    #[arg(long, short = 'r')]
    pub reason: Option<String>,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl CancelArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;
        let user = session.user()?;
        let id = parse_instance_id(&self.id)?;

        if !self.yes {
            if !std::io::stdin().is_terminal() {
                bail!("Refusing to cancel {} without confirmation; pass --yes", id);
            }
            let confirmed = Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("Cancel approval instance {}?", id))
                .default(false)
                .interact()
                .into_diagnostic()?;
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }
        }

        let instance = session.retrying(|| {
            session
                .service
                .cancel_instance(&session.tenant, &id, user, self.reason.as_deref())
        })?;
        print_instance(&instance, global.format)
    }
}
