//! `aprv skip` command - Skip a step

use clap::Args;
use miette::Result;

use crate::cli::commands::utils::print_instance;
use crate::cli::helpers::parse_instance_id;
use crate::cli::{GlobalOpts, Session};

#[derive(Debug, Args)]
pub struct SkipArgs {
    /// Instance ID
    pub id: String,

    /// Step to skip
    #[arg(long, short = 's')]
    pub step: u32,

    /// Why the step is skipped
    #[arg(long, short = 'r')]
    pub reason: String,
}

impl SkipArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;
        let user = session.user()?;
        let id = parse_instance_id(&self.id)?;
        let instance = session.retrying(|| {
            session
                .service
                .skip_step(&session.tenant, &id, self.step, user, &self.reason)
        })?;
        print_instance(&instance, global.format)
    }
}
