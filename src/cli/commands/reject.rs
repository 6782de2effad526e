//! `aprv reject` command - Reject a step

use clap::Args;
use miette::Result;

use crate::cli::commands::utils::{print_instance, step_for_user};
use crate::cli::helpers::parse_instance_id;
use crate::cli::{GlobalOpts, Session};

#[derive(Debug, Args)]
pub struct RejectArgs {
    /// Instance ID
    pub id: String,

    /// Step to reject (defaults to your only open step)
    #[arg(long, short = 's')]
    pub step: Option<u32>,

    /// Rejection reason (required)
    #[arg(long, short = 'r')]
    pub reason: String,
}

impl RejectArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;
        let user = session.user()?;
        let id = parse_instance_id(&self.id)?;
        let step = step_for_user(&session, &id, self.step, user)?;
        let instance = session.retrying(|| {
            session
                .service
                .reject_step(&session.tenant, &id, step, user, &self.reason)
        })?;
        print_instance(&instance, global.format)
    }
}
