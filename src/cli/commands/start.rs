//! `aprv start` command - Start a pending instance

use clap::Args;
use miette::Result;

use crate::cli::commands::utils::print_instance;
use crate::cli::helpers::parse_instance_id;
use crate::cli::{GlobalOpts, Session};

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Instance ID
    pub id: String,
}

impl StartArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;
        let user = session.user()?;
        let id = parse_instance_id(&self.id)?;
        let instance = session.retrying(|| {
            session.service.start_approval(&session.tenant, &id, user)
        })?;
        print_instance(&instance, global.format)
    }
}
