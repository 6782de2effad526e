//! `aprv sweep` command - Time out overdue steps

use clap::Args;
use console::style;
use miette::Result;

use crate::cli::output::print_single;
use crate::cli::{GlobalOpts, OutputFormat, Session};

#[derive(Debug, Args)]
pub struct SweepArgs {}

impl SweepArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;
        let report = session.service.sweep(&session.tenant);

        match global.format {
            OutputFormat::Json | OutputFormat::Yaml => print_single(&report, global.format)?,
            _ => {
                println!(
                    "Examined {} instance(s): {} timed out, {} auto-approved",
                    style(report.examined).cyan(),
                    style(report.timed_out).cyan(),
                    style(report.auto_approved).cyan()
                );
                if report.conflicts > 0 {
                    println!(
                        "{} {} instance(s) changed during the sweep; run it again",
                        style("!").yellow(),
                        report.conflicts
                    );
                }
                for failure in &report.failures {
                    let id = failure
                        .instance_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{} {}: {}", style("✗").red(), id, failure.error);
                }
            }
        }
        Ok(())
    }
}
