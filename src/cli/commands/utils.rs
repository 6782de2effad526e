//! Shared utilities for CLI commands

use console::style;
use miette::{bail, IntoDiagnostic, Result};

use crate::cli::output::{effective_format, print_single};
use crate::cli::{OutputFormat, Session};
use crate::core::{EntityId, InstanceStatusReport, UserId};
use crate::entities::{Instance, InstanceStatus, StepStatus};

pub fn styled_status(status: InstanceStatus) -> String {
    let text = status.to_string();
    match status {
        InstanceStatus::Approved => style(text).green().to_string(),
        InstanceStatus::Rejected => style(text).red().to_string(),
        InstanceStatus::Cancelled => style(text).dim().to_string(),
        InstanceStatus::Pending | InstanceStatus::InProgress => style(text).yellow().to_string(),
    }
}

/// Print an instance after a transition
pub fn print_instance(instance: &Instance, format: OutputFormat) -> Result<()> {
    match effective_format(format, false) {
        OutputFormat::Id => println!("{}", instance.id),
        OutputFormat::Json | OutputFormat::Yaml => {
            print_single(&InstanceStatusReport::from(instance), format)?
        }
        _ => print_summary(instance),
    }
    Ok(())
}

fn print_summary(instance: &Instance) {
    println!(
        "{} {} {} [{}]",
        style(&instance.id).cyan(),
        instance.document.document_type,
        instance
            .document
            .document_no
            .as_deref()
            .unwrap_or(&instance.document.document_id),
        styled_status(instance.status)
    );
    if let Some(stage) = instance.current_step_order {
        for step in instance.stage_steps(stage).filter(|s| s.is_active()) {
            let approver = step
                .actual_approver()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "   {} {} waiting on {}",
                style("→").dim(),
                step.label(),
                style(approver).yellow()
            );
        }
    }
    if let Some(by) = &instance.final_approver {
        println!("   final approver: {}", by);
    }
}

/// Pick the step to act on: the explicit one, or the user's only open step
pub fn step_for_user(session: &Session, id: &EntityId, step: Option<u32>, user: &UserId) -> Result<u32> {
    if let Some(step) = step {
        return Ok(step);
    }
    let instance = session
        .service
        .get_instance(&session.tenant, id)
        .into_diagnostic()?;
    let mine: Vec<u32> = instance
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::InProgress && s.actual_approver() == Some(user))
        .map(|s| s.step_order)
        .collect();
    match mine.as_slice() {
        [only] => Ok(*only),
        [] => bail!("{} has no step waiting on {}; pass --step", id, user),
        _ => bail!("{} has several steps waiting on {}; pass --step", id, user),
    }
}
