//! `aprv status` command - Instance status, or a filtered instance list

use chrono::{DateTime, Utc};
use clap::Args;
use console::style;
use miette::{bail, IntoDiagnostic, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::commands::utils::styled_status;
use crate::cli::helpers::{parse_instance_id, truncate_str};
use crate::cli::output::{effective_format, print_rows, print_single};
use crate::cli::{GlobalOpts, OutputFormat, Session, StatusFilter};
use crate::core::InstanceStatusReport;
use crate::entities::Instance;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Instance ID (omit to list instances)
    pub id: Option<String>,

    /// Look the instance up by document instead: TYPE ID
    #[arg(long, num_args = 2, value_names = ["TYPE", "ID"], conflicts_with = "id")]
    pub document: Option<Vec<String>>,

    /// Status filter for the list
    #[arg(long, short = 's', value_enum, default_value_t = StatusFilter::Open)]
    pub status: StatusFilter,
}

#[derive(Debug, Serialize, Tabled)]
struct InstanceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "DOC TYPE")]
    document_type: String,
    #[tabled(rename = "DOCUMENT")]
    document: String,
    #[tabled(rename = "TEMPLATE")]
    template_code: String,
    #[tabled(rename = "REQUESTER")]
    requester: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PROGRESS")]
    progress: String,
    #[tabled(rename = "CREATED")]
    created_at: DateTime<Utc>,
}

impl From<&Instance> for InstanceRow {
    fn from(inst: &Instance) -> Self {
        Self {
            id: inst.id.to_string(),
            document_type: inst.document.document_type.clone(),
            document: truncate_str(
                inst.document.document_no.as_deref().unwrap_or(&inst.document.document_id),
                24,
            ),
            template_code: inst.template_code.clone(),
            requester: inst.requester_id.to_string(),
            status: inst.status.to_string(),
            progress: format!("{:.0}%", inst.progress_percentage()),
            created_at: inst.created_at,
        }
    }
}

impl StatusArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;

        let instance = match (&self.id, &self.document) {
            (Some(id), _) => {
                let id = parse_instance_id(id)?;
                session.service.get_instance(&session.tenant, &id).into_diagnostic()?
            }
            (None, Some(doc)) => {
                let (doc_type, doc_id) = match doc.as_slice() {
                    [t, i] => (t.as_str(), i.as_str()),
                    _ => bail!("--document takes TYPE and ID"),
                };
                match session
                    .service
                    .find_instance_for_document(&session.tenant, doc_type, doc_id)
                    .into_diagnostic()?
                {
                    Some(instance) => instance,
                    None => bail!("No approval instance for {} {}", doc_type, doc_id),
                }
            }
            (None, None) => return self.run_list(&session, global.format),
        };

        let report = InstanceStatusReport::from(&instance);
        match effective_format(global.format, false) {
            OutputFormat::Yaml | OutputFormat::Json => print_single(&report, global.format),
            OutputFormat::Id => {
                println!("{}", report.id);
                Ok(())
            }
            _ => {
                print_report(&report);
                Ok(())
            }
        }
    }

    fn run_list(&self, session: &Session, format: OutputFormat) -> Result<()> {
        let mut instances: Vec<Instance> = session
            .service
            .list_instances(&session.tenant)
            .into_diagnostic()?
            .into_iter()
            .filter(|i| self.status.matches(i.status))
            .collect();
        instances.sort_by_key(|i| i.created_at);

        let rows: Vec<InstanceRow> = instances.iter().map(InstanceRow::from).collect();
        let ids: Vec<String> = instances.iter().map(|i| i.id.to_string()).collect();
        print_rows(&rows, &ids, format, &format!("No {} instances.", self.status))
    }
}

fn print_report(report: &InstanceStatusReport) {
    println!("{}", style(&report.id).cyan().bold());
    println!("{}", style("─".repeat(60)).dim());
    println!(
        "Document:  {} {}",
        report.document.document_type,
        report
            .document
            .document_no
            .as_deref()
            .unwrap_or(&report.document.document_id)
    );
    if let Some(title) = &report.document.title {
        println!("Title:     {}", title);
    }
    if let Some(amount) = report.document.amount {
        println!("Amount:    {}", amount);
    }
    println!("Template:  {}", report.template_code);
    println!("Requester: {}", report.requester_id);
    println!("Status:    {}", styled_status(report.status));
    println!("Progress:  {:.0}%", report.progress);
    if let Some(by) = &report.final_approver {
        println!("Decided:   {}", by);
    }
    println!();
    for step in &report.steps {
        let marker = if Some(step.step_order) == report.current_step_order {
            style("▶").yellow().to_string()
        } else {
            " ".to_string()
        };
        let approver = match (&step.approver, &step.delegated_to) {
            (Some(nominal), Some(delegate)) => format!("{} (for {})", delegate, nominal),
            (Some(nominal), None) => nominal.to_string(),
            (None, _) => "-".to_string(),
        };
        println!(
            "{} {:>3}  {:<24} {:<12} {}",
            marker,
            step.step_order,
            truncate_str(&step.name, 24),
            step.status.to_string(),
            approver
        );
        if let Some(comment) = &step.comment {
            println!("        {}", style(comment).dim());
        }
    }
}
