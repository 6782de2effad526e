//! `aprv line` command - Legacy approval line management

use clap::{Args, Subcommand};
use console::style;
use miette::{bail, miette, IntoDiagnostic, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tabled::Tabled;

use crate::cli::helpers::{acting_user, Session};
use crate::cli::output::{print_rows, print_success, print_warning};
use crate::cli::GlobalOpts;
use crate::core::{Config, Project, TenantId};
use crate::entities::ApprovalLine;
use crate::schema::{collect_paths, load_line_file, ScaffoldContext, ScaffoldGenerator, SchemaValidator};

#[derive(Subcommand, Debug)]
pub enum LineCommands {
    /// Validate line files and store them
    Import(ImportArgs),

    /// List stored lines
    List,

    /// Write a starter line file
    New(NewArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Files or directories (defaults to lines/)
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Line code, unique per tenant
    pub code: String,

    /// Template the line routes to
    #[arg(long, short = 't')]
    pub template: String,

    #[arg(long, short = 'd', default_value = "purchase_order")]
    pub document_type: String,

    /// Only route requests from this department
    #[arg(long)]
    pub department: Option<String>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

fn bound(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Serialize, Tabled)]
struct LineRow {
    #[tabled(rename = "CODE")]
    code: String,
    #[tabled(rename = "DOC TYPE")]
    document_type: String,
    #[tabled(rename = "DEPARTMENT")]
    department: String,
    #[tabled(rename = "TEMPLATE")]
    template_code: String,
    #[tabled(rename = "MIN")]
    min_amount: String,
    #[tabled(rename = "MAX")]
    max_amount: String,
    #[tabled(rename = "PRIO")]
    priority: i32,
    #[tabled(rename = "ACTIVE")]
    is_active: bool,
}

impl From<&ApprovalLine> for LineRow {
    fn from(l: &ApprovalLine) -> Self {
        Self {
            code: l.code.clone(),
            document_type: l.document_type.clone(),
            department: l.department.clone().unwrap_or_else(|| "*".to_string()),
            template_code: l.template_code.clone(),
            min_amount: bound(l.min_amount()),
            max_amount: bound(l.max_amount()),
            priority: l.priority,
            is_active: l.is_active,
        }
    }
}

pub fn run(cmd: LineCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        LineCommands::Import(args) => run_import(args, global),
        LineCommands::List => run_list(global),
        LineCommands::New(args) => run_new(args, global),
    }
}

fn run_import(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let validator = SchemaValidator::new();
    let paths = if args.paths.is_empty() {
        collect_paths(&[session.project.lines_dir()])
    } else {
        collect_paths(&args.paths)
    };
    if paths.is_empty() {
        bail!("No line files found");
    }

    let known: Vec<String> = session
        .service
        .templates(&session.tenant)
        .into_diagnostic()?
        .into_iter()
        .map(|t| t.code)
        .collect();

    let mut failed = 0;
    for path in &paths {
        let line = match load_line_file(&validator, path) {
            Ok(line) => line,
            Err(e) => {
                failed += 1;
                eprintln!("{:?}", miette::Report::new(e));
                continue;
            }
        };
        if line.tenant == session.tenant && !known.contains(&line.template_code) {
            print_warning(&format!(
                "{} routes to unknown template '{}' and will be ignored until it is imported",
                line.code, line.template_code
            ));
        }
        match session.service.save_line(&line) {
            Ok(()) => print_success(&format!(
                "{} → {}",
                style(&line.code).cyan(),
                line.template_code
            )),
            Err(e) => {
                failed += 1;
                print_warning(&format!("{}: {}", path.display(), e));
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} line file(s) failed to import", failed, paths.len());
    }
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let mut lines = session.service.lines(&session.tenant).into_diagnostic()?;
    lines.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.code.cmp(&b.code)));

    let rows: Vec<LineRow> = lines.iter().map(LineRow::from).collect();
    let ids: Vec<String> = lines.iter().map(|l| l.code.clone()).collect();
    print_rows(&rows, &ids, global.format, "No approval lines.")
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().into_diagnostic()?;
    let config = Config::load(Some(&project));
    let tenant = global
        .tenant
        .clone()
        .or(config.tenant.clone())
        .ok_or_else(|| miette!("No tenant selected. Pass --tenant or set `tenant:` in .aprv/config.yaml"))?;
    let author = acting_user(global.as_user.as_deref(), config.user.as_deref(), None)
        .map(|u| u.to_string())
        .unwrap_or_default();

    let path = project.lines_dir().join(format!("{}.yaml", args.code.to_lowercase()));
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let generator = ScaffoldGenerator::new().into_diagnostic()?;
    let ctx = ScaffoldContext::new(TenantId::new(tenant), &args.code, author)
        .with_document_type(&args.document_type)
        .with_template_code(&args.template)
        .with_department(args.department.clone());
    let yaml = generator.generate_line(&ctx).into_diagnostic()?;

    fs::create_dir_all(project.lines_dir()).into_diagnostic()?;
    fs::write(&path, yaml).into_diagnostic()?;
    print_success(&format!("Created line {}", style(&args.code).cyan()));
    println!("   {}", style(path.display()).dim());
    Ok(())
}
