//! `aprv template` command - Approval template management

use clap::{Args, Subcommand, ValueEnum};
use console::style;
use miette::{bail, miette, IntoDiagnostic, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::Tabled;

use crate::cli::helpers::{acting_user, truncate_str, Session};
use crate::cli::output::{print_rows, print_single, print_success, print_warning};
use crate::cli::GlobalOpts;
use crate::core::{Config, Project, TenantId};
use crate::entities::Template;
use crate::schema::{collect_paths, load_template_file, ScaffoldContext, ScaffoldGenerator, SchemaValidator};

#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// Validate template files and store them
    Import(ImportArgs),

    /// List stored templates
    List,

    /// Show a stored template
    Show(ShowArgs),

    /// Check template files without storing them
    Validate(ImportArgs),

    /// Write a starter template file
    New(NewArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Files or directories (defaults to templates/)
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Template code
    pub code: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ApprovalTypeArg {
    Sequential,
    Parallel,
    Hybrid,
}

impl ApprovalTypeArg {
    fn as_str(&self) -> &'static str {
        match self {
            ApprovalTypeArg::Sequential => "sequential",
            ApprovalTypeArg::Parallel => "parallel",
            ApprovalTypeArg::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Template code, unique per tenant
    pub code: String,

    /// Display name
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Document type the template applies to
    #[arg(long, short = 'd', default_value = "purchase_order")]
    pub document_type: String,

    #[arg(long, value_enum, default_value_t = ApprovalTypeArg::Sequential)]
    pub approval_type: ApprovalTypeArg,

    /// Mark as the default template for the document type
    #[arg(long)]
    pub default: bool,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct TemplateRow {
    #[tabled(rename = "CODE")]
    code: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "DOC TYPE")]
    document_type: String,
    #[tabled(rename = "TYPE")]
    approval_type: String,
    #[tabled(rename = "STEPS")]
    steps: usize,
    #[tabled(rename = "PRIO")]
    priority: i32,
    #[tabled(rename = "DEFAULT")]
    is_default: bool,
    #[tabled(rename = "ACTIVE")]
    is_active: bool,
    #[tabled(rename = "REV")]
    revision: u32,
}

impl From<&Template> for TemplateRow {
    fn from(t: &Template) -> Self {
        Self {
            code: t.code.clone(),
            name: truncate_str(&t.name, 32),
            document_type: t.document_type.clone(),
            approval_type: t.approval_type.to_string(),
            steps: t.steps.len(),
            priority: t.priority,
            is_default: t.is_default,
            is_active: t.is_active,
            revision: t.revision,
        }
    }
}

pub fn run(cmd: TemplateCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        TemplateCommands::Import(args) => run_import(args, global),
        TemplateCommands::List => run_list(global),
        TemplateCommands::Show(args) => run_show(args, global),
        TemplateCommands::Validate(args) => run_validate(args),
        TemplateCommands::New(args) => run_new(args, global),
    }
}

fn template_paths(paths: &[PathBuf], project: &Project) -> Vec<PathBuf> {
    if paths.is_empty() {
        collect_paths(&[project.templates_dir()])
    } else {
        collect_paths(paths)
    }
}

fn run_import(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let validator = SchemaValidator::new();
    let paths = template_paths(&args.paths, &session.project);
    if paths.is_empty() {
        bail!("No template files found");
    }

    let mut failed = 0;
    for path in &paths {
        let template = match load_template_file(&validator, path) {
            Ok(template) => template,
            Err(e) => {
                failed += 1;
                eprintln!("{:?}", miette::Report::new(e));
                continue;
            }
        };
        match session.service.save_template(&template) {
            Ok(stored) => print_success(&format!(
                "{} {} (revision {})",
                style(&stored.code).cyan(),
                stored.name,
                stored.revision
            )),
            Err(e) => {
                failed += 1;
                print_warning(&format!("{}: {}", path.display(), e));
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} template file(s) failed to import", failed, paths.len());
    }
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let mut templates = session.service.templates(&session.tenant).into_diagnostic()?;
    templates.sort_by(|a, b| a.document_type.cmp(&b.document_type).then(a.priority.cmp(&b.priority)));

    let rows: Vec<TemplateRow> = templates.iter().map(TemplateRow::from).collect();
    let ids: Vec<String> = templates.iter().map(|t| t.code.clone()).collect();
    print_rows(&rows, &ids, global.format, "No templates. Import some with `aprv template import`.")
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let template = session
        .service
        .templates(&session.tenant)
        .into_diagnostic()?
        .into_iter()
        .find(|t| t.code == args.code)
        .ok_or_else(|| miette!("No template with code '{}'", args.code))?;
    print_single(&template, global.format)
}

fn run_validate(args: ImportArgs) -> Result<()> {
    let project = Project::discover().into_diagnostic()?;
    let validator = SchemaValidator::new();
    let paths = template_paths(&args.paths, &project);

    let mut failed = 0;
    for path in &paths {
        let result = load_template_file(&validator, path)
            .map_err(miette::Report::new)
            .and_then(|t| t.validate().into_diagnostic().map(|_| t));
        match result {
            Ok(template) => print_success(&format!("{} ({})", path.display(), template.code)),
            Err(e) => {
                failed += 1;
                eprintln!("{:?}", e);
            }
        }
    }

    println!();
    println!(
        "{} file(s) checked, {} invalid",
        style(paths.len()).cyan(),
        style(failed).cyan()
    );
    if failed > 0 {
        bail!("{} template file(s) are invalid", failed);
    }
    Ok(())
}

/// File a scaffold would be written to
fn target_file(dir: &Path, code: &str) -> PathBuf {
    dir.join(format!("{}.yaml", code.to_lowercase()))
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let project = Project::discover().into_diagnostic()?;
    let config = Config::load(Some(&project));
    let tenant = global
        .tenant
        .clone()
        .or(config.tenant.clone())
        .ok_or_else(|| miette!("No tenant selected. Pass --tenant or set `tenant:` in .aprv/config.yaml"))?;
    let author = acting_user(global.as_user.as_deref(), config.user.as_deref(), std::env::var("USER").ok().as_deref())
        .map(|u| u.to_string())
        .unwrap_or_default();

    let path = target_file(&project.templates_dir(), &args.code);
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let generator = ScaffoldGenerator::new().into_diagnostic()?;
    let mut ctx = ScaffoldContext::new(TenantId::new(tenant), &args.code, author)
        .with_document_type(&args.document_type)
        .with_approval_type(args.approval_type.as_str())
        .as_default(args.default);
    if let Some(name) = &args.name {
        ctx = ctx.with_name(name);
    }
    let yaml = generator.generate_template(&ctx).into_diagnostic()?;

    fs::create_dir_all(project.templates_dir()).into_diagnostic()?;
    fs::write(&path, yaml).into_diagnostic()?;
    print_success(&format!("Created template {}", style(&args.code).cyan()));
    println!("   {}", style(path.display()).dim());
    Ok(())
}
