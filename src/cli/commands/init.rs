//! `aprv init` command - Create a project

use clap::Args;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::PathBuf;

use crate::cli::GlobalOpts;
use crate::core::config::CONFIG_FILE;
use crate::core::{Config, Project, SqliteStore};

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to initialize (defaults to the current directory)
    pub path: Option<PathBuf>,

    /// Re-create missing files in an existing project
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let root = match &self.path {
            Some(path) => path.clone(),
            None => std::env::current_dir().into_diagnostic()?,
        };
        fs::create_dir_all(&root).into_diagnostic()?;

        let project = Project::init(&root, self.force).into_diagnostic()?;

        if let Some(tenant) = &global.tenant {
            let path = project.aprv_dir().join(CONFIG_FILE);
            let content = fs::read_to_string(&path).into_diagnostic()?;
            let content = content.replacen("# tenant: acme", &format!("tenant: {}", tenant), 1);
            fs::write(&path, content).into_diagnostic()?;
        }

        let config = Config::load(Some(&project));
        let db = config.database_path(&project);
        SqliteStore::open(&db).into_diagnostic()?;

        println!(
            "{} Initialized aprv project in {}",
            style("✓").green(),
            style(project.root().display()).cyan()
        );
        println!("   {}", style(db.display()).dim());
        println!();
        println!("Next steps:");
        println!("  1. List approvers in {}", style("team.yaml").yellow());
        println!("  2. {}", style("aprv template new PO-STD --document-type purchase_order").yellow());
        println!("  3. {}", style("aprv template import").yellow());
        Ok(())
    }
}
