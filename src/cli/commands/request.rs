//! `aprv request` command - Request approval of a document

use clap::Args;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::utils::print_instance;
use crate::cli::{GlobalOpts, Session};
use crate::core::ApprovalRequest;
use crate::entities::DocumentRef;

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Document type, e.g. purchase_order
    pub document_type: String,

    /// Identifier of the document in its producing system
    pub document_id: String,

    /// Human-facing document number
    #[arg(long = "no")]
    pub document_no: Option<String>,

    #[arg(long)]
    pub title: Option<String>,

    /// Document amount, used for routing and auto-approval
    #[arg(long)]
    pub amount: Option<f64>,

    /// Requester's department (defaults to the roster entry)
    #[arg(long)]
    pub department: Option<String>,

    /// Create the instance but leave it pending
    #[arg(long)]
    pub no_start: bool,
}

impl RequestArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let session = Session::open(global)?;

        let document = DocumentRef {
            document_type: self.document_type.clone(),
            document_id: self.document_id.clone(),
            document_no: self.document_no.clone(),
            title: self.title.clone(),
            amount: self.amount,
        };
        let requester = session.user()?.clone();
        let mut request = ApprovalRequest::new(session.tenant.clone(), document, requester);
        if let Some(department) = self.department.clone().or_else(|| session.department_of_user()) {
            request = request.from_department(department);
        }

        let instance = if self.no_start {
            session.service.create_instance(&request)
        } else {
            session.service.request_approval(&request)
        }
        .into_diagnostic()?;

        print_instance(&instance, global.format)
    }
}
