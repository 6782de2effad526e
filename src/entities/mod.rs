//! Entity type definitions
//!
//! aprv works with the following records:
//!
//! **Authoring:**
//! - [`Template`] - Approval chain definition with ordered [`StepDef`]s
//! - [`ApprovalLine`] - Legacy routing line with JSON amount conditions
//! - [`Delegation`] - Time-boxed transfer of approval authority
//!
//! **Runtime:**
//! - [`Instance`] - One document's approval journey with its [`StepInstance`]s

pub mod delegation;
pub mod instance;
pub mod line;
pub mod template;

pub use delegation::{Delegation, DelegationType};
pub use instance::{
    ApprovalEvent, DocumentRef, EventAction, Instance, InstanceStatus, StepInstance, StepStatus,
};
pub use line::ApprovalLine;
pub use template::{ApprovalMethod, ApprovalType, ApproverType, StepDef, StepType, Template};
