//! Core module - approval engine and its collaborators

pub mod clock;
pub mod config;
pub mod delegation;
pub mod error;
pub mod factory;
pub mod identity;
pub mod instance;
pub mod notify;
pub mod project;
pub mod resolver;
pub mod service;
pub mod step;
pub mod store;
pub mod sweeper;
pub mod team;
pub mod template_resolver;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, EngineConfig, NotificationConfig};
pub use delegation::DelegationRegistry;
pub use error::{ApprovalError, Result};
pub use factory::{ApprovalRequest, InstanceFactory};
pub use identity::{EntityId, EntityPrefix, IdParseError, TenantId, UserId};
pub use instance::InstanceEngine;
pub use notify::{LogNotifier, Notification, NotificationKind, Notifier, RecordingNotifier};
pub use project::{Project, ProjectError};
pub use resolver::{ApproverResolver, ResolutionContext, ResolvedApprover};
pub use service::{ApprovalService, InstanceStatusReport, PendingStep, UnresolvedStep};
pub use step::{GroupOutcome, StepEngine, TimeoutOutcome};
pub use store::{ApprovalStore, MemoryStore, SqliteStore};
pub use sweeper::{SweepReport, TimeoutSweeper};
pub use team::{Directory, TeamMember, TeamRoster};
pub use template_resolver::{Selection, TemplateQuery, TemplateResolver};
