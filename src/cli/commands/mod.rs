//! Command implementations

pub mod approve;
pub mod cancel;
pub mod completions;
pub mod delegation;
pub mod history;
pub mod init;
pub mod line;
pub mod pending;
pub mod reject;
pub mod request;
pub mod skip;
pub mod start;
pub mod status;
pub mod sweep;
pub mod template;
pub mod unresolved;
pub mod utils;
