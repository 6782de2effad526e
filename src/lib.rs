//! aprv: document approval workflow engine
//!
//! Routes business documents through tenant-scoped approval chains of
//! sequential and parallel steps, with delegation, timeouts and an audit
//! trail. Usable as a library or through the `aprv` command line.

pub mod cli;
pub mod core;
pub mod entities;
pub mod schema;
pub mod yaml;
