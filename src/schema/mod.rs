//! JSON schemas, validation and scaffolds for authored records

pub mod loader;
pub mod registry;
pub mod scaffold;
pub mod validator;

pub use loader::{collect_paths, load_line_file, load_template_file, yaml_files};
pub use registry::SchemaRegistry;
pub use scaffold::{ScaffoldContext, ScaffoldError, ScaffoldGenerator};
pub use validator::SchemaValidator;
