pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    IgnoreDefinition, Manifest, Metadata, ProjectionDefinition, ValidationError, ValidationIssue,
};

/// Manifest file name looked up when none is given.
pub const DEFAULT_MANIFEST: &str = "projected-source.toml";
