//! Error type shared by the library and the CLI.
//!
//! The schema compiler itself never fails: unresolvable references and
//! malformed merge input degrade locally. Everything here is raised either
//! while reading the source document or at the CLI boundary.

use std::path::PathBuf;

/// Errors surfaced by document loading, generation and the `sync` command.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    /// The document is not valid JSON or YAML.
    #[error("Failed to parse OpenAPI document: {0}")]
    Parse(String),

    /// The document uses a dialect we cannot compile, after conversion was attempted.
    #[error("Unsupported API description format: {0}")]
    UnsupportedFormat(String),

    /// Two operations resolve to the same identifier.
    #[error(
        "Duplicate operationId '{0}' detected. Each operation must have a unique identifier."
    )]
    DuplicateOperationId(String),

    /// Invalid combination of command-line flags.
    #[error("{0}")]
    Usage(String),

    /// The remote document could not be downloaded.
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Reading the spec or writing generated files failed.
    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML configuration file is invalid.
    #[error("Invalid config file {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl GenError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = GenError> = std::result::Result<T, E>;
