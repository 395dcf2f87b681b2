//! Errors raised while building the generation collaborators.

use thiserror::Error;

/// Failure to assemble a collaborator at startup.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The prompt catalog file could not be read.
    #[error("failed to read prompt catalog {path}: {source}")]
    Io {
        /// The file that was read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The prompt catalog is not valid YAML of the expected shape.
    #[error("invalid prompt catalog: {0}")]
    Catalog(#[from] serde_yaml::Error),

    /// A template failed to compile.
    #[error("invalid prompt template '{name}': {message}")]
    Template {
        /// The template name.
        name: String,
        /// The compiler message.
        message: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
