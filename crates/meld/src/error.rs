//! CLI error types.

use meld_config::ConfigError;
use meld_xml::{MeldError, ParseError};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Meld(#[from] MeldError),

    #[error("{0}")]
    Validation(String),
}
