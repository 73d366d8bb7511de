//! CLI error handling.

use thiserror::Error;

/// Errors surfaced to the CLI user with friendly messages.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] memograph::config::ConfigError),

    #[error("resource setup failed: {0}")]
    Resources(#[from] memograph::context::ResourceError),

    #[error("catalog error: {0}")]
    Catalog(#[from] memograph::catalog::CatalogError),

    #[error("remote error: {0}")]
    Remote(#[from] memograph::remote::RemoteError),

    #[error("request error: {0}")]
    Request(#[from] memograph::request::RequestError),
}
