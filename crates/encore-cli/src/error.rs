use std::io;

use encore_core::ClassifiedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] encore_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{} ({:?})", .0.message, .0.class)]
    Rejected(ClassifiedError),
    #[error("Request ID cannot be empty")]
    EmptyRequestId,
    #[error("Request not found for id/prefix: {0}")]
    RequestNotFound(String),
    #[error("{0}")]
    AmbiguousRequestId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Backend is not configured. Run `encore config init --supabase-url <URL> --supabase-anon-key <KEY>`, or set SUPABASE_URL and SUPABASE_ANON_KEY."
    )]
    BackendNotConfigured,
}
