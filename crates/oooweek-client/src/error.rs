//! Client error types.

use oooweek_providers::google::AuthError;
use oooweek_providers::{ProviderError, StoreError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that end a run. The message names the stage that failed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad configuration, flags or registration input.
    #[error("configuration error: {0}")]
    Config(String),
    /// The authorization flow failed.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),
    /// The calendar API call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    /// Reading or writing a stored secret failed.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),
}
