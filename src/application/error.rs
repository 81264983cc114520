use std::error::Error as StdError;

use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Failure chain of an error, outermost first, for diagnostics.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

/// Failures surfaced by the post store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to load posts")]
    Fetch(#[source] RepoError),
    #[error("failed to save post")]
    Write(#[source] RepoError),
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("sign in before writing posts")]
    Unauthenticated,
    #[error("post `{0}` not found")]
    NotFound(String),
}

impl StoreError {
    /// Message suitable for showing to the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Fetch(_) => {
                "Posts could not be loaded. Please try again.".to_string()
            }
            StoreError::Write(_) => {
                "The post could not be saved. Please try again.".to_string()
            }
            StoreError::Validation(DomainError::Validation { field, message }) => {
                format!("Check `{field}`: {message}.")
            }
            StoreError::Validation(other) => other.to_string(),
            StoreError::Unauthenticated => "Please sign in first.".to_string(),
            StoreError::NotFound(_) => "Post not found.".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("sign in first (run `defter sign-in`)")]
    SignInRequired,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn presentation_message(&self) -> String {
        match self {
            AppError::Store(err) => err.user_message(),
            AppError::Domain(err) => err.to_string(),
            AppError::Repo(RepoError::Unauthorized(_)) => {
                "The backend rejected the credentials.".to_string()
            }
            AppError::Repo(_) => "The backend could not be reached.".to_string(),
            AppError::Infra(InfraError::Configuration { .. }) => {
                "defter is misconfigured.".to_string()
            }
            AppError::Infra(_) => "A local I/O operation failed.".to_string(),
            AppError::SignInRequired | AppError::Validation(_) | AppError::Unexpected(_) => {
                self.to_string()
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}
