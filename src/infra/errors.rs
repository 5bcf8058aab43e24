// src/infra/errors.rs — Error types for Parley

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    // Startup errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Store errors (always recovered locally)
    #[error("Storage error at {}: {message}", path.display())]
    Storage { path: PathBuf, message: String },

    // Per-turn errors (recovered, loop continues)
    #[error("API request timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("API error from '{provider}': {message}")]
    Api { provider: String, message: String },

    // Session-ending errors
    #[error("Budget cap reached: ${spent:.2}/${cap:.2}")]
    BudgetExceeded { spent: f64, cap: f64 },

    #[error("Request cancelled by shutdown")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ParleyError {
    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ParleyError::Storage {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ParleyError::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for errors after which the session loop must not accept another prompt.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            ParleyError::BudgetExceeded { .. } | ParleyError::Cancelled
        )
    }
}
