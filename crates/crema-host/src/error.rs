// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the embedding layer

use crema_engine::JsErrorCode;
use thiserror::Error;

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Error returned by module loaders and module default exports.
///
/// Its message ends up inside the script exception raised for the import.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the embedding layer
#[derive(Debug, Error)]
pub enum HostError {
    /// The engine rejected a call
    #[error("engine error: {0}")]
    Engine(#[from] JsErrorCode),

    /// Script threw; the exception is still pending on the context
    #[error("{message}")]
    Script {
        /// String form of the thrown value
        message: String,
    },

    /// A scope is already open on this thread
    #[error("an execution scope is already active on this thread")]
    ScopeActive,

    /// The object was disposed
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    /// A module graph did not finish loading
    #[error("module '{0}' is not ready")]
    ModuleNotReady(String),

    /// A loader failed outside of script
    #[error("Error loading module '{module}': {reason}")]
    Loader {
        /// Module name
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// File system error
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,
}

impl HostError {
    /// Create a loader error
    pub fn loader(module: impl Into<String>, reason: impl ToString) -> Self {
        Self::Loader {
            module: module.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for HostError {
    fn from(err: toml::de::Error) -> Self {
        HostError::Config(err.to_string())
    }
}
