//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid resize spec: {0}")]
    InvalidSpec(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied for {key}: {message}")]
    Access { key: String, message: String },

    #[error("Object store error for {key}: {message}")]
    Store { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    pub fn store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            key: key.into(),
            message: message.into(),
        }
    }

    /// The object key an error refers to, for store failures.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::NotFound(key) => Some(key),
            Self::Access { key, .. } | Self::Store { key, .. } => Some(key),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
