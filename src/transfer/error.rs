//! Error types for the transfer session

use std::time::Duration;

use thiserror::Error;

use crate::transfer::state::SessionState;
use crate::transfer::types::ScopeSet;

/// Credential exchange failures. Fatal to the session.
#[derive(Debug, Error)]
pub enum AuthExchangeError {
    #[error("authorization code exchange rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("token response has no token for resource server {0}")]
    MissingResourceServer(String),

    #[error("no authorization code was entered")]
    EmptyCode,

    #[error("timed out after {0:?} waiting for an authorization code")]
    Timeout(Duration),

    #[error("failed to read authorization code: {0}")]
    Prompt(#[from] std::io::Error),

    #[error("auth service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid auth service url: {0}")]
    Url(#[from] url::ParseError),
}

/// Failures reported by the transfer service
#[derive(Debug, Error)]
pub enum TransferApiError {
    /// The credential lacks scopes needed for this endpoint. Recoverable by
    /// logging in again with `scopes`.
    #[error("consent required for scopes {scopes}")]
    ConsentRequired { scopes: ScopeSet },

    /// Any other API error document (permission denied, not found, ...)
    #[error("transfer API error {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transfer service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected transfer service response: {0}")]
    Decode(String),
}

impl TransferApiError {
    /// The scopes to request when this is a consent-required failure
    pub fn consent_required(&self) -> Option<&ScopeSet> {
        match self {
            TransferApiError::ConsentRequired { scopes } => Some(scopes),
            _ => None,
        }
    }

    pub fn is_consent_required(&self) -> bool {
        self.consent_required().is_some()
    }
}

/// Persisted credential store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("token store is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported token store format version {0}")]
    FormatVersion(String),
}

/// Errors surfaced by `ConsentAwareTransferSession`
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthExchangeError),

    #[error(transparent)]
    Transfer(#[from] TransferApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no credential has been acquired yet")]
    NotAuthenticated,

    #[error("cannot {action} while the session is {}", .state.as_str())]
    InvalidState {
        state: SessionState,
        action: &'static str,
    },
}

impl SessionError {
    pub fn as_transfer(&self) -> Option<&TransferApiError> {
        match self {
            SessionError::Transfer(e) => Some(e),
            _ => None,
        }
    }
}
