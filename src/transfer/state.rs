//! Session State Machine
//!
//! Defines the states, events, and transition function of one
//! consent-aware transfer run.

use serde::{Deserialize, Serialize};

/// Session FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No credential yet
    Unauthenticated,
    /// Holding a credential, endpoints not yet probed
    Authenticated,
    /// Probes found nothing missing
    Probed,
    /// A new credential was requested for missing consents
    ConsentEscalated,
    /// Task accepted by the transfer service
    Submitted,
    /// Run aborted with an error
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticated => "authenticated",
            SessionState::Probed => "probed",
            SessionState::ConsentEscalated => "consent_escalated",
            SessionState::Submitted => "submitted",
            SessionState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Submitted | SessionState::Failed)
    }

    /// States from which a submission may be attempted
    pub fn can_submit(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticated | SessionState::Probed | SessionState::ConsentEscalated
        )
    }
}

/// FSM Events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A credential was loaded or obtained through login
    CredentialAcquired,
    /// Both endpoints probed, no additional scopes needed
    ProbesClean,
    /// A probe or a submission reported missing consent
    ConsentRequired,
    /// Task submitted
    SubmitOk,
    /// Submission failed for good
    SubmitFailed,
    /// Login or code exchange failed
    AuthFailed,
}

/// State transition function
///
/// Given the current state and an event, returns the next state.
/// Invalid transitions return the current state (no change).
pub fn transition(current: SessionState, event: SessionEvent) -> SessionState {
    use SessionEvent::*;
    use SessionState::*;

    match (current, event) {
        // From Unauthenticated
        (Unauthenticated, CredentialAcquired) => Authenticated,
        (Unauthenticated, AuthFailed) => Failed,

        // From Authenticated
        (Authenticated, ProbesClean) => Probed,
        (Authenticated, ConsentRequired) => ConsentEscalated,
        (Authenticated, SubmitOk) => Submitted,
        (Authenticated, SubmitFailed) => Failed,
        (Authenticated, AuthFailed) => Failed,

        // From Probed
        (Probed, ConsentRequired) => ConsentEscalated,
        (Probed, SubmitOk) => Submitted,
        (Probed, SubmitFailed) => Failed,

        // From ConsentEscalated: the new credential keeps us here until submit resolves
        (ConsentEscalated, CredentialAcquired) => ConsentEscalated,
        (ConsentEscalated, ConsentRequired) => ConsentEscalated,
        (ConsentEscalated, SubmitOk) => Submitted,
        (ConsentEscalated, SubmitFailed) => Failed,
        (ConsentEscalated, AuthFailed) => Failed,

        _ => current,
    }
}
