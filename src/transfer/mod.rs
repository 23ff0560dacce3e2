//! Transfer module - main module file
//!
//! This module provides the consent-aware transfer session with its state
//! machine, typed errors and service adapters.

pub mod state;
pub mod types;
pub mod error;
pub mod session;
pub mod adapters;

// Re-export commonly used types
pub use state::SessionState;
pub use types::{Credential, ScopeSet, TaskId, TokenSet, TransferItem, TransferTask};
pub use error::{AuthExchangeError, SessionError, StoreError, TransferApiError};
pub use session::ConsentAwareTransferSession;
