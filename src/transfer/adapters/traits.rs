//! Collaborator traits
//!
//! Defines the interfaces the session talks to: the auth service, the
//! transfer service, the persisted credential store and the operator prompt.

use async_trait::async_trait;

use crate::transfer::error::{AuthExchangeError, StoreError, TransferApiError};
use crate::transfer::types::{
    AuthorizationRequest, Credential, DirEntry, ScopeSet, TaskId, TokenSet, TransferTask,
};

/// Authorization-code login against the auth service
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Start a login asking for `scopes` and build the URL the operator visits
    fn start_flow(&self, scopes: &ScopeSet) -> Result<AuthorizationRequest, AuthExchangeError>;

    /// Exchange the code the operator pasted for tokens
    ///
    /// Returns:
    /// - Ok: tokens keyed by resource server
    /// - Err(Rejected): the auth service refused the code
    async fn exchange_code(
        &self,
        request: &AuthorizationRequest,
        code: &str,
    ) -> Result<TokenSet, AuthExchangeError>;
}

/// Transfer service operations used by the session
#[async_trait]
pub trait TransferApi: Send + Sync {
    /// List `path` on `endpoint`
    ///
    /// Used as a harmless probe: a `ConsentRequired` error names the scopes
    /// the endpoint still needs.
    async fn list_path(
        &self,
        credential: &Credential,
        endpoint: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferApiError>;

    /// Submit one transfer task
    async fn submit_transfer(
        &self,
        credential: &Credential,
        task: &TransferTask,
    ) -> Result<TaskId, TransferApiError>;

    /// Get service name for logging
    fn name(&self) -> &str;
}

/// Persisted tokens, keyed by resource server
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether anything has been persisted yet
    async fn exists(&self) -> Result<bool, StoreError>;

    /// Load the credential for one resource server
    ///
    /// `Ok(None)` if the store exists but holds nothing for it.
    async fn load(&self, resource_server: &str) -> Result<Option<Credential>, StoreError>;

    /// Persist a full token set, replacing tokens of the same resource servers
    async fn store(&self, tokens: &TokenSet) -> Result<(), StoreError>;
}

/// Supplies the authorization code for a login URL
///
/// The production implementation asks the operator; tests hand out canned
/// codes.
#[async_trait]
pub trait AuthCodeProvider: Send + Sync {
    async fn provide_code(&self, authorize_url: &str) -> Result<String, AuthExchangeError>;
}
