//! Mock adapters for testing
//!
//! Allows setting expected results for each operation and records every
//! call so tests can assert on what the session did.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::{AuthCodeProvider, AuthService, CredentialStore, TransferApi};
use crate::transfer::error::{AuthExchangeError, StoreError, TransferApiError};
use crate::transfer::types::{
    AuthorizationRequest, Credential, DirEntry, ScopeSet, TaskId, TokenData, TokenSet,
    TransferTask, TRANSFER_RESOURCE_SERVER,
};

/// Scripted outcome of a mocked transfer call
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// Listing succeeds / submission returns this task id
    Ok(String),
    ConsentRequired(ScopeSet),
    Api { status: u16, code: String },
}

impl MockOutcome {
    pub fn ok(task_id: &str) -> Self {
        MockOutcome::Ok(task_id.to_string())
    }

    pub fn consent(scopes: &[&str]) -> Self {
        MockOutcome::ConsentRequired(scopes.iter().copied().collect())
    }

    pub fn permission_denied() -> Self {
        MockOutcome::Api {
            status: 403,
            code: "PermissionDenied".to_string(),
        }
    }

    fn into_error(self) -> Option<TransferApiError> {
        match self {
            MockOutcome::Ok(_) => None,
            MockOutcome::ConsentRequired(scopes) => Some(TransferApiError::ConsentRequired { scopes }),
            MockOutcome::Api { status, code } => Some(TransferApiError::Api {
                status,
                message: format!("mock {}", code),
                code,
            }),
        }
    }
}

/// Mock auth service
///
/// Every exchange hands out `token-<n>` with the requested scopes granted.
pub struct MockAuthService {
    flows: Mutex<Vec<ScopeSet>>,
    exchanges: Mutex<Vec<String>>,
    reject: Mutex<bool>,
    resource_server: String,
}

impl MockAuthService {
    pub fn new() -> Self {
        Self {
            flows: Mutex::new(Vec::new()),
            exchanges: Mutex::new(Vec::new()),
            reject: Mutex::new(false),
            resource_server: TRANSFER_RESOURCE_SERVER.to_string(),
        }
    }

    /// Issue tokens for another resource server only
    pub fn for_resource_server(resource_server: &str) -> Self {
        Self {
            resource_server: resource_server.to_string(),
            ..Self::new()
        }
    }

    /// Make every exchange fail with `Rejected`
    pub fn set_reject(&self, reject: bool) {
        *self.reject.lock().unwrap() = reject;
    }

    /// Scopes passed to each `start_flow` call, in order
    pub fn flows(&self) -> Vec<ScopeSet> {
        self.flows.lock().unwrap().clone()
    }

    /// Codes passed to each `exchange_code` call, in order
    pub fn exchanges(&self) -> Vec<String> {
        self.exchanges.lock().unwrap().clone()
    }
}

impl Default for MockAuthService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthService for MockAuthService {
    fn start_flow(&self, scopes: &ScopeSet) -> Result<AuthorizationRequest, AuthExchangeError> {
        let mut flows = self.flows.lock().unwrap();
        flows.push(scopes.clone());
        Ok(AuthorizationRequest {
            url: format!("https://auth.example/authorize?flow={}", flows.len()),
            scopes: scopes.clone(),
            code_verifier: "verifier".to_string(),
        })
    }

    async fn exchange_code(
        &self,
        request: &AuthorizationRequest,
        code: &str,
    ) -> Result<TokenSet, AuthExchangeError> {
        let n = {
            let mut exchanges = self.exchanges.lock().unwrap();
            exchanges.push(code.to_string());
            exchanges.len()
        };
        log::debug!("[mock-auth] exchange_code({}) for {}", code, request.scopes);

        if *self.reject.lock().unwrap() {
            return Err(AuthExchangeError::Rejected {
                status: 401,
                message: "invalid_grant".to_string(),
            });
        }

        Ok(TokenSet::from_iter([TokenData {
            resource_server: self.resource_server.clone(),
            access_token: format!("token-{}", n),
            scope: request.scopes.to_scope_string(),
            token_type: "Bearer".to_string(),
            expires_at_seconds: Some(chrono::Utc::now().timestamp() + 3600),
            refresh_token: None,
        }]))
    }
}

/// Mock transfer service
pub struct MockTransferApi {
    name: String,
    /// Map of endpoint -> listing outcome
    list_results: Mutex<HashMap<String, MockOutcome>>,
    /// Scripted submission outcomes, consumed front to back
    submit_results: Mutex<VecDeque<MockOutcome>>,
    /// Used once the script runs out
    default_submit: Mutex<MockOutcome>,
    list_calls: Mutex<Vec<(String, String)>>,
    /// Access token used by each submission
    submit_calls: Mutex<Vec<String>>,
}

impl MockTransferApi {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            list_results: Mutex::new(HashMap::new()),
            submit_results: Mutex::new(VecDeque::new()),
            default_submit: Mutex::new(MockOutcome::ok("mock-task")),
            list_calls: Mutex::new(Vec::new()),
            submit_calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the listing outcome for an endpoint (default: success)
    pub fn set_list_result(&self, endpoint: &str, outcome: MockOutcome) {
        self.list_results
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), outcome);
    }

    /// Queue an outcome for the next submission
    pub fn push_submit_result(&self, outcome: MockOutcome) {
        self.submit_results.lock().unwrap().push_back(outcome);
    }

    pub fn set_default_submit(&self, outcome: MockOutcome) {
        *self.default_submit.lock().unwrap() = outcome;
    }

    pub fn list_calls(&self) -> Vec<(String, String)> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> Vec<String> {
        self.submit_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferApi for MockTransferApi {
    async fn list_path(
        &self,
        credential: &Credential,
        endpoint: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferApiError> {
        log::debug!("[{}] list_path({}, {})", self.name, endpoint, path);
        self.list_calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), credential.access_token.clone()));

        let outcome = self
            .list_results
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| MockOutcome::ok(""));
        match outcome.into_error() {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    async fn submit_transfer(
        &self,
        credential: &Credential,
        task: &TransferTask,
    ) -> Result<TaskId, TransferApiError> {
        log::debug!(
            "[{}] submit_transfer({} -> {}, {} items)",
            self.name,
            task.source_endpoint(),
            task.destination_endpoint(),
            task.items().len()
        );
        self.submit_calls
            .lock()
            .unwrap()
            .push(credential.access_token.clone());

        let outcome = self
            .submit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_submit.lock().unwrap().clone());
        match outcome {
            MockOutcome::Ok(task_id) => Ok(TaskId::new(task_id)),
            other => Err(other
                .into_error()
                .unwrap_or_else(|| TransferApiError::Decode("unreachable".to_string()))),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Hands out canned authorization codes
pub struct CannedCodeProvider {
    codes: Mutex<VecDeque<String>>,
    urls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl CannedCodeProvider {
    pub fn new(codes: &[&str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().map(|c| c.to_string()).collect()),
            urls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering, to exercise the prompt timeout
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs that were presented, in order
    pub fn presented_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthCodeProvider for CannedCodeProvider {
    async fn provide_code(&self, authorize_url: &str) -> Result<String, AuthExchangeError> {
        self.urls.lock().unwrap().push(authorize_url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .codes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "canned-code".to_string()))
    }
}

/// In-memory credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: Mutex<Option<TokenSet>>,
    writes: Mutex<usize>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `tokens`
    pub fn with_tokens(tokens: TokenSet) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
            writes: Mutex::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    pub fn tokens(&self) -> Option<TokenSet> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.tokens.lock().unwrap().is_some())
    }

    async fn load(&self, resource_server: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|t| t.get(resource_server))
            .map(TokenData::to_credential))
    }

    async fn store(&self, tokens: &TokenSet) -> Result<(), StoreError> {
        *self.tokens.lock().unwrap() = Some(tokens.clone());
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred() -> Credential {
        Credential::new(TRANSFER_RESOURCE_SERVER, "tok")
    }

    #[tokio::test]
    async fn test_mock_list_default_success() {
        let mock = MockTransferApi::new("test");
        let result = mock.list_path(&cred(), "ep", "/").await;
        assert!(result.is_ok());
        assert_eq!(mock.list_calls(), vec![("ep".to_string(), "tok".to_string())]);
    }

    #[tokio::test]
    async fn test_mock_submit_script_then_default() {
        let mock = MockTransferApi::new("test");
        mock.push_submit_result(MockOutcome::consent(&["s"]));
        mock.set_default_submit(MockOutcome::ok("abc"));

        let task = TransferTask::builder("a", "b").item("/x", "/y").build().unwrap();
        let first = mock.submit_transfer(&cred(), &task).await;
        assert!(first.unwrap_err().is_consent_required());

        let second = mock.submit_transfer(&cred(), &task).await.unwrap();
        assert_eq!(second, "abc");
    }

    #[tokio::test]
    async fn test_mock_auth_grants_requested_scopes() {
        let auth = MockAuthService::new();
        let req = auth.start_flow(&ScopeSet::from_iter(["s1"])).unwrap();
        let tokens = auth.exchange_code(&req, "c").await.unwrap();

        let cred = tokens.get(TRANSFER_RESOURCE_SERVER).unwrap().to_credential();
        assert_eq!(cred.access_token, "token-1");
        assert!(cred.scopes.contains("s1"));
    }

    #[tokio::test]
    async fn test_canned_codes_in_order() {
        let provider = CannedCodeProvider::new(&["one"]);
        assert_eq!(provider.provide_code("u1").await.unwrap(), "one");
        assert_eq!(provider.provide_code("u2").await.unwrap(), "canned-code");
        assert_eq!(provider.presented_urls(), vec!["u1", "u2"]);
    }
}
