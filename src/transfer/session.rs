//! Consent-aware transfer session
//!
//! Owns the credential for one run: logs in (or reuses a stored token),
//! probes the endpoints for missing consents, logs in again when needed and
//! submits the task with a single retry on `ConsentRequired`.

use std::sync::Arc;
use std::time::Duration;

use crate::transfer::adapters::{AuthCodeProvider, AuthService, CredentialStore, TransferApi};
use crate::transfer::error::{AuthExchangeError, SessionError, TransferApiError};
use crate::transfer::state::{transition, SessionEvent, SessionState};
use crate::transfer::types::{
    Credential, ScopeSet, TaskId, TokenData, TransferTask, TRANSFER_RESOURCE_SERVER,
};

pub const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(300);

/// Root path listed when probing an endpoint
const PROBE_PATH: &str = "/";

pub struct ConsentAwareTransferSession {
    auth: Arc<dyn AuthService>,
    transfer: Arc<dyn TransferApi>,
    code_provider: Arc<dyn AuthCodeProvider>,
    store: Option<Arc<dyn CredentialStore>>,
    code_timeout: Duration,
    credential: Option<Credential>,
    state: SessionState,
}

impl ConsentAwareTransferSession {
    pub fn new(
        auth: Arc<dyn AuthService>,
        transfer: Arc<dyn TransferApi>,
        code_provider: Arc<dyn AuthCodeProvider>,
    ) -> Self {
        Self {
            auth,
            transfer,
            code_provider,
            store: None,
            code_timeout: DEFAULT_CODE_TIMEOUT,
            credential: None,
            state: SessionState::Unauthenticated,
        }
    }

    /// Load tokens from and save tokens to `store`
    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Upper bound on waiting for the operator's authorization code
    pub fn with_code_timeout(mut self, timeout: Duration) -> Self {
        self.code_timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    fn apply(&mut self, event: SessionEvent) {
        let next = transition(self.state, event);
        if next != self.state {
            log::debug!(
                "Session {} -> {} on {:?}",
                self.state.as_str(),
                next.as_str(),
                event
            );
        }
        self.state = next;
    }

    /// Log in with the transfer service's full scope
    pub async fn acquire_default_credential(&mut self) -> Result<&Credential, SessionError> {
        self.acquire_credential(&ScopeSet::transfer_all()).await
    }

    /// Get a credential carrying `scopes` and make it the session's credential
    ///
    /// A stored credential is reused when it is unexpired and already
    /// grants `scopes`; otherwise the operator goes through a login.
    pub async fn acquire_credential(
        &mut self,
        scopes: &ScopeSet,
    ) -> Result<&Credential, SessionError> {
        match self.obtain_credential(scopes).await {
            Ok(credential) => {
                self.apply(SessionEvent::CredentialAcquired);
                let credential: &Credential = self.credential.insert(credential);
                Ok(credential)
            }
            Err(e) => {
                log::error!("Failed to acquire credential for {}: {}", scopes, e);
                self.apply(SessionEvent::AuthFailed);
                Err(e)
            }
        }
    }

    async fn obtain_credential(&self, scopes: &ScopeSet) -> Result<Credential, SessionError> {
        if let Some(store) = &self.store {
            if store.exists().await? {
                match store.load(TRANSFER_RESOURCE_SERVER).await? {
                    Some(credential) if credential.satisfies(scopes) => {
                        log::info!("Using stored credential for {}", TRANSFER_RESOURCE_SERVER);
                        return Ok(credential);
                    }
                    Some(_) => log::info!(
                        "Stored credential is expired or does not grant {}, logging in",
                        scopes
                    ),
                    None => log::info!(
                        "Token store has nothing for {}, logging in",
                        TRANSFER_RESOURCE_SERVER
                    ),
                }
            }
        }

        let request = self.auth.start_flow(scopes)?;
        let code = tokio::time::timeout(
            self.code_timeout,
            self.code_provider.provide_code(&request.url),
        )
        .await
        .map_err(|_| AuthExchangeError::Timeout(self.code_timeout))??;

        let tokens = self.auth.exchange_code(&request, &code).await?;
        let credential = tokens
            .get(TRANSFER_RESOURCE_SERVER)
            .map(TokenData::to_credential)
            .ok_or_else(|| {
                AuthExchangeError::MissingResourceServer(TRANSFER_RESOURCE_SERVER.to_string())
            })?;

        if let Some(store) = &self.store {
            store.store(&tokens).await?;
        }
        Ok(credential)
    }

    /// Scopes `endpoint` still needs before it can be used
    ///
    /// Lists the endpoint root. Only `ConsentRequired` is reported; any other
    /// failure (permission denied, not found, network) yields an empty set.
    pub async fn probe_consent(&self, endpoint: &str) -> Result<ScopeSet, SessionError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(SessionError::NotAuthenticated)?;

        match self.transfer.list_path(credential, endpoint, PROBE_PATH).await {
            Ok(_) => Ok(ScopeSet::new()),
            Err(TransferApiError::ConsentRequired { scopes }) => {
                log::info!("Endpoint {} requires consent for {}", endpoint, scopes);
                Ok(scopes)
            }
            Err(e) => {
                log::warn!("Ignoring probe failure on endpoint {}: {}", endpoint, e);
                Ok(ScopeSet::new())
            }
        }
    }

    /// Probe every endpoint and log in again with the union of missing scopes
    ///
    /// Returns the scopes that triggered the new login (empty if none).
    pub async fn ensure_consents(&mut self, endpoints: &[&str]) -> Result<ScopeSet, SessionError> {
        let mut required = ScopeSet::new();
        for endpoint in endpoints {
            let missing = self.probe_consent(endpoint).await?;
            required.extend(&missing);
        }

        if required.is_empty() {
            self.apply(SessionEvent::ProbesClean);
            return Ok(required);
        }

        log::warn!(
            "One of the endpoints requires consent, logging in again to grant {}",
            required
        );
        self.apply(SessionEvent::ConsentRequired);
        self.acquire_credential(&required).await?;
        Ok(required)
    }

    async fn try_submit(&self, task: &TransferTask) -> Result<TaskId, SessionError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(SessionError::NotAuthenticated)?;
        Ok(self.transfer.submit_transfer(credential, task).await?)
    }

    /// Submit `task`, retrying once after a consent-driven login
    pub async fn submit(&mut self, task: &TransferTask) -> Result<TaskId, SessionError> {
        if !self.state.can_submit() {
            return Err(SessionError::InvalidState {
                state: self.state,
                action: "submit",
            });
        }

        let result = match self.try_submit(task).await {
            Err(SessionError::Transfer(TransferApiError::ConsentRequired { scopes })) => {
                log::warn!(
                    "Submission to {} requires consent for {}, logging in again",
                    self.transfer.name(),
                    scopes
                );
                self.apply(SessionEvent::ConsentRequired);
                self.acquire_credential(&scopes).await?;
                self.try_submit(task).await
            }
            other => other,
        };

        match result {
            Ok(task_id) => {
                log::info!("Submitted transfer, task_id={}", task_id);
                self.apply(SessionEvent::SubmitOk);
                Ok(task_id)
            }
            Err(e) => {
                log::error!("Transfer submission failed: {}", e);
                self.apply(SessionEvent::SubmitFailed);
                Err(e)
            }
        }
    }

    /// Full run: login, probe source and destination, submit
    ///
    /// A session runs once; a submitted or failed session is not reused.
    pub async fn run(&mut self, task: &TransferTask) -> Result<TaskId, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::InvalidState {
                state: self.state,
                action: "run",
            });
        }
        self.acquire_default_credential().await?;
        self.ensure_consents(&[task.source_endpoint(), task.destination_endpoint()])
            .await?;
        self.submit(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::adapters::mock::{
        CannedCodeProvider, MemoryCredentialStore, MockAuthService, MockOutcome, MockTransferApi,
    };
    use crate::transfer::types::TokenSet;

    const SRC: &str = "src-endpoint";
    const DST: &str = "dst-endpoint";

    struct Harness {
        auth: Arc<MockAuthService>,
        transfer: Arc<MockTransferApi>,
        codes: Arc<CannedCodeProvider>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                auth: Arc::new(MockAuthService::new()),
                transfer: Arc::new(MockTransferApi::new("mock-transfer")),
                codes: Arc::new(CannedCodeProvider::new(&[])),
            }
        }

        fn session(&self) -> ConsentAwareTransferSession {
            ConsentAwareTransferSession::new(
                self.auth.clone(),
                self.transfer.clone(),
                self.codes.clone(),
            )
        }
    }

    fn task() -> TransferTask {
        TransferTask::builder(SRC, DST)
            .item("/home/user/phot.py", "/project/phot.py")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_probe_requires_credential() {
        let h = Harness::new();
        let session = h.session();
        let err = session.probe_consent(SRC).await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_probe_ignores_permission_denied() {
        let h = Harness::new();
        h.transfer.set_list_result(SRC, MockOutcome::permission_denied());

        let mut session = h.session();
        session.acquire_default_credential().await.unwrap();
        let required = session.probe_consent(SRC).await.unwrap();
        assert!(required.is_empty());
    }

    #[tokio::test]
    async fn test_probe_reports_consent_scopes() {
        let h = Harness::new();
        h.transfer
            .set_list_result(SRC, MockOutcome::consent(&["scope:transfer.src"]));

        let mut session = h.session();
        session.acquire_default_credential().await.unwrap();
        let required = session.probe_consent(SRC).await.unwrap();
        assert_eq!(required, ScopeSet::from_iter(["scope:transfer.src"]));
    }

    #[tokio::test]
    async fn test_clean_probes_submit_with_original_credential() {
        let h = Harness::new();
        h.transfer.set_default_submit(MockOutcome::ok("abc123"));

        let mut session = h.session();
        let task_id = session.run(&task()).await.unwrap();

        assert_eq!(task_id, "abc123");
        assert_eq!(h.auth.flows(), vec![ScopeSet::transfer_all()]);
        assert_eq!(h.transfer.submit_calls(), vec!["token-1"]);
        assert_eq!(session.state(), SessionState::Submitted);
    }

    #[tokio::test]
    async fn test_escalation_uses_union_of_probe_scopes() {
        let h = Harness::new();
        h.transfer.set_list_result(SRC, MockOutcome::consent(&["scope:a", "scope:b"]));
        h.transfer.set_list_result(DST, MockOutcome::consent(&["scope:b", "scope:c"]));

        let mut session = h.session();
        session.run(&task()).await.unwrap();

        let flows = h.auth.flows();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[1], ScopeSet::from_iter(["scope:a", "scope:b", "scope:c"]));
        // submission uses the escalated token
        assert_eq!(h.transfer.submit_calls(), vec!["token-2"]);
    }

    #[tokio::test]
    async fn test_submit_retries_exactly_once() {
        let h = Harness::new();
        h.transfer
            .set_default_submit(MockOutcome::consent(&["scope:transfer.dst"]));

        let mut session = h.session();
        let err = session.run(&task()).await.unwrap_err();

        assert!(err.as_transfer().unwrap().is_consent_required());
        assert_eq!(h.transfer.submit_calls().len(), 2);
        assert_eq!(h.auth.flows().len(), 2);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_non_consent_submit_error_not_retried() {
        let h = Harness::new();
        h.transfer.set_default_submit(MockOutcome::Api {
            status: 404,
            code: "ClientError.NotFound".to_string(),
        });

        let mut session = h.session();
        let err = session.run(&task()).await.unwrap_err();

        match err {
            SessionError::Transfer(TransferApiError::Api { status, code, .. }) => {
                assert_eq!(status, 404);
                assert_eq!(code, "ClientError.NotFound");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(h.transfer.submit_calls().len(), 1);
        assert_eq!(h.auth.flows().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_and_submit_budgets_are_independent() {
        let h = Harness::new();
        h.transfer.set_list_result(SRC, MockOutcome::consent(&["scope:src"]));
        h.transfer.push_submit_result(MockOutcome::consent(&["scope:dst"]));
        h.transfer.set_default_submit(MockOutcome::ok("task-2"));

        let mut session = h.session();
        let task_id = session.run(&task()).await.unwrap();

        assert_eq!(task_id, "task-2");
        let flows = h.auth.flows();
        assert_eq!(flows.len(), 3);
        assert_eq!(flows[1], ScopeSet::from_iter(["scope:src"]));
        assert_eq!(flows[2], ScopeSet::from_iter(["scope:dst"]));
    }

    #[tokio::test]
    async fn test_escalation_login_failure_on_submit() {
        let h = Harness::new();
        h.transfer
            .push_submit_result(MockOutcome::consent(&["scope:transfer.dst"]));

        let mut session = h.session();
        session.acquire_default_credential().await.unwrap();
        session.ensure_consents(&[SRC, DST]).await.unwrap();
        h.auth.set_reject(true);

        let err = session.submit(&task()).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Auth(AuthExchangeError::Rejected { .. })
        ));
        assert_eq!(h.transfer.submit_calls(), vec!["token-1"]);
        assert_eq!(h.auth.flows().len(), 2);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_submit_requires_credential() {
        let h = Harness::new();
        let mut session = h.session();

        let err = session.submit(&task()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Unauthenticated,
                action: "submit"
            }
        ));
        assert!(h.transfer.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_finished_session_is_not_rerun() {
        let h = Harness::new();
        let mut session = h.session();
        session.run(&task()).await.unwrap();

        let err = session.run(&task()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Submitted,
                action: "run"
            }
        ));
        let err = session.submit(&task()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));

        assert_eq!(h.auth.flows().len(), 1);
        assert_eq!(h.transfer.submit_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_exchange_rejected_fails_session() {
        let h = Harness::new();
        h.auth.set_reject(true);

        let mut session = h.session();
        let err = session.run(&task()).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Auth(AuthExchangeError::Rejected { status: 401, .. })
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(h.transfer.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_transfer_token() {
        let h = Harness {
            auth: Arc::new(MockAuthService::for_resource_server("auth.globus.org")),
            ..Harness::new()
        };

        let mut session = h.session();
        let err = session.acquire_default_credential().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Auth(AuthExchangeError::MissingResourceServer(_))
        ));
    }

    #[tokio::test]
    async fn test_code_prompt_timeout() {
        let h = Harness {
            codes: Arc::new(CannedCodeProvider::new(&[]).with_delay(Duration::from_secs(5))),
            ..Harness::new()
        };

        let mut session = h.session().with_code_timeout(Duration::from_millis(20));
        let err = session.acquire_default_credential().await.unwrap_err();
        assert!(matches!(err, SessionError::Auth(AuthExchangeError::Timeout(_))));
        assert!(h.auth.exchanges().is_empty());
    }

    #[tokio::test]
    async fn test_stored_credential_skips_login() {
        let h = Harness::new();
        let stored = TokenSet::from_iter([TokenData {
            resource_server: TRANSFER_RESOURCE_SERVER.to_string(),
            access_token: "stored".to_string(),
            scope: crate::transfer::types::TRANSFER_ALL_SCOPE.to_string(),
            token_type: "Bearer".to_string(),
            expires_at_seconds: Some(chrono::Utc::now().timestamp() + 3600),
            refresh_token: None,
        }]);
        let store = Arc::new(MemoryCredentialStore::with_tokens(stored));

        let mut session = h.session().with_store(store.clone());
        let credential = session.acquire_default_credential().await.unwrap();

        assert_eq!(credential.access_token, "stored");
        assert!(h.auth.flows().is_empty());
        assert!(h.codes.presented_urls().is_empty());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_expired_stored_credential_triggers_login() {
        let h = Harness::new();
        let stored = TokenSet::from_iter([TokenData {
            resource_server: TRANSFER_RESOURCE_SERVER.to_string(),
            access_token: "stale".to_string(),
            scope: crate::transfer::types::TRANSFER_ALL_SCOPE.to_string(),
            token_type: "Bearer".to_string(),
            expires_at_seconds: Some(1),
            refresh_token: None,
        }]);
        let store = Arc::new(MemoryCredentialStore::with_tokens(stored));

        let mut session = h.session().with_store(store.clone());
        let credential = session.acquire_default_credential().await.unwrap();

        assert_eq!(credential.access_token, "token-1");
        assert_eq!(store.writes(), 1);
        let persisted = store.tokens().unwrap();
        assert_eq!(
            persisted.get(TRANSFER_RESOURCE_SERVER).unwrap().access_token,
            "token-1"
        );
    }

    #[tokio::test]
    async fn test_new_login_is_persisted() {
        let h = Harness::new();
        let store = Arc::new(MemoryCredentialStore::new());

        let mut session = h.session().with_store(store.clone());
        session.acquire_default_credential().await.unwrap();

        assert_eq!(store.writes(), 1);
        assert_eq!(h.codes.presented_urls().len(), 1);
    }
}
