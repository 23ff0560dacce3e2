//! Globus adapters
//!
//! `GlobusAuthClient` runs the native-app authorization-code flow (PKCE,
//! no client secret) and `GlobusTransferClient` talks to the Transfer REST
//! API with a bearer token.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distr::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use super::traits::{AuthService, TransferApi};
use crate::transfer::error::{AuthExchangeError, TransferApiError};
use crate::transfer::types::{
    AuthorizationRequest, Credential, DirEntry, ScopeSet, TaskId, TokenData, TokenSet,
    TransferTask,
};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://auth.globus.org/";
pub const DEFAULT_TRANSFER_BASE_URL: &str = "https://transfer.api.globus.org/v0.10/";

const CONSENT_REQUIRED_CODE: &str = "ConsentRequired";
const VERIFIER_LEN: usize = 64;

/// Parse a base URL, making sure it ends with `/` so `join` appends
fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{}/", raw))
    }
}

fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn new_verifier() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFIER_LEN)
        .map(char::from)
        .collect()
}

/// Native-app client of the Globus auth service
pub struct GlobusAuthClient {
    http: Client,
    client_id: String,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    scope: String,
    resource_server: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default = "bearer")]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    other_tokens: Vec<TokenResponse>,
}

fn bearer() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    fn into_token_set(self, now: i64) -> TokenSet {
        let mut set = TokenSet::new();
        let others = self.other_tokens;
        set.insert(TokenData {
            resource_server: self.resource_server,
            access_token: self.access_token,
            scope: self.scope,
            token_type: self.token_type,
            expires_at_seconds: self.expires_in.map(|s| now + s),
            refresh_token: self.refresh_token,
        });
        for other in others {
            for token in other.into_token_set(now).into_tokens() {
                set.insert(token);
            }
        }
        set
    }
}

impl GlobusAuthClient {
    pub fn new(client_id: &str, base_url: &str) -> Result<Self, AuthExchangeError> {
        Ok(Self {
            http: Client::new(),
            client_id: client_id.to_string(),
            base_url: parse_base_url(base_url)?,
        })
    }

    /// Page that shows the code to the operator after login
    pub fn redirect_uri(&self) -> Result<Url, AuthExchangeError> {
        Ok(self.base_url.join("v2/web/auth-code")?)
    }
}

#[async_trait]
impl AuthService for GlobusAuthClient {
    fn start_flow(&self, scopes: &ScopeSet) -> Result<AuthorizationRequest, AuthExchangeError> {
        let code_verifier = new_verifier();
        let redirect_uri = self.redirect_uri()?;

        let mut url = self.base_url.join("v2/oauth2/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &scopes.to_scope_string())
            .append_pair("state", "_default")
            .append_pair("response_type", "code")
            .append_pair("code_challenge", &pkce_challenge(&code_verifier))
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "online");

        Ok(AuthorizationRequest {
            url: url.to_string(),
            scopes: scopes.clone(),
            code_verifier,
        })
    }

    async fn exchange_code(
        &self,
        request: &AuthorizationRequest,
        code: &str,
    ) -> Result<TokenSet, AuthExchangeError> {
        let token_url = self.base_url.join("v2/oauth2/token")?;
        let redirect_uri = self.redirect_uri()?;
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", request.code_verifier.as_str()),
        ];

        let response = self.http.post(token_url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".into());
            return Err(AuthExchangeError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = response.json().await?;
        let tokens = body.into_token_set(chrono::Utc::now().timestamp());
        log::info!(
            "Exchanged authorization code for tokens of: {}",
            tokens.resource_servers().collect::<Vec<_>>().join(", ")
        );
        Ok(tokens)
    }
}

/// Error document returned by the Transfer API
#[derive(Debug, Default, Deserialize)]
struct ErrorDocument {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    required_scopes: Vec<String>,
    #[serde(default)]
    authorization_parameters: Option<AuthorizationParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorizationParameters {
    #[serde(default)]
    required_scopes: Vec<String>,
}

/// Map a non-success Transfer API response to a typed error
pub(crate) fn error_from_response(status: u16, body: &str) -> TransferApiError {
    let doc: ErrorDocument = match serde_json::from_str(body) {
        Ok(doc) => doc,
        Err(_) => {
            return TransferApiError::Api {
                status,
                code: "Unknown".to_string(),
                message: body.to_string(),
            }
        }
    };

    if doc.code == CONSENT_REQUIRED_CODE {
        let mut scopes: ScopeSet = doc.required_scopes.into_iter().collect();
        if let Some(params) = doc.authorization_parameters {
            let extra: ScopeSet = params.required_scopes.into_iter().collect();
            scopes.extend(&extra);
        }
        return TransferApiError::ConsentRequired { scopes };
    }

    if let Some(request_id) = &doc.request_id {
        log::debug!("Transfer API error {} (request_id={})", doc.code, request_id);
    }
    TransferApiError::Api {
        status,
        code: doc.code,
        message: doc.message,
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(rename = "DATA", default)]
    data: Vec<DirEntry>,
}

#[derive(Debug, Deserialize)]
struct SubmissionIdResponse {
    value: String,
}

#[derive(Debug, Serialize)]
struct TransferItemDocument<'a> {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    source_path: &'a str,
    destination_path: &'a str,
    recursive: bool,
}

#[derive(Debug, Serialize)]
struct TransferDocument<'a> {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    submission_id: &'a str,
    source_endpoint: &'a str,
    destination_endpoint: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'a str>,
    #[serde(rename = "DATA")]
    data: Vec<TransferItemDocument<'a>>,
}

impl<'a> TransferDocument<'a> {
    fn new(submission_id: &'a str, task: &'a TransferTask) -> Self {
        Self {
            data_type: "transfer",
            submission_id,
            source_endpoint: task.source_endpoint(),
            destination_endpoint: task.destination_endpoint(),
            label: task.label(),
            data: task
                .items()
                .iter()
                .map(|item| TransferItemDocument {
                    data_type: "transfer_item",
                    source_path: &item.source_path,
                    destination_path: &item.destination_path,
                    recursive: item.recursive,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: String,
    #[serde(default)]
    code: String,
}

/// Client of the Globus Transfer REST API
pub struct GlobusTransferClient {
    http: Client,
    base_url: Url,
}

impl GlobusTransferClient {
    pub fn new(base_url: &str) -> Result<Self, TransferApiError> {
        let base_url = parse_base_url(base_url)
            .map_err(|e| TransferApiError::Decode(format!("bad base url: {}", e)))?;
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    fn url(&self, path: &str) -> Result<Url, TransferApiError> {
        self.base_url
            .join(path)
            .map_err(|e| TransferApiError::Decode(format!("bad url {}: {}", path, e)))
    }

    /// `operation/endpoint/<endpoint>/<operation>` with the id percent-encoded
    fn endpoint_url(&self, endpoint: &str, operation: &str) -> Result<Url, TransferApiError> {
        let mut url = self.url("operation/endpoint")?;
        url.path_segments_mut()
            .map_err(|_| {
                TransferApiError::Decode(format!("base url {} cannot have a path", self.base_url))
            })?
            .push(endpoint)
            .push(operation);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TransferApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".into());
        Err(error_from_response(status.as_u16(), &body))
    }

    async fn submission_id(&self, credential: &Credential) -> Result<String, TransferApiError> {
        let response = self
            .http
            .get(self.url("submission_id")?)
            .bearer_auth(&credential.access_token)
            .send()
            .await?;
        let body: SubmissionIdResponse = Self::check(response).await?.json().await?;
        Ok(body.value)
    }
}

#[async_trait]
impl TransferApi for GlobusTransferClient {
    async fn list_path(
        &self,
        credential: &Credential,
        endpoint: &str,
        path: &str,
    ) -> Result<Vec<DirEntry>, TransferApiError> {
        let mut url = self.endpoint_url(endpoint, "ls")?;
        url.query_pairs_mut().append_pair("path", path);

        let response = self
            .http
            .get(url)
            .bearer_auth(&credential.access_token)
            .send()
            .await?;
        let body: ListResponse = Self::check(response).await?.json().await?;
        Ok(body.data)
    }

    async fn submit_transfer(
        &self,
        credential: &Credential,
        task: &TransferTask,
    ) -> Result<TaskId, TransferApiError> {
        let submission_id = self.submission_id(credential).await?;
        let document = TransferDocument::new(&submission_id, task);

        let response = self
            .http
            .post(self.url("transfer")?)
            .bearer_auth(&credential.access_token)
            .json(&document)
            .send()
            .await?;
        let body: SubmitResponse = Self::check(response).await?.json().await?;
        log::debug!("Transfer submission {} answered {}", submission_id, body.code);
        Ok(TaskId::new(body.task_id))
    }

    fn name(&self) -> &str {
        "globus-transfer"
    }
}
