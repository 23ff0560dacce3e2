//! Core types for the transfer session
//!
//! Credentials, scope sets, transfer task documents and the token bundle
//! returned by an authorization-code exchange.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Resource server identifier of the transfer service
pub const TRANSFER_RESOURCE_SERVER: &str = "transfer.api.globus.org";

/// Broadest scope on the transfer service
pub const TRANSFER_ALL_SCOPE: &str = "urn:globus:auth:scope:transfer.api.globus.org:all";

/// Ordered, de-duplicated set of scope strings
///
/// Used both for scopes requested during login and for the additional
/// scopes an endpoint reports as missing. An empty set means no further
/// consent is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// The default login scope: full access to the transfer service
    pub fn transfer_all() -> Self {
        Self::from_iter([TRANSFER_ALL_SCOPE])
    }

    /// Parse a space-separated scope string as returned by the token endpoint
    pub fn from_scope_string(s: &str) -> Self {
        s.split_whitespace().collect()
    }

    pub fn extend(&mut self, other: &ScopeSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// True if every scope of `other` is also in `self`
    pub fn covers(&self, other: &ScopeSet) -> bool {
        other.0.is_subset(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Space-separated form used in authorize URLs
    pub fn to_scope_string(&self) -> String {
        self.iter().collect::<Vec<_>>().join(" ")
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.iter().collect::<Vec<_>>().join(", "))
    }
}

/// Access token bound to one resource server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub resource_server: String,
    pub access_token: String,
    /// Scopes granted to this token (may be empty if unknown)
    #[serde(default)]
    pub scopes: ScopeSet,
    /// Expiry as unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl Credential {
    pub fn new(resource_server: &str, access_token: &str) -> Self {
        Self {
            resource_server: resource_server.to_string(),
            access_token: access_token.to_string(),
            scopes: ScopeSet::new(),
            expires_at: None,
        }
    }

    pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }

    /// Whether this credential may be reused for a login asking for `requested`
    pub fn satisfies(&self, requested: &ScopeSet) -> bool {
        !self.is_expired() && self.scopes.covers(requested)
    }
}

// Keep the token out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("resource_server", &self.resource_server)
            .field("access_token", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token data for a single resource server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub resource_server: String,
    pub access_token: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_at_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenData {
    pub fn to_credential(&self) -> Credential {
        Credential {
            resource_server: self.resource_server.clone(),
            access_token: self.access_token.clone(),
            scopes: ScopeSet::from_scope_string(&self.scope),
            expires_at: self.expires_at_seconds,
        }
    }
}

impl fmt::Debug for TokenData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenData")
            .field("resource_server", &self.resource_server)
            .field("scope", &self.scope)
            .field("expires_at_seconds", &self.expires_at_seconds)
            .finish_non_exhaustive()
    }
}

/// Tokens returned by a code exchange, keyed by resource server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet(BTreeMap<String, TokenData>);

impl TokenSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, token: TokenData) {
        self.0.insert(token.resource_server.clone(), token);
    }

    pub fn get(&self, resource_server: &str) -> Option<&TokenData> {
        self.0.get(resource_server)
    }

    pub fn resource_servers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_tokens(self) -> impl Iterator<Item = TokenData> {
        self.0.into_values()
    }
}

impl FromIterator<TokenData> for TokenSet {
    fn from_iter<I: IntoIterator<Item = TokenData>>(iter: I) -> Self {
        let mut set = TokenSet::new();
        for token in iter {
            set.insert(token);
        }
        set
    }
}

/// Output of starting an authorization-code flow
///
/// Carries the PKCE verifier so the exchange can be done without hidden
/// per-client state.
#[derive(Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub scopes: ScopeSet,
    pub code_verifier: String,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("url", &self.url)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// One (source, destination) pair inside a transfer task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub source_path: String,
    pub destination_path: String,
    #[serde(default)]
    pub recursive: bool,
}

impl TransferItem {
    pub fn new(source_path: &str, destination_path: &str) -> Self {
        Self {
            source_path: source_path.to_string(),
            destination_path: destination_path.to_string(),
            recursive: false,
        }
    }
}

/// An immutable transfer submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    source_endpoint: String,
    destination_endpoint: String,
    items: Vec<TransferItem>,
    label: Option<String>,
}

impl TransferTask {
    pub fn builder(source_endpoint: &str, destination_endpoint: &str) -> TransferTaskBuilder {
        TransferTaskBuilder {
            source_endpoint: source_endpoint.to_string(),
            destination_endpoint: destination_endpoint.to_string(),
            items: Vec::new(),
            label: None,
        }
    }

    pub fn source_endpoint(&self) -> &str {
        &self.source_endpoint
    }

    pub fn destination_endpoint(&self) -> &str {
        &self.destination_endpoint
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

pub struct TransferTaskBuilder {
    source_endpoint: String,
    destination_endpoint: String,
    items: Vec<TransferItem>,
    label: Option<String>,
}

impl TransferTaskBuilder {
    pub fn item(mut self, source_path: &str, destination_path: &str) -> Self {
        self.items.push(TransferItem::new(source_path, destination_path));
        self
    }

    pub fn items(mut self, items: impl IntoIterator<Item = TransferItem>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Fails when no items were added
    pub fn build(self) -> Result<TransferTask, String> {
        if self.items.is_empty() {
            return Err("transfer task needs at least one item".to_string());
        }
        Ok(TransferTask {
            source_endpoint: self.source_endpoint,
            destination_endpoint: self.destination_endpoint,
            items: self.items,
            label: self.label,
        })
    }
}

/// Identifier of a submitted task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<&str> for TaskId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Entry returned by a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_set_dedups_and_extends() {
        let a: ScopeSet = ["s1", "s2", "s1"].into_iter().collect();
        let b: ScopeSet = ["s2", "s3"].into_iter().collect();
        assert_eq!(a.len(), 2);

        let mut u = a.clone();
        u.extend(&b);
        assert_eq!(u.iter().collect::<Vec<_>>(), vec!["s1", "s2", "s3"]);
        assert!(u.covers(&a));
        assert!(!a.covers(&u));
    }

    #[test]
    fn test_scope_string_parsing() {
        let s = ScopeSet::from_scope_string("  a b\tc ");
        assert_eq!(s.to_scope_string(), "a b c");
        assert!(ScopeSet::from_scope_string("").is_empty());
    }

    #[test]
    fn test_credential_expiry() {
        let cred = Credential::new(TRANSFER_RESOURCE_SERVER, "tok").with_expiry(100);
        assert!(cred.is_expired_at(100));
        assert!(!cred.is_expired_at(99));
        assert!(!Credential::new(TRANSFER_RESOURCE_SERVER, "tok").is_expired());
    }

    #[test]
    fn test_credential_satisfies_requires_scopes() {
        let cred = Credential::new(TRANSFER_RESOURCE_SERVER, "tok")
            .with_scopes(ScopeSet::transfer_all());
        assert!(cred.satisfies(&ScopeSet::transfer_all()));
        assert!(!cred.satisfies(&ScopeSet::from_iter(["scope:transfer.src"])));
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let cred = Credential::new(TRANSFER_RESOURCE_SERVER, "super-secret");
        let dbg = format!("{:?}", cred);
        assert!(!dbg.contains("super-secret"));
    }

    #[test]
    fn test_task_requires_items() {
        assert!(TransferTask::builder("src", "dst").build().is_err());

        let task = TransferTask::builder("src", "dst")
            .item("/a", "/b")
            .label("nsc")
            .build()
            .unwrap();
        assert_eq!(task.items().len(), 1);
        assert_eq!(task.label(), Some("nsc"));
        assert!(!task.items()[0].recursive);
    }
}
