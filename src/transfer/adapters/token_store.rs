//! JSON file credential store
//!
//! Persists token sets in a single JSON document:
//! `{"format_version": "1.0", "by_rs": {"<resource server>": {...}}}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::traits::CredentialStore;
use crate::transfer::error::StoreError;
use crate::transfer::types::{Credential, TokenData, TokenSet};

const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    format_version: String,
    #[serde(default)]
    by_rs: BTreeMap<String, TokenData>,
}

pub struct JsonFileTokenStore {
    path: PathBuf,
}

impl JsonFileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Build from a configured path, expanding a leading `~/`
    pub fn from_config_path(raw: &str) -> Self {
        let path = match raw.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(raw)),
            None => PathBuf::from(raw),
        };
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn read(&self) -> Result<Option<TokenFile>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let file: TokenFile = serde_json::from_str(&raw)?;
        if file.format_version != FORMAT_VERSION {
            return Err(StoreError::FormatVersion(file.format_version));
        }
        Ok(Some(file))
    }

    async fn write(&self, file: &TokenFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(file)?;
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| self.io_error(e))?;

        // Tokens are secrets: owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| self.io_error(e))?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl CredentialStore for JsonFileTokenStore {
    async fn exists(&self) -> Result<bool, StoreError> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    async fn load(&self, resource_server: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .read()
            .await?
            .and_then(|file| file.by_rs.get(resource_server).map(TokenData::to_credential)))
    }

    async fn store(&self, tokens: &TokenSet) -> Result<(), StoreError> {
        let mut file = self.read().await?.unwrap_or_else(|| TokenFile {
            format_version: FORMAT_VERSION.to_string(),
            by_rs: BTreeMap::new(),
        });
        for token in tokens.clone().into_tokens() {
            file.by_rs.insert(token.resource_server.clone(), token);
        }
        self.write(&file).await?;
        log::info!("Stored tokens in {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::types::TRANSFER_RESOURCE_SERVER;

    fn token(rs: &str, access: &str) -> TokenData {
        TokenData {
            resource_server: rs.to_string(),
            access_token: access.to_string(),
            scope: "urn:globus:auth:scope:transfer.api.globus.org:all".to_string(),
            token_type: "Bearer".to_string(),
            expires_at_seconds: Some(1_900_000_000),
            refresh_token: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTokenStore::new(dir.path().join("tokens.json"));

        assert!(!store.exists().await.unwrap());
        assert!(store.load(TRANSFER_RESOURCE_SERVER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTokenStore::new(dir.path().join("nested/tokens.json"));

        store
            .store(&TokenSet::from_iter([token(TRANSFER_RESOURCE_SERVER, "t1")]))
            .await
            .unwrap();
        assert!(store.exists().await.unwrap());

        let cred = store.load(TRANSFER_RESOURCE_SERVER).await.unwrap().unwrap();
        assert_eq!(cred.access_token, "t1");
        assert_eq!(cred.expires_at, Some(1_900_000_000));
        assert!(cred.scopes.contains("urn:globus:auth:scope:transfer.api.globus.org:all"));
    }

    #[tokio::test]
    async fn test_store_merges_resource_servers() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTokenStore::new(dir.path().join("tokens.json"));

        store
            .store(&TokenSet::from_iter([token("auth.globus.org", "a1")]))
            .await
            .unwrap();
        store
            .store(&TokenSet::from_iter([token(TRANSFER_RESOURCE_SERVER, "t2")]))
            .await
            .unwrap();

        assert_eq!(store.load("auth.globus.org").await.unwrap().unwrap().access_token, "a1");
        assert_eq!(
            store.load(TRANSFER_RESOURCE_SERVER).await.unwrap().unwrap().access_token,
            "t2"
        );
    }

    #[tokio::test]
    async fn test_rejects_unknown_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"{"format_version": "9.9", "by_rs": {}}"#).unwrap();

        let store = JsonFileTokenStore::new(path);
        let err = store.load(TRANSFER_RESOURCE_SERVER).await.unwrap_err();
        assert!(matches!(err, StoreError::FormatVersion(v) if v == "9.9"));
    }

    #[test]
    fn test_tilde_expansion() {
        let store = JsonFileTokenStore::from_config_path("~/mytokens.json");
        assert!(store.path().ends_with("mytokens.json"));
        if dirs::home_dir().is_some() {
            assert!(!store.path().starts_with("~"));
        }
    }
}
