use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::transfer::{TransferItem, TransferTask};

pub const DEFAULT_CONFIG_FILE: &str = "config/config.yaml";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    /// Native-app client id registered with the auth service
    pub client_id: String,
    pub auth_base_url: String,
    pub transfer_base_url: String,
    pub token_file: String,
    pub persist_tokens: bool,
    pub auth_code_timeout_secs: u64,
    pub archive_url: String,
    #[serde(default)]
    pub transfer_items: Vec<TransferItem>,
    #[serde(default)]
    pub transfer_label: Option<String>,
}

impl AppConfig {
    /// Build the task for `src` -> `dst` from the configured items
    pub fn transfer_task(&self, src: &str, dst: &str) -> Result<TransferTask, String> {
        let mut builder = TransferTask::builder(src, dst).items(self.transfer_items.iter().cloned());
        if let Some(label) = &self.transfer_label {
            builder = builder.label(label);
        }
        builder.build()
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/nsc_fetcher.log")?
        .set_default("client_id", "ee825967-32c6-4906-9278-ace1bcbadfa2")?
        .set_default("auth_base_url", "https://auth.globus.org/")?
        .set_default("transfer_base_url", "https://transfer.api.globus.org/v0.10/")?
        .set_default("token_file", "~/mytokens.json")?
        .set_default("persist_tokens", true)?
        .set_default("auth_code_timeout_secs", 300)?
        .set_default("archive_url", "https://astroarchive.noirlab.edu")?
        // Add configuration from a file
        .add_source(File::with_name(path).required(false))
        // Add configuration from environment variables
        .add_source(config::Environment::with_prefix("APP"))
        .build()?;

    s.try_deserialize()
}
