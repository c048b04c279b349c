use std::fmt;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::FileId;

/// Environment variable holding the service account JSON key
pub const CREDENTIALS_VAR: &str = "MEMSYNC_CREDENTIALS_JSON";
/// Environment variable holding the optional Drive folder id
pub const FOLDER_VAR: &str = "MEMSYNC_DRIVE_FOLDER_ID";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Settings of the command line tool, all optional
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<FileId>,
}

impl Config {
    pub async fn load_from_file(path: &Utf8Path) -> anyhow::Result<Self> {
        let config_json = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read config from {path}"))?;
        let config_json = std::str::from_utf8(&config_json)?;
        serde_json::from_str(config_json).with_context(|| format!("Invalid config file {path}"))
    }
}

/// Google service account key, as downloaded from the cloud console
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub typ: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|err| crate::config_error!("Invalid service account key: {err}"))?;
        if key.typ != "service_account" {
            crate::config_bail!(
                "Expected a key of type \"service_account\", got \"{}\"",
                key.typ
            );
        }
        if key.client_email.is_empty() || key.private_key.is_empty() {
            crate::config_bail!("Service account key lacks client_email or private_key");
        }
        Ok(key)
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Everything needed to reach the remote store
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub credentials: ServiceAccountKey,
    pub folder_id: Option<FileId>,
}

impl RemoteConfig {
    /// Reads [CREDENTIALS_VAR] and [FOLDER_VAR] from the process environment
    pub fn from_env() -> crate::Result<Self> {
        Self::from_vars(
            std::env::var(CREDENTIALS_VAR).ok(),
            std::env::var(FOLDER_VAR).ok(),
        )
    }

    pub fn from_vars(credentials: Option<String>, folder_id: Option<String>) -> crate::Result<Self> {
        let credentials = credentials
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| crate::config_error!("{CREDENTIALS_VAR} is not set"))?;
        let credentials = ServiceAccountKey::from_json(&credentials)?;
        let folder_id = folder_id
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .map(FileId::from);
        Ok(Self {
            credentials,
            folder_id,
        })
    }
}
