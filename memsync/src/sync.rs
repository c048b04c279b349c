//! Outcome of a mirror sync and the state remembered between syncs

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize, Serializer};

use crate::FileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Updated,
}

/// Why a sync did not write anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    LocalFileNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    Skipped {
        reason: SkipReason,
    },
    Synced {
        action: SyncAction,
        remote_id: FileId,
        remote_name: String,
    },
}

impl SyncResult {
    pub fn synced(&self) -> bool {
        matches!(self, Self::Synced { .. })
    }

    pub fn action(&self) -> Option<SyncAction> {
        match self {
            Self::Synced { action, .. } => Some(*action),
            Self::Skipped { .. } => None,
        }
    }

    pub fn remote_id(&self) -> Option<&FileId> {
        match self {
            Self::Synced { remote_id, .. } => Some(remote_id),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncReport<'a> {
    synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<SyncAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_id: Option<&'a FileId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_name: Option<&'a str>,
}

// flat shape: {"synced": false, "reason": ...} or {"synced": true, "action": ..., ...}
impl Serialize for SyncResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let report = match self {
            Self::Skipped { reason } => SyncReport {
                synced: false,
                reason: Some(*reason),
                action: None,
                remote_id: None,
                remote_name: None,
            },
            Self::Synced {
                action,
                remote_id,
                remote_name,
            } => SyncReport {
                synced: true,
                reason: None,
                action: Some(*action),
                remote_id: Some(remote_id),
                remote_name: Some(remote_name),
            },
        };
        report.serialize(serializer)
    }
}

/// Remote object written by the last successful sync of a store file.
/// Persisted next to the store as `<stem>.mirror.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorState {
    pub remote_id: FileId,
    pub remote_name: String,
    pub folder_id: Option<FileId>,
}

impl MirrorState {
    pub fn path_for(store_path: &Utf8Path) -> Utf8PathBuf {
        let stem = store_path.file_stem().unwrap_or("memory");
        store_path.with_file_name(format!("{stem}.mirror.json"))
    }

    /// Returns `None` if there is no state file or if it can't be parsed.
    pub async fn load(store_path: &Utf8Path) -> Option<Self> {
        let path = Self::path_for(store_path);
        let json = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&json) {
            Ok(state) => Some(state),
            Err(err) => {
                log::warn!("ignoring unreadable mirror state {path}: {err}");
                None
            }
        }
    }

    pub async fn save(&self, store_path: &Utf8Path) -> crate::Result<()> {
        let path = Self::path_for(store_path);
        log::trace!("recording mirror state to {path}");
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| crate::Error::Other(err.to_string()))?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    /// Whether this state was recorded for the given target
    pub fn matches(&self, name: &str, folder_id: Option<&FileId>) -> bool {
        self.remote_name == name && self.folder_id.as_ref() == folder_id
    }
}
