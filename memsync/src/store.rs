//! Append-only store of text entries, persisted as a JSON array

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tokio::{fs, io};

use crate::error;

/// File name of the store when none is configured
pub const DEFAULT_STORE_FILE: &str = "memory.json";

/// A single free-text note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub entry: String,
}

impl Entry {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { entry: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.entry
    }
}

/// Handle to the store file.
///
/// Callers must serialize `append` calls: the store does no locking.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: Utf8PathBuf,
}

impl LocalStore {
    /// Opens the store at `path`, creating it with an empty array if it does not exist.
    /// Existing content is never touched.
    pub async fn initialize<P: AsRef<Utf8Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref().to_owned();
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        match created {
            Ok(mut file) => {
                use io::AsyncWriteExt;

                log::info!("creating empty store at {path}");
                file.write_all(b"[]").await?;
                file.sync_all().await?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                log::trace!("store already exists at {path}");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Reads all entries, in file order
    pub async fn load(&self) -> crate::Result<Vec<Entry>> {
        let json = fs::read(&self.path)
            .await
            .map_err(|err| error::io(format!("Failed to read {}: {err}", self.path)))?;
        parse_entries(&json).map_err(|err| {
            crate::Error::CorruptStore(format!("{}: {err}", self.path))
        })
    }

    /// Appends an entry and rewrites the whole file
    pub async fn append<S: Into<String>>(&self, text: S) -> crate::Result<()> {
        let mut entries = self.load().await?;
        entries.push(Entry::new(text));
        log::trace!("appending entry #{} to {}", entries.len(), self.path);
        self.write_entries(&entries).await
    }

    async fn write_entries(&self, entries: &[Entry]) -> crate::Result<()> {
        use io::AsyncWriteExt;

        let json = serde_json::to_string_pretty(entries)
            .map_err(|err| crate::Error::Other(err.to_string()))?;

        // the rename keeps the previous content intact if we crash while writing
        let tmp_path = Utf8PathBuf::from(format!("{}.tmp", self.path));
        let res = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(err) = res {
            if let Err(rm_err) = fs::remove_file(&tmp_path).await {
                if rm_err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("could not remove {tmp_path}: {rm_err}");
                }
            }
            return Err(error::io(format!("Failed to write {}: {err}", self.path)));
        }
        Ok(())
    }
}

fn parse_entries(json: &[u8]) -> serde_json::Result<Vec<Entry>> {
    serde_json::from_slice(json)
}
