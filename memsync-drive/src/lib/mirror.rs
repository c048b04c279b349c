//! Mirror of a local file into the remote store

use bytes::Bytes;
use camino::Utf8Path;
use memsync::{FileId, MirrorState, RemoteConfig, SkipReason, SyncAction, SyncResult};

use crate::{
    oauth2::ServiceAccount,
    storage::{gdrive::GoogleDrive, RemoteFile, Storage},
};

/// A remote store bound to a target object name and optional folder.
///
/// Not meant for concurrent use: two racing syncs of the same target
/// leave whichever write lands last.
#[derive(Debug, Clone)]
pub struct SyncHandle<R> {
    remote: R,
    name: String,
    folder: Option<FileId>,
}

/// Binds the Google Drive described by `config` to `target_name`.
/// `folder` overrides the folder of `config`.
pub fn configure_drive(
    config: &RemoteConfig,
    target_name: &str,
    folder: Option<FileId>,
) -> memsync::Result<SyncHandle<GoogleDrive<ServiceAccount>>> {
    let client = reqwest::Client::builder()
        .build()
        .map_err(|err| memsync::config_error!("Can't build HTTP client: {err}"))?;
    let drive = GoogleDrive::from_config(config, client)?;
    let folder = folder.or_else(|| config.folder_id.clone());
    SyncHandle::configure(drive, target_name, folder)
}

impl<R> SyncHandle<R>
where
    R: Storage,
{
    pub fn configure<S: Into<String>>(
        remote: R,
        target_name: S,
        folder: Option<FileId>,
    ) -> memsync::Result<Self> {
        let name = target_name.into();
        if name.trim().is_empty() {
            memsync::config_bail!("Sync target name can't be empty");
        }
        if let Some(folder) = &folder {
            log::trace!("sync target {name} scoped to folder {folder}");
        }
        Ok(Self {
            remote,
            name,
            folder,
        })
    }

    pub fn target_name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> Option<&FileId> {
        self.folder.as_ref()
    }

    /// Looks up the remote object of this target.
    /// If several objects match, the oldest one is returned.
    pub async fn find_existing(&self) -> memsync::Result<Option<FileId>> {
        self.find_existing_preferring(None).await
    }

    async fn find_existing_preferring(
        &self,
        preferred: Option<&FileId>,
    ) -> memsync::Result<Option<FileId>> {
        let files = self
            .remote
            .find_files(&self.name, self.folder.as_ref())
            .await?;
        let files: Vec<RemoteFile> = files
            .into_iter()
            .filter(|f| f.name == self.name)
            .filter(|f| match &self.folder {
                Some(folder) => f.parents.contains(folder),
                None => true,
            })
            .collect();

        let remembered = preferred.and_then(|id| files.iter().find(|f| &f.id == id));
        let chosen = remembered.or_else(|| files.first());
        if files.len() > 1 {
            log::warn!(
                "found {} remote files named {}, using {}{}",
                files.len(),
                self.name,
                chosen.map(|f| f.id.as_str()).unwrap_or_default(),
                if remembered.is_some() {
                    " (last synced)"
                } else {
                    " (oldest)"
                },
            );
        }
        Ok(chosen.map(|f| f.id.clone()))
    }

    /// Creates or overwrites the remote object with the content of `local_path`.
    ///
    /// A missing local file is reported in the result, not as an error.
    /// At most one remote write is attempted and nothing is retried.
    pub async fn sync<P: AsRef<Utf8Path>>(&self, local_path: P) -> memsync::Result<SyncResult> {
        let local_path = local_path.as_ref();

        let data = match tokio::fs::read(local_path).await {
            Ok(data) => Bytes::from(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("not syncing {local_path}: no such file");
                return Ok(SyncResult::Skipped {
                    reason: SkipReason::LocalFileNotFound,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let state = MirrorState::load(local_path)
            .await
            .filter(|st| st.matches(&self.name, self.folder.as_ref()));
        let existing = self
            .find_existing_preferring(state.as_ref().map(|st| &st.remote_id))
            .await?;

        let (action, file) = match existing {
            Some(id) => {
                let file = self.remote.update_file(&id, data).await?;
                (SyncAction::Updated, file)
            }
            None => {
                let file = self
                    .remote
                    .create_file(&self.name, self.folder.as_ref(), data)
                    .await?;
                (SyncAction::Created, file)
            }
        };
        log::info!("{local_path} mirrored to {} ({action:?})", file.id);

        let state = MirrorState {
            remote_id: file.id.clone(),
            remote_name: self.name.clone(),
            folder_id: self.folder.clone(),
        };
        if let Err(err) = state.save(local_path).await {
            log::warn!("could not record mirror state of {local_path}: {err}");
        }

        let remote_name = if file.name.is_empty() {
            self.name.clone()
        } else {
            file.name
        };
        Ok(SyncResult::Synced {
            action,
            remote_id: file.id,
            remote_name,
        })
    }
}
