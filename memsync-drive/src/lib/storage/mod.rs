use bytes::Bytes;
use futures::Future;
use memsync::FileId;

pub mod gdrive;

/// An object of the remote store, as far as the mirror is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: FileId,
    pub name: String,
    pub parents: Vec<FileId>,
}

pub trait FindFiles {
    /// Lists the non-trashed objects called `name`, restricted to children of `folder` if given.
    /// Objects are returned oldest first.
    fn find_files(
        &self,
        name: &str,
        folder: Option<&FileId>,
    ) -> impl Future<Output = memsync::Result<Vec<RemoteFile>>> + Send;
}

pub trait CreateFile {
    fn create_file(
        &self,
        name: &str,
        folder: Option<&FileId>,
        data: Bytes,
    ) -> impl Future<Output = memsync::Result<RemoteFile>> + Send;
}

pub trait UpdateFile {
    /// Replaces the whole content of the object `id`
    fn update_file(
        &self,
        id: &FileId,
        data: Bytes,
    ) -> impl Future<Output = memsync::Result<RemoteFile>> + Send;
}

/// A trait for the remote object store
pub trait Storage: FindFiles + CreateFile + UpdateFile + Send + Sync + 'static {}
