pub mod config;
pub mod error;
pub mod loc;
pub mod store;
pub mod sync;

mod id;

pub use crate::config::{Config, RemoteConfig, ServiceAccountKey};
pub use crate::error::{Error, Result};
pub use crate::id::FileId;
pub use crate::store::{Entry, LocalStore};
pub use crate::sync::{MirrorState, SkipReason, SyncAction, SyncResult};
