use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Identifier of an object in the remote store
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct FileId {
    inner: String,
}

impl FileId {
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        FileId { inner: value }
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        FileId {
            inner: value.to_string(),
        }
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for FileId {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for FileId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileId(")?;
        fmt::Debug::fmt(&self.inner, f)?;
        f.write_str(")")
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}
