use std::{error, fmt, io};

use serde::{Deserialize, Serialize};

/// Error type shared by the store and the remote mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Error {
    /// The store file exists but is not a JSON array of entries
    CorruptStore(String),
    /// Missing or invalid credentials or remote configuration
    Config(String),
    /// Failure reported by the remote object store.
    /// `status` is `None` when the request never got a response.
    Remote {
        status: Option<u16>,
        message: String,
    },
    Io(String),
    Other(String),
}

impl Error {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CorruptStore(msg) => write!(f, "Corrupt store: {msg}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Remote {
                status: Some(status),
                message,
            } => write!(f, "Remote error ({status}): {message}"),
            Self::Remote {
                status: None,
                message,
            } => write!(f, "Remote error: {message}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps a transport or decoding failure to a remote error without status
pub fn remote<E: fmt::Display>(err: E) -> Error {
    Error::Remote {
        status: None,
        message: err.to_string(),
    }
}

pub fn io<E: fmt::Display>(err: E) -> Error {
    Error::Io(err.to_string())
}

#[macro_export]
macro_rules! corrupt_bail {
    ($($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::CorruptStore(format!($($t)*)));
    };
}

#[macro_export]
macro_rules! config_bail {
    ($($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::Config(format!($($t)*)));
    };
}

#[macro_export]
macro_rules! remote_bail {
    ($status:expr, $($t:tt)*) => {
        return ::core::result::Result::Err($crate::Error::Remote {
            status: $status,
            message: format!($($t)*),
        });
    };
}

#[macro_export]
macro_rules! config_error {
    ($($t:tt)*) => {
        $crate::Error::Config(format!($($t)*))
    };
}

#[macro_export]
macro_rules! remote_error {
    ($status:expr, $($t:tt)*) => {
        $crate::Error::Remote {
            status: $status,
            message: format!($($t)*),
        }
    };
}
