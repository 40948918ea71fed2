use std::fmt;

/// Errors raised by the file index.
#[derive(Debug)]
pub enum StorageError {
    /// The output folder does not exist.
    NotFound(String),
    /// The instance has no output folder assigned yet.
    NoOutputFolder(i32),
    /// The output folder escapes the storage root.
    InvalidPath(String),
    /// An I/O error occurred.
    Io(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "output folder not found: {path}"),
            Self::NoOutputFolder(id) => write!(f, "instance {id} has no output folder"),
            Self::InvalidPath(path) => write!(f, "output folder escapes storage root: {path}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
