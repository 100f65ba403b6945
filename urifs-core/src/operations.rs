//! Operation options

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindOptions {
    /// Levels below the starting directory to descend; `None` is unlimited
    pub maxdepth: Option<usize>,
    /// Include directories in the result, not just files
    pub withdirs: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuOptions {
    /// Sum everything into a single number instead of a per-path map
    pub total: bool,
    pub maxdepth: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyOptions {
    pub recursive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoveOptions {
    pub recursive: bool,
}

/// How `open` acquires a file handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    #[default]
    Read,
    /// Create or truncate
    Write,
    /// Create if missing, write at the end
    Append,
}

impl OpenMode {
    pub fn is_write(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}
