//! File system entries

use crate::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// A file system entry as returned by `ls` and `info`.
///
/// Backends fill `path` with their own local form; the facade rewrites it
/// into a full URI before handing it out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    pub metadata: Metadata,
}

impl Entry {
    pub fn file(path: impl Into<String>, metadata: Metadata) -> Self {
        Self { path: path.into(), kind: EntryKind::File, metadata }
    }

    pub fn directory(path: impl Into<String>, metadata: Metadata) -> Self {
        Self { path: path.into(), kind: EntryKind::Directory, metadata }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    pub fn size(&self) -> Option<u64> {
        self.metadata.size
    }
}

/// One directory visited by `walk`.
///
/// `root` is a path; `dirs` and `files` are bare names inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkEntry {
    pub root: String,
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Result of `du`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskUsage {
    Total(u64),
    PerPath(BTreeMap<String, u64>),
}

impl DiskUsage {
    pub fn total(&self) -> u64 {
        match self {
            DiskUsage::Total(total) => *total,
            DiskUsage::PerPath(sizes) => sizes.values().sum(),
        }
    }
}
