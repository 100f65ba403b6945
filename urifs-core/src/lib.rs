//! URIFS Core
//!
//! Core traits and types for addressing any storage backend by URI: the
//! URI parser, the credential registry, the `FileSystem` operation contract
//! and the factory trait backends are built through.

pub mod backend;
pub mod config;
pub mod credentials;
pub mod entry;
pub mod error;
pub mod metadata;
pub mod operations;
pub mod uri;

pub use backend::{BackendFactory, BackendRequest, FileHandle, FileStream, FileSystem};
pub use config::UrifsConfig;
pub use credentials::{BackendParams, Credential, CredentialRegistry, CredentialTable};
pub use entry::{DiskUsage, Entry, EntryKind, WalkEntry};
pub use error::{UrifsError, UrifsResult};
pub use metadata::{Metadata, Permissions};
pub use operations::{CopyOptions, DuOptions, FindOptions, OpenMode, RemoveOptions};
pub use uri::Uri;
