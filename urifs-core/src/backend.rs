//! The file system contract and backend factories

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

use crate::{
    credentials::BackendParams,
    entry::{DiskUsage, Entry, EntryKind, WalkEntry},
    error::{UrifsError, UrifsResult},
    operations::*,
};

/// Anything `open` can hand back: readable, writable and seekable.
pub trait FileStream: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

impl<T> FileStream for T where T: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {}

/// An open file. Dropping the handle releases it on every path, including
/// early returns on error.
pub type FileHandle = Box<dyn FileStream>;

/// The uniform operation set.
///
/// Backends implement it over local, scheme-stripped paths. The facade
/// implements it over full URIs and re-qualifies every path it returns.
/// Operations with a default body are derived from the required ones; a
/// backend overrides them when it can do better.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Short identifier used in logs, e.g. `file` or `memory://scratch`
    fn id(&self) -> &str;

    async fn mkdir(&self, path: &str, create_parents: bool) -> UrifsResult<()>;
    async fn makedirs(&self, path: &str, exist_ok: bool) -> UrifsResult<()>;
    async fn rmdir(&self, path: &str) -> UrifsResult<()>;
    async fn ls(&self, path: &str) -> UrifsResult<Vec<Entry>>;
    async fn find(&self, path: &str, options: &FindOptions) -> UrifsResult<Vec<String>>;
    async fn glob(&self, pattern: &str) -> UrifsResult<Vec<String>>;
    async fn info(&self, path: &str) -> UrifsResult<Entry>;
    async fn cat(&self, path: &str) -> UrifsResult<Bytes>;
    async fn pipe_file(&self, path: &str, data: Bytes) -> UrifsResult<()>;
    async fn copy(&self, source: &str, dest: &str, options: &CopyOptions) -> UrifsResult<()>;
    async fn rm(&self, path: &str, options: &RemoveOptions) -> UrifsResult<()>;
    async fn open(&self, path: &str, mode: OpenMode) -> UrifsResult<FileHandle>;
    async fn touch(&self, path: &str, truncate: bool) -> UrifsResult<()>;

    /// Top-down walk. Each visited directory yields its path plus the bare
    /// names of its subdirectories and files.
    async fn walk(&self, path: &str, maxdepth: Option<usize>) -> UrifsResult<Vec<WalkEntry>> {
        let mut visited = Vec::new();
        if !self.isdir(path).await? {
            return Ok(visited);
        }

        let mut pending = vec![(path.to_string(), 1usize)];
        while let Some((root, depth)) = pending.pop() {
            let mut dirs = Vec::new();
            let mut files = Vec::new();
            let mut subdirs = Vec::new();
            for entry in self.ls(&root).await? {
                if entry.is_directory() {
                    dirs.push(entry.name().to_string());
                    subdirs.push(entry.path);
                } else {
                    files.push(entry.name().to_string());
                }
            }
            if maxdepth.map_or(true, |max| depth < max) {
                pending.extend(subdirs.into_iter().rev().map(|dir| (dir, depth + 1)));
            }
            visited.push(WalkEntry { root, dirs, files });
        }
        Ok(visited)
    }

    async fn du(&self, path: &str, options: &DuOptions) -> UrifsResult<DiskUsage> {
        let find = FindOptions { maxdepth: options.maxdepth, withdirs: false };
        let mut sizes = std::collections::BTreeMap::new();
        for file in self.find(path, &find).await? {
            let size = self.size(&file).await?;
            sizes.insert(file, size);
        }
        if options.total {
            Ok(DiskUsage::Total(sizes.values().sum()))
        } else {
            Ok(DiskUsage::PerPath(sizes))
        }
    }

    async fn exists(&self, path: &str) -> UrifsResult<bool> {
        match self.info(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// BLAKE3 of the file content, hex encoded
    async fn checksum(&self, path: &str) -> UrifsResult<String> {
        let data = self.cat(path).await?;
        Ok(blake3::hash(&data).to_hex().to_string())
    }

    async fn size(&self, path: &str) -> UrifsResult<u64> {
        Ok(self.info(path).await?.metadata.size.unwrap_or(0))
    }

    async fn sizes(&self, paths: &[String]) -> UrifsResult<Vec<u64>> {
        let mut sizes = Vec::with_capacity(paths.len());
        for path in paths {
            sizes.push(self.size(path).await?);
        }
        Ok(sizes)
    }

    async fn isdir(&self, path: &str) -> UrifsResult<bool> {
        is_kind(self, path, EntryKind::Directory).await
    }

    async fn isfile(&self, path: &str) -> UrifsResult<bool> {
        is_kind(self, path, EntryKind::File).await
    }

    /// Write several files at once
    async fn pipe(&self, files: Vec<(String, Bytes)>) -> UrifsResult<()> {
        for (path, data) in files {
            self.pipe_file(&path, data).await?;
        }
        Ok(())
    }

    async fn head(&self, path: &str, size: usize) -> UrifsResult<Bytes> {
        let data = self.cat(path).await?;
        Ok(data.slice(..size.min(data.len())))
    }

    async fn tail(&self, path: &str, size: usize) -> UrifsResult<Bytes> {
        let data = self.cat(path).await?;
        Ok(data.slice(data.len().saturating_sub(size)..))
    }
}

async fn is_kind<F>(fs: &F, path: &str, kind: EntryKind) -> UrifsResult<bool>
where
    F: FileSystem + ?Sized,
{
    match fs.info(path).await {
        Ok(entry) => Ok(entry.kind == kind),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// What a factory is asked to build
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    pub scheme: &'a str,
    /// Backends receive authority-relative paths, so they are bound to one
    pub authority: &'a str,
    /// `None` when no credential entry matched
    pub params: Option<&'a BackendParams>,
}

impl<'a> BackendRequest<'a> {
    pub fn param(&self, key: &str) -> Option<&'a serde_json::Value> {
        self.params.and_then(|p| p.get(key))
    }

    pub fn param_str(&self, key: &str) -> UrifsResult<Option<&'a str>> {
        match self.param(key) {
            None => Ok(None),
            Some(value) => value.as_str().map(Some).ok_or_else(|| {
                UrifsError::InvalidParams(format!("'{key}' must be a string"))
            }),
        }
    }

    pub fn param_bool(&self, key: &str) -> UrifsResult<Option<bool>> {
        match self.param(key) {
            None => Ok(None),
            Some(value) => value.as_bool().map(Some).ok_or_else(|| {
                UrifsError::InvalidParams(format!("'{key}' must be a boolean"))
            }),
        }
    }
}

/// Builds backend instances for one or more schemes
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Schemes this factory serves, lower-case
    fn schemes(&self) -> &[&'static str];

    /// Construct a backend. May perform I/O such as an authentication
    /// handshake.
    async fn create(&self, request: &BackendRequest<'_>) -> UrifsResult<Arc<dyn FileSystem>>;
}
