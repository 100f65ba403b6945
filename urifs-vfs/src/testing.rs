// SPDX-License-Identifier: AGPL-3.0-or-later
//! Test doubles shared by the cache and facade tests

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use urifs_core::{
    BackendFactory, BackendParams, BackendRequest, CopyOptions, Entry, FileHandle, FileSystem,
    FindOptions, Metadata, OpenMode, RemoveOptions, UrifsError, UrifsResult,
};
use urifs_providers::{FactoryRegistry, MemoryBackend};

/// Builds memory backends for one scheme, counting constructions and
/// recording what each was built with.
pub(crate) struct RecordingFactory {
    schemes: [&'static str; 1],
    delay: Duration,
    failures_left: AtomicUsize,
    created: AtomicUsize,
    seen: Mutex<Vec<(String, Option<BackendParams>)>>,
}

impl RecordingFactory {
    pub fn new(scheme: &'static str) -> Self {
        Self {
            schemes: [scheme],
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every construction
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Refuse the first `count` constructions
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// `(authority, params)` of every successful construction
    pub fn seen(&self) -> Vec<(String, Option<BackendParams>)> {
        self.seen.lock().clone()
    }

    pub fn registry(self: &Arc<Self>) -> FactoryRegistry {
        let mut registry = FactoryRegistry::with_defaults();
        registry.register(self.clone());
        registry
    }
}

#[async_trait]
impl BackendFactory for RecordingFactory {
    fn schemes(&self) -> &[&'static str] {
        &self.schemes
    }

    async fn create(&self, request: &BackendRequest<'_>) -> UrifsResult<Arc<dyn FileSystem>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let refuse = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(UrifsError::InvalidParams("handshake refused".into()));
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .push((request.authority.to_string(), request.params.cloned()));
        let id = format!("{}://{}", request.scheme, request.authority);
        Ok(Arc::new(MemoryBackend::new(id)))
    }
}

/// Read-only backend whose listings are a fixed set of object keys
pub(crate) struct ListingBackend {
    keys: Vec<String>,
}

fn unsupported<T>(op: &str) -> UrifsResult<T> {
    Err(UrifsError::Unsupported(op.to_string()))
}

#[async_trait]
impl FileSystem for ListingBackend {
    fn id(&self) -> &str {
        "listing"
    }

    async fn mkdir(&self, _: &str, _: bool) -> UrifsResult<()> {
        unsupported("mkdir")
    }
    async fn makedirs(&self, _: &str, _: bool) -> UrifsResult<()> {
        unsupported("makedirs")
    }
    async fn rmdir(&self, _: &str) -> UrifsResult<()> {
        unsupported("rmdir")
    }
    async fn ls(&self, _: &str) -> UrifsResult<Vec<Entry>> {
        Ok(self
            .keys
            .iter()
            .map(|k| Entry::file(k.as_str(), Metadata::new().with_size(k.len() as u64)))
            .collect())
    }
    async fn find(&self, _: &str, _: &FindOptions) -> UrifsResult<Vec<String>> {
        Ok(self.keys.clone())
    }
    async fn glob(&self, _: &str) -> UrifsResult<Vec<String>> {
        Ok(self.keys.clone())
    }
    async fn info(&self, path: &str) -> UrifsResult<Entry> {
        let key = path.trim_start_matches('/');
        if self.keys.iter().any(|k| k == key) {
            Ok(Entry::file(key, Metadata::new().with_size(key.len() as u64)))
        } else if key.is_empty() {
            Ok(Entry::directory("", Metadata::new()))
        } else {
            Err(UrifsError::NotFound(path.to_string()))
        }
    }
    async fn cat(&self, _: &str) -> UrifsResult<Bytes> {
        unsupported("cat")
    }
    async fn pipe_file(&self, _: &str, _: Bytes) -> UrifsResult<()> {
        unsupported("pipe_file")
    }
    async fn copy(&self, _: &str, _: &str, _: &CopyOptions) -> UrifsResult<()> {
        unsupported("copy")
    }
    async fn rm(&self, _: &str, _: &RemoveOptions) -> UrifsResult<()> {
        unsupported("rm")
    }
    async fn open(&self, _: &str, _: OpenMode) -> UrifsResult<FileHandle> {
        unsupported("open")
    }
    async fn touch(&self, _: &str, _: bool) -> UrifsResult<()> {
        unsupported("touch")
    }
}

/// Builds a [`ListingBackend`] with the same keys for every authority
pub(crate) struct ListingFactory {
    schemes: [&'static str; 1],
    keys: Vec<String>,
}

impl ListingFactory {
    pub fn new(scheme: &'static str, keys: &[&str]) -> Self {
        Self {
            schemes: [scheme],
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[async_trait]
impl BackendFactory for ListingFactory {
    fn schemes(&self) -> &[&'static str] {
        &self.schemes
    }

    async fn create(&self, _: &BackendRequest<'_>) -> UrifsResult<Arc<dyn FileSystem>> {
        Ok(Arc::new(ListingBackend { keys: self.keys.clone() }))
    }
}

pub(crate) fn params(value: serde_json::Value) -> BackendParams {
    value.as_object().cloned().unwrap_or_default()
}
