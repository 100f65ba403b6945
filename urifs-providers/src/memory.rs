//! In-memory backend
//!
//! Each instance is an independent tree; with the backend cache keyed by
//! authority, `memory://a/...` and `memory://b/...` never see each other's
//! files. Everything is lost when the instance is dropped.
//!
//! Paths are reported without a leading slash (`dir/file.txt`), the way
//! object stores report keys.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};
use urifs_core::{
    backend::{BackendFactory, BackendRequest, FileHandle, FileSystem},
    entry::Entry,
    error::{UrifsError, UrifsResult},
    metadata::Metadata,
    operations::*,
};

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Bytes,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
    Directory {
        created: DateTime<Utc>,
    },
}

impl Node {
    fn file(data: Bytes) -> Self {
        let now = Utc::now();
        Node::File { data, created: now, modified: now }
    }

    fn directory() -> Self {
        Node::Directory { created: Utc::now() }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    fn to_entry(&self, key: &str) -> Entry {
        match self {
            Node::File { data, created, modified } => {
                let mut metadata = Metadata::new().with_size(data.len() as u64);
                metadata.created = Some(*created);
                metadata.modified = Some(*modified);
                Entry::file(key, metadata)
            }
            Node::Directory { created } => {
                let mut metadata = Metadata::new().with_size(0);
                metadata.created = Some(*created);
                Entry::directory(key, metadata)
            }
        }
    }
}

/// Keys are normalized paths without leading or trailing slashes; `""` is
/// the root and always exists.
type Tree = BTreeMap<String, Node>;

fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for part in path.split('/').filter(|s| !s.is_empty()) {
        match part {
            "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(part),
        }
    }
    segments.join("/")
}

fn child_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

/// Every key strictly below `key`
fn descendants<'a>(tree: &'a Tree, key: &str) -> impl Iterator<Item = (&'a String, &'a Node)> {
    let prefix = child_prefix(key);
    tree.range(prefix.clone()..)
        .take_while(move |(k, _)| k.starts_with(&prefix))
        .filter(|(k, _)| !k.is_empty())
}

/// Number of segments `descendant` sits below `key`
fn depth_below(key: &str, descendant: &str) -> usize {
    let rest = if key.is_empty() { descendant } else { &descendant[key.len() + 1..] };
    rest.split('/').count()
}

fn ensure_parents(tree: &mut Tree, key: &str) -> UrifsResult<()> {
    let mut current = String::new();
    let segments: Vec<&str> = key.split('/').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        match tree.get(&current) {
            Some(Node::File { .. }) => return Err(UrifsError::NotADirectory(current)),
            Some(Node::Directory { .. }) => {}
            None => {
                tree.insert(current.clone(), Node::directory());
            }
        }
    }
    Ok(())
}

fn write_file(tree: &mut Tree, key: &str, data: Bytes) -> UrifsResult<()> {
    if key.is_empty() {
        return Err(UrifsError::NotAFile("/".into()));
    }
    ensure_parents(tree, key)?;
    match tree.get_mut(key) {
        Some(Node::Directory { .. }) => Err(UrifsError::NotAFile(key.to_string())),
        Some(Node::File { data: existing, modified, .. }) => {
            *existing = data;
            *modified = Utc::now();
            Ok(())
        }
        None => {
            tree.insert(key.to_string(), Node::file(data));
            Ok(())
        }
    }
}

/// In-memory backend
pub struct MemoryBackend {
    id: String,
    read_only: bool,
    tree: Arc<RwLock<Tree>>,
}

impl MemoryBackend {
    pub fn new(id: impl Into<String>) -> Self {
        let mut tree = Tree::new();
        tree.insert(String::new(), Node::directory());
        Self {
            id: id.into(),
            read_only: false,
            tree: Arc::new(RwLock::new(tree)),
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    fn check_writable(&self, path: &str) -> UrifsResult<()> {
        if self.read_only {
            Err(UrifsError::PermissionDenied(format!("{}: {path} is read-only", self.id)))
        } else {
            Ok(())
        }
    }

    fn get(&self, path: &str) -> UrifsResult<(String, Node)> {
        let key = normalize(path);
        let node = self
            .tree
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| UrifsError::NotFound(path.to_string()))?;
        Ok((key, node))
    }
}

#[async_trait]
impl FileSystem for MemoryBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn mkdir(&self, path: &str, create_parents: bool) -> UrifsResult<()> {
        self.check_writable(path)?;
        let key = normalize(path);
        let mut tree = self.tree.write();
        if tree.contains_key(&key) {
            return Err(UrifsError::AlreadyExists(path.to_string()));
        }
        if create_parents {
            ensure_parents(&mut tree, &key)?;
        } else {
            let parent = key.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
            match tree.get(parent) {
                Some(node) if node.is_dir() => {}
                Some(_) => return Err(UrifsError::NotADirectory(parent.to_string())),
                None => return Err(UrifsError::NotFound(parent.to_string())),
            }
        }
        tree.insert(key, Node::directory());
        Ok(())
    }

    async fn makedirs(&self, path: &str, exist_ok: bool) -> UrifsResult<()> {
        self.check_writable(path)?;
        let key = normalize(path);
        let mut tree = self.tree.write();
        match tree.get(&key) {
            Some(Node::File { .. }) => Err(UrifsError::NotADirectory(path.to_string())),
            Some(Node::Directory { .. }) if !exist_ok => {
                Err(UrifsError::AlreadyExists(path.to_string()))
            }
            Some(Node::Directory { .. }) => Ok(()),
            None => {
                ensure_parents(&mut tree, &key)?;
                tree.insert(key, Node::directory());
                Ok(())
            }
        }
    }

    async fn rmdir(&self, path: &str) -> UrifsResult<()> {
        self.check_writable(path)?;
        let key = normalize(path);
        if key.is_empty() {
            return Err(UrifsError::InvalidPath("cannot remove the root".into()));
        }
        let mut tree = self.tree.write();
        match tree.get(&key) {
            None => return Err(UrifsError::NotFound(path.to_string())),
            Some(Node::File { .. }) => return Err(UrifsError::NotADirectory(path.to_string())),
            Some(Node::Directory { .. }) => {}
        }
        if descendants(&tree, &key).next().is_some() {
            return Err(UrifsError::DirectoryNotEmpty(path.to_string()));
        }
        tree.remove(&key);
        Ok(())
    }

    async fn ls(&self, path: &str) -> UrifsResult<Vec<Entry>> {
        let (key, node) = self.get(path)?;
        if !node.is_dir() {
            return Ok(vec![node.to_entry(&key)]);
        }
        let tree = self.tree.read();
        let entries = descendants(&tree, &key)
            .filter(|(k, _)| depth_below(&key, k) == 1)
            .map(|(k, n)| n.to_entry(k))
            .collect();
        Ok(entries)
    }

    async fn find(&self, path: &str, options: &FindOptions) -> UrifsResult<Vec<String>> {
        let key = normalize(path);
        let tree = self.tree.read();
        let found = match tree.get(&key) {
            None => Vec::new(),
            Some(Node::File { .. }) => vec![key],
            Some(Node::Directory { .. }) => descendants(&tree, &key)
                .filter(|(_, n)| options.withdirs || !n.is_dir())
                .filter(|(k, _)| {
                    options.maxdepth.map_or(true, |max| depth_below(&key, k) <= max)
                })
                .map(|(k, _)| k.clone())
                .collect(),
        };
        Ok(found)
    }

    async fn glob(&self, pattern: &str) -> UrifsResult<Vec<String>> {
        let pattern = glob::Pattern::new(&normalize(pattern))
            .map_err(|e| UrifsError::InvalidPath(e.to_string()))?;
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..Default::default()
        };
        Ok(self
            .tree
            .read()
            .keys()
            .filter(|k| !k.is_empty() && pattern.matches_with(k, options))
            .cloned()
            .collect())
    }

    async fn info(&self, path: &str) -> UrifsResult<Entry> {
        let (key, node) = self.get(path)?;
        Ok(node.to_entry(&key))
    }

    async fn cat(&self, path: &str) -> UrifsResult<Bytes> {
        match self.get(path)? {
            (_, Node::File { data, .. }) => Ok(data),
            (_, Node::Directory { .. }) => Err(UrifsError::NotAFile(path.to_string())),
        }
    }

    async fn pipe_file(&self, path: &str, data: Bytes) -> UrifsResult<()> {
        self.check_writable(path)?;
        write_file(&mut self.tree.write(), &normalize(path), data)
    }

    async fn copy(&self, source: &str, dest: &str, options: &CopyOptions) -> UrifsResult<()> {
        self.check_writable(dest)?;
        let src = normalize(source);
        let dst = normalize(dest);
        let mut tree = self.tree.write();

        match tree.get(&src).cloned() {
            None => Err(UrifsError::NotFound(source.to_string())),
            Some(Node::File { data, .. }) => write_file(&mut tree, &dst, data),
            Some(Node::Directory { .. }) if !options.recursive => {
                Err(UrifsError::NotAFile(source.to_string()))
            }
            Some(Node::Directory { .. }) => {
                let copies: Vec<(String, Node)> = descendants(&tree, &src)
                    .map(|(k, n)| (k[src.len()..].trim_start_matches('/').to_string(), n.clone()))
                    .collect();
                if !tree.contains_key(&dst) {
                    ensure_parents(&mut tree, &dst)?;
                    tree.insert(dst.clone(), Node::directory());
                }
                for (relative, node) in copies {
                    let target = format!("{}{relative}", child_prefix(&dst));
                    match node {
                        Node::File { data, .. } => write_file(&mut tree, &target, data)?,
                        Node::Directory { .. } => {
                            tree.entry(target).or_insert_with(Node::directory);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    async fn rm(&self, path: &str, options: &RemoveOptions) -> UrifsResult<()> {
        self.check_writable(path)?;
        let key = normalize(path);
        let mut tree = self.tree.write();
        match tree.get(&key) {
            None => return Err(UrifsError::NotFound(path.to_string())),
            Some(Node::File { .. }) => {
                tree.remove(&key);
                return Ok(());
            }
            Some(Node::Directory { .. }) => {}
        }

        let children: Vec<String> = descendants(&tree, &key).map(|(k, _)| k.clone()).collect();
        if !children.is_empty() && !options.recursive {
            return Err(UrifsError::DirectoryNotEmpty(path.to_string()));
        }
        for child in children {
            tree.remove(&child);
        }
        if !key.is_empty() {
            tree.remove(&key);
        }
        Ok(())
    }

    async fn open(&self, path: &str, mode: OpenMode) -> UrifsResult<FileHandle> {
        let key = normalize(path);
        if mode.is_write() {
            self.check_writable(path)?;
        }

        let mut tree = self.tree.write();
        let existing = match tree.get(&key) {
            Some(Node::Directory { .. }) => return Err(UrifsError::NotAFile(path.to_string())),
            Some(Node::File { data, .. }) => Some(data.clone()),
            None => None,
        };

        let file = match mode {
            OpenMode::Read => {
                let data = existing.ok_or_else(|| UrifsError::NotFound(path.to_string()))?;
                MemoryFile::reader(data)
            }
            OpenMode::Write => {
                write_file(&mut tree, &key, Bytes::new())?;
                MemoryFile::writer(Vec::new(), self.tree.clone(), key)
            }
            OpenMode::Append => {
                let data = existing.map(|d| d.to_vec()).unwrap_or_default();
                if !tree.contains_key(&key) {
                    write_file(&mut tree, &key, Bytes::new())?;
                }
                MemoryFile::writer(data, self.tree.clone(), key)
            }
        };
        Ok(Box::new(file))
    }

    async fn touch(&self, path: &str, truncate: bool) -> UrifsResult<()> {
        self.check_writable(path)?;
        let key = normalize(path);
        let mut tree = self.tree.write();
        match tree.get_mut(&key) {
            Some(Node::File { data, modified, .. }) => {
                if truncate {
                    *data = Bytes::new();
                }
                *modified = Utc::now();
                Ok(())
            }
            Some(Node::Directory { .. }) => Err(UrifsError::NotAFile(path.to_string())),
            None => write_file(&mut tree, &key, Bytes::new()),
        }
    }
}

/// Handle returned by [`MemoryBackend::open`].
///
/// Reads and writes go to a private buffer. Writers publish the buffer back
/// to the tree on `flush`, `shutdown` and drop, as long as the file they
/// opened is still there.
pub struct MemoryFile {
    buffer: Cursor<Vec<u8>>,
    target: Option<(Arc<RwLock<Tree>>, String)>,
    dirty: bool,
}

impl MemoryFile {
    fn reader(data: Bytes) -> Self {
        Self { buffer: Cursor::new(data.to_vec()), target: None, dirty: false }
    }

    fn writer(initial: Vec<u8>, tree: Arc<RwLock<Tree>>, key: String) -> Self {
        let mut buffer = Cursor::new(initial);
        buffer.set_position(buffer.get_ref().len() as u64);
        Self { buffer, target: Some((tree, key)), dirty: false }
    }

    fn commit(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some((tree, key)) = &self.target {
            match tree.write().get_mut(key) {
                Some(Node::File { data, modified, .. }) => {
                    *data = Bytes::copy_from_slice(self.buffer.get_ref());
                    *modified = Utc::now();
                }
                // removed while open: writes go nowhere, like an unlinked file
                _ => {
                    tracing::debug!(key = %key, "memory file removed while open, discarding writes")
                }
            }
        }
        self.dirty = false;
        Ok(())
    }
}

impl AsyncRead for MemoryFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().buffer).poll_read(cx, buf)
    }
}

impl AsyncSeek for MemoryFile {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().buffer).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().buffer).poll_complete(cx)
    }
}

impl AsyncWrite for MemoryFile {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.target.is_none() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file was opened for reading",
            )));
        }
        this.dirty = true;
        Pin::new(&mut this.buffer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.get_mut().commit())
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(self.get_mut().commit())
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            tracing::warn!(error = %e, "dropping unsaved memory file contents");
        }
    }
}

/// Builds [`MemoryBackend`]s for `memory://`. Optional parameter
/// `read_only` (bool).
#[derive(Debug, Default)]
pub struct MemoryFactory;

#[async_trait]
impl BackendFactory for MemoryFactory {
    fn schemes(&self) -> &[&'static str] {
        &["memory"]
    }

    async fn create(&self, request: &BackendRequest<'_>) -> UrifsResult<Arc<dyn FileSystem>> {
        let read_only = request.param_bool("read_only")?.unwrap_or(false);
        let id = format!("{}://{}", request.scheme, request.authority);
        Ok(Arc::new(MemoryBackend::new(id).read_only(read_only)))
    }
}
