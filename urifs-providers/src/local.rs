//! Local filesystem backend

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use urifs_core::{
    backend::{BackendFactory, BackendRequest, FileHandle, FileSystem},
    entry::{Entry, EntryKind},
    error::{UrifsError, UrifsResult},
    metadata::{Metadata, Permissions},
    operations::*,
};

const READ_CHUNK: usize = 64 * 1024;

/// Local filesystem backend
///
/// Paths are absolute within `root`; with the default root of `/` they are
/// plain host paths. Returned paths are relative to `root` with a leading `/`.
pub struct LocalBackend {
    id: String,
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(id: impl Into<String>, root: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn to_real_path(&self, path: &str) -> PathBuf {
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
        let mut real = self.root.clone();
        real.extend(segments);
        real
    }

    fn to_local_path(&self, real: &Path) -> UrifsResult<String> {
        let relative = real
            .strip_prefix(&self.root)
            .map_err(|_| UrifsError::InvalidPath(real.display().to_string()))?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(format!("/{}", segments.join("/")))
    }

    /// Describes `path` itself. Symlinks are reported as links, dangling or
    /// not; only their size is taken from the target when it exists.
    async fn metadata_from_path(&self, path: &Path) -> UrifsResult<(EntryKind, Metadata)> {
        let meta = fs::symlink_metadata(path).await?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Unknown
        };

        let target_size = if file_type.is_symlink() {
            fs::metadata(path).await.ok().map(|target| target.len())
        } else {
            None
        };

        let mut metadata = Metadata::new();
        metadata.size = Some(target_size.unwrap_or(meta.len()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            metadata.permissions = Some(Permissions::new(meta.mode()));
        }

        if let Ok(modified) = meta.modified() {
            metadata.modified = Some(modified.into());
        }
        if let Ok(created) = meta.created() {
            metadata.created = Some(created.into());
        }
        if let Ok(accessed) = meta.accessed() {
            metadata.accessed = Some(accessed.into());
        }

        Ok((kind, metadata))
    }

    async fn entry(&self, local: &str, real: &Path) -> UrifsResult<Entry> {
        let (kind, metadata) = self.metadata_from_path(real).await.map_err(|e| {
            if e.is_not_found() {
                UrifsError::NotFound(local.to_string())
            } else {
                e
            }
        })?;
        Ok(Entry { path: local.to_string(), kind, metadata })
    }

    /// Walk `real` on the blocking pool, returning real paths.
    async fn walk_real(
        real: PathBuf,
        maxdepth: Option<usize>,
        withdirs: bool,
    ) -> UrifsResult<Vec<PathBuf>> {
        tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            let walker = walkdir::WalkDir::new(&real)
                .min_depth(1)
                .max_depth(maxdepth.unwrap_or(usize::MAX))
                .sort_by_file_name();
            for entry in walker {
                let entry = entry.map_err(|e| UrifsError::Other(e.to_string()))?;
                if entry.file_type().is_dir() && !withdirs {
                    continue;
                }
                found.push(entry.into_path());
            }
            Ok(found)
        })
        .await
        .map_err(|e| UrifsError::Other(e.to_string()))?
    }

    async fn copy_file(src: &Path, dst: &Path) -> UrifsResult<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(src, dst).await?;
        Ok(())
    }
}

#[async_trait]
impl FileSystem for LocalBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn mkdir(&self, path: &str, create_parents: bool) -> UrifsResult<()> {
        let real = self.to_real_path(path);
        if real.exists() {
            return Err(UrifsError::AlreadyExists(path.to_string()));
        }
        if create_parents {
            fs::create_dir_all(&real).await?;
        } else {
            fs::create_dir(&real).await?;
        }
        Ok(())
    }

    async fn makedirs(&self, path: &str, exist_ok: bool) -> UrifsResult<()> {
        let real = self.to_real_path(path);
        if real.exists() && !exist_ok {
            return Err(UrifsError::AlreadyExists(path.to_string()));
        }
        if real.is_file() {
            return Err(UrifsError::NotADirectory(path.to_string()));
        }
        fs::create_dir_all(&real).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> UrifsResult<()> {
        let real = self.to_real_path(path);
        if !real.is_dir() {
            return Err(UrifsError::NotADirectory(path.to_string()));
        }
        if fs::read_dir(&real).await?.next_entry().await?.is_some() {
            return Err(UrifsError::DirectoryNotEmpty(path.to_string()));
        }
        fs::remove_dir(&real).await?;
        Ok(())
    }

    async fn ls(&self, path: &str) -> UrifsResult<Vec<Entry>> {
        let real = self.to_real_path(path);
        if real.is_file() {
            return Ok(vec![self.entry(&self.to_local_path(&real)?, &real).await?]);
        }
        if !real.is_dir() {
            return Err(UrifsError::NotFound(path.to_string()));
        }

        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&real).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let entry_path = entry.path();
            let local = self.to_local_path(&entry_path)?;
            entries.push(self.entry(&local, &entry_path).await?);
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn find(&self, path: &str, options: &FindOptions) -> UrifsResult<Vec<String>> {
        let real = self.to_real_path(path);
        if real.is_file() {
            return Ok(vec![self.to_local_path(&real)?]);
        }
        if !real.is_dir() {
            return Ok(Vec::new());
        }
        Self::walk_real(real, options.maxdepth, options.withdirs)
            .await?
            .iter()
            .map(|p| self.to_local_path(p))
            .collect()
    }

    async fn glob(&self, pattern: &str) -> UrifsResult<Vec<String>> {
        let root = self.root.to_string_lossy();
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(root.trim_end_matches('/')),
            pattern.trim_start_matches('/')
        );
        let matches = tokio::task::spawn_blocking(move || -> UrifsResult<Vec<PathBuf>> {
            let paths = glob::glob(&full).map_err(|e| UrifsError::InvalidPath(e.to_string()))?;
            Ok(paths.filter_map(Result::ok).collect())
        })
        .await
        .map_err(|e| UrifsError::Other(e.to_string()))??;

        let mut found = matches
            .iter()
            .map(|p| self.to_local_path(p))
            .collect::<UrifsResult<Vec<_>>>()?;
        found.sort();
        Ok(found)
    }

    async fn info(&self, path: &str) -> UrifsResult<Entry> {
        let real = self.to_real_path(path);
        let local = self.to_local_path(&real)?;
        self.entry(&local, &real).await
    }

    // Links are followed here, so a link to a directory still walks
    async fn isdir(&self, path: &str) -> UrifsResult<bool> {
        Ok(fs::metadata(self.to_real_path(path))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn isfile(&self, path: &str) -> UrifsResult<bool> {
        Ok(fs::metadata(self.to_real_path(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn cat(&self, path: &str) -> UrifsResult<Bytes> {
        let real = self.to_real_path(path);
        if !real.is_file() {
            return Err(UrifsError::NotAFile(path.to_string()));
        }
        Ok(Bytes::from(fs::read(&real).await?))
    }

    async fn pipe_file(&self, path: &str, data: Bytes) -> UrifsResult<()> {
        let real = self.to_real_path(path);
        if real.is_dir() {
            return Err(UrifsError::NotAFile(path.to_string()));
        }
        if let Some(parent) = real.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&real, &data).await?;
        Ok(())
    }

    async fn copy(&self, source: &str, dest: &str, options: &CopyOptions) -> UrifsResult<()> {
        let src_real = self.to_real_path(source);
        let dst_real = self.to_real_path(dest);

        if !src_real.exists() {
            return Err(UrifsError::NotFound(source.to_string()));
        }
        if !src_real.is_dir() {
            return Self::copy_file(&src_real, &dst_real).await;
        }
        if !options.recursive {
            return Err(UrifsError::NotAFile(source.to_string()));
        }

        fs::create_dir_all(&dst_real).await?;
        for src in Self::walk_real(src_real.clone(), None, true).await? {
            let relative = src
                .strip_prefix(&src_real)
                .map_err(|_| UrifsError::InvalidPath(src.display().to_string()))?;
            let dst = dst_real.join(relative);
            if src.is_dir() {
                fs::create_dir_all(&dst).await?;
            } else {
                Self::copy_file(&src, &dst).await?;
            }
        }
        Ok(())
    }

    async fn rm(&self, path: &str, options: &RemoveOptions) -> UrifsResult<()> {
        let real = self.to_real_path(path);

        if !real.exists() {
            return Err(UrifsError::NotFound(path.to_string()));
        }

        if real.is_dir() {
            if options.recursive {
                fs::remove_dir_all(&real).await?;
            } else {
                fs::remove_dir(&real).await?;
            }
        } else {
            fs::remove_file(&real).await?;
        }
        Ok(())
    }

    async fn open(&self, path: &str, mode: OpenMode) -> UrifsResult<FileHandle> {
        let real = self.to_real_path(path);
        let mut options = fs::OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.read(true).write(true).create(true).truncate(true),
            OpenMode::Append => options.read(true).append(true).create(true),
        };
        let file = options.open(&real).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UrifsError::NotFound(path.to_string())
            } else {
                UrifsError::Io(e)
            }
        })?;
        Ok(Box::new(file))
    }

    async fn touch(&self, path: &str, truncate: bool) -> UrifsResult<()> {
        let real = self.to_real_path(path);
        if truncate || !real.exists() {
            fs::write(&real, b"").await?;
            return Ok(());
        }
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let file = std::fs::OpenOptions::new().append(true).open(&real)?;
            file.set_modified(std::time::SystemTime::now())
        })
        .await
        .map_err(|e| UrifsError::Other(e.to_string()))??;
        Ok(())
    }

    async fn checksum(&self, path: &str) -> UrifsResult<String> {
        let real = self.to_real_path(path);
        if !real.is_file() {
            return Err(UrifsError::NotAFile(path.to_string()));
        }
        let mut file = fs::File::open(&real).await?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; READ_CHUNK];
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    async fn head(&self, path: &str, size: usize) -> UrifsResult<Bytes> {
        let real = self.to_real_path(path);
        let file = fs::File::open(&real).await?;
        let mut buffer = Vec::with_capacity(size);
        file.take(size as u64).read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }

    async fn tail(&self, path: &str, size: usize) -> UrifsResult<Bytes> {
        let real = self.to_real_path(path);
        let mut file = fs::File::open(&real).await?;
        let len = file.metadata().await?.len();
        file.seek(std::io::SeekFrom::Start(len.saturating_sub(size as u64)))
            .await?;
        let mut buffer = Vec::with_capacity(size);
        file.read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}

/// Builds [`LocalBackend`]s for `file://` and `local://`.
///
/// Accepts an empty authority or `localhost`. Optional parameter `root`
/// confines the backend to a directory.
#[derive(Debug, Default)]
pub struct LocalFactory;

#[async_trait]
impl BackendFactory for LocalFactory {
    fn schemes(&self) -> &[&'static str] {
        &["file", "local"]
    }

    async fn create(&self, request: &BackendRequest<'_>) -> UrifsResult<Arc<dyn FileSystem>> {
        if !matches!(request.authority, "" | "localhost") {
            return Err(UrifsError::InvalidParams(format!(
                "local paths cannot name a remote host '{}'",
                request.authority
            )));
        }

        let root = PathBuf::from(request.param_str("root")?.unwrap_or("/"));
        if !root.is_absolute() {
            return Err(UrifsError::InvalidParams(format!(
                "root must be absolute, got {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(UrifsError::NotFound(root.display().to_string()));
        }

        tracing::debug!(root = %root.display(), "local backend");
        Ok(Arc::new(LocalBackend::new(request.scheme, root)))
    }
}
