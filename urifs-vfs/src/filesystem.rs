// SPDX-License-Identifier: AGPL-3.0-or-later
//! The URI-addressed facade

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use urifs_core::{
    CopyOptions, CredentialRegistry, CredentialTable, DiskUsage, DuOptions, Entry, FileHandle,
    FileSystem, FindOptions, OpenMode, RemoveOptions, UrifsConfig, UrifsError, UrifsResult, Uri,
    WalkEntry,
};
use urifs_providers::FactoryRegistry;

use crate::container::FileSystemContainer;
use crate::qualify::Qualify;

/// A [`FileSystem`] over full URIs.
///
/// Each call parses its URI arguments, resolves the backend through the
/// owned [`FileSystemContainer`], forwards the scheme-stripped path, and
/// re-qualifies any paths in the result. Backend errors pass through as
/// they are.
#[derive(Debug)]
pub struct UriFilesystem {
    filesystems: FileSystemContainer,
}

/// Consecutive arguments served by one backend, with their positions
struct Batch {
    backend: Arc<dyn FileSystem>,
    items: Vec<(usize, Uri)>,
}

impl UriFilesystem {
    /// Facade over every provider compiled into this build
    pub fn new(credentials: Option<CredentialTable>) -> UrifsResult<Self> {
        Self::with_factories(credentials, FactoryRegistry::with_defaults())
    }

    pub fn with_factories(
        credentials: Option<CredentialTable>,
        factories: FactoryRegistry,
    ) -> UrifsResult<Self> {
        let credentials = CredentialRegistry::new(credentials.unwrap_or_default())?;
        Ok(Self {
            filesystems: FileSystemContainer::new(credentials, factories),
        })
    }

    pub fn from_config(config: &UrifsConfig) -> UrifsResult<Self> {
        Ok(Self {
            filesystems: FileSystemContainer::new(
                config.credential_registry()?,
                FactoryRegistry::with_defaults(),
            ),
        })
    }

    pub fn container(&self) -> &FileSystemContainer {
        &self.filesystems
    }

    /// Backend instance serving `uri`
    pub async fn backend(&self, uri: &str) -> UrifsResult<Arc<dyn FileSystem>> {
        self.filesystems.get(uri).await
    }

    async fn resolve(&self, uri: &str) -> UrifsResult<(Arc<dyn FileSystem>, Uri)> {
        self.filesystems.resolve(uri).await
    }

    /// Group `uris` into runs that share a backend instance, keeping order.
    async fn batches<'a>(&self, uris: impl Iterator<Item = &'a str>) -> UrifsResult<Vec<Batch>> {
        let mut batches: Vec<Batch> = Vec::new();
        for (index, uri) in uris.enumerate() {
            let (backend, parsed) = self.resolve(uri).await?;
            match batches.last_mut() {
                Some(batch) if Arc::ptr_eq(&batch.backend, &backend) => {
                    batch.items.push((index, parsed));
                }
                _ => batches.push(Batch {
                    backend,
                    items: vec![(index, parsed)],
                }),
            }
        }
        Ok(batches)
    }

    /// Copy between two different backend instances by reading through
    /// this process.
    async fn copy_across(
        &self,
        source: (&Arc<dyn FileSystem>, &Uri),
        dest: (&Arc<dyn FileSystem>, &Uri),
        options: &CopyOptions,
    ) -> UrifsResult<()> {
        let (src_fs, src) = source;
        let (dst_fs, dst) = dest;

        let root = src_fs.info(src.local_path()).await?;
        if !root.is_directory() {
            let data = src_fs.cat(src.local_path()).await?;
            return dst_fs.pipe_file(dst.local_path(), data).await;
        }
        if !options.recursive {
            return Err(UrifsError::NotAFile(src.to_string()));
        }

        dst_fs.makedirs(dst.local_path(), true).await?;
        let find = FindOptions { maxdepth: None, withdirs: true };
        // `find` reports paths the way the backend spells them, so the base
        // has to come from the backend too
        let root = Uri::parse(&src.qualify(&root.path))?;
        let base = root.path.trim_end_matches('/');
        for found in src_fs.find(src.local_path(), &find).await? {
            let item = Uri::parse(&src.qualify(&found))?;
            let Some(relative) = item.path.strip_prefix(base) else {
                return Err(UrifsError::InvalidPath(item.to_string()));
            };
            let target = dst.join(relative);
            if src_fs.isdir(item.local_path()).await? {
                dst_fs.makedirs(target.local_path(), true).await?;
            } else {
                let data = src_fs.cat(item.local_path()).await?;
                dst_fs.pipe_file(target.local_path(), data).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystem for UriFilesystem {
    fn id(&self) -> &str {
        "urifs"
    }

    async fn mkdir(&self, path: &str, create_parents: bool) -> UrifsResult<()> {
        let (fs, uri) = self.resolve(path).await?;
        fs.mkdir(uri.local_path(), create_parents).await
    }

    async fn makedirs(&self, path: &str, exist_ok: bool) -> UrifsResult<()> {
        let (fs, uri) = self.resolve(path).await?;
        fs.makedirs(uri.local_path(), exist_ok).await
    }

    async fn rmdir(&self, path: &str) -> UrifsResult<()> {
        let (fs, uri) = self.resolve(path).await?;
        fs.rmdir(uri.local_path()).await
    }

    async fn ls(&self, path: &str) -> UrifsResult<Vec<Entry>> {
        let (fs, uri) = self.resolve(path).await?;
        Ok(fs.ls(uri.local_path()).await?.qualify(&uri))
    }

    async fn find(&self, path: &str, options: &FindOptions) -> UrifsResult<Vec<String>> {
        let (fs, uri) = self.resolve(path).await?;
        Ok(fs.find(uri.local_path(), options).await?.qualify(&uri))
    }

    async fn glob(&self, pattern: &str) -> UrifsResult<Vec<String>> {
        let (fs, uri) = self.resolve(pattern).await?;
        Ok(fs.glob(uri.local_path()).await?.qualify(&uri))
    }

    async fn info(&self, path: &str) -> UrifsResult<Entry> {
        let (fs, uri) = self.resolve(path).await?;
        Ok(fs.info(uri.local_path()).await?.qualify(&uri))
    }

    async fn cat(&self, path: &str) -> UrifsResult<Bytes> {
        let (fs, uri) = self.resolve(path).await?;
        fs.cat(uri.local_path()).await
    }

    async fn pipe_file(&self, path: &str, data: Bytes) -> UrifsResult<()> {
        let (fs, uri) = self.resolve(path).await?;
        fs.pipe_file(uri.local_path(), data).await
    }

    async fn copy(&self, source: &str, dest: &str, options: &CopyOptions) -> UrifsResult<()> {
        let (src_fs, src) = self.resolve(source).await?;
        let (dst_fs, dst) = self.resolve(dest).await?;
        if Arc::ptr_eq(&src_fs, &dst_fs) {
            return src_fs.copy(src.local_path(), dst.local_path(), options).await;
        }
        tracing::debug!(from = src_fs.id(), to = dst_fs.id(), "copying across backends");
        self.copy_across((&src_fs, &src), (&dst_fs, &dst), options).await
    }

    async fn rm(&self, path: &str, options: &RemoveOptions) -> UrifsResult<()> {
        let (fs, uri) = self.resolve(path).await?;
        fs.rm(uri.local_path(), options).await
    }

    async fn open(&self, path: &str, mode: OpenMode) -> UrifsResult<FileHandle> {
        let (fs, uri) = self.resolve(path).await?;
        fs.open(uri.local_path(), mode).await
    }

    async fn touch(&self, path: &str, truncate: bool) -> UrifsResult<()> {
        let (fs, uri) = self.resolve(path).await?;
        fs.touch(uri.local_path(), truncate).await
    }

    async fn walk(&self, path: &str, maxdepth: Option<usize>) -> UrifsResult<Vec<WalkEntry>> {
        let (fs, uri) = self.resolve(path).await?;
        Ok(fs.walk(uri.local_path(), maxdepth).await?.qualify(&uri))
    }

    async fn du(&self, path: &str, options: &DuOptions) -> UrifsResult<DiskUsage> {
        let (fs, uri) = self.resolve(path).await?;
        Ok(fs.du(uri.local_path(), options).await?.qualify(&uri))
    }

    async fn exists(&self, path: &str) -> UrifsResult<bool> {
        let (fs, uri) = self.resolve(path).await?;
        fs.exists(uri.local_path()).await
    }

    async fn checksum(&self, path: &str) -> UrifsResult<String> {
        let (fs, uri) = self.resolve(path).await?;
        fs.checksum(uri.local_path()).await
    }

    async fn size(&self, path: &str) -> UrifsResult<u64> {
        let (fs, uri) = self.resolve(path).await?;
        fs.size(uri.local_path()).await
    }

    async fn sizes(&self, paths: &[String]) -> UrifsResult<Vec<u64>> {
        let mut sizes = vec![0; paths.len()];
        for batch in self.batches(paths.iter().map(String::as_str)).await? {
            let local: Vec<String> = batch
                .items
                .iter()
                .map(|(_, uri)| uri.local_path().to_string())
                .collect();
            let found = batch.backend.sizes(&local).await?;
            for ((index, _), size) in batch.items.iter().zip(found) {
                sizes[*index] = size;
            }
        }
        Ok(sizes)
    }

    async fn isdir(&self, path: &str) -> UrifsResult<bool> {
        let (fs, uri) = self.resolve(path).await?;
        fs.isdir(uri.local_path()).await
    }

    async fn isfile(&self, path: &str) -> UrifsResult<bool> {
        let (fs, uri) = self.resolve(path).await?;
        fs.isfile(uri.local_path()).await
    }

    async fn pipe(&self, files: Vec<(String, Bytes)>) -> UrifsResult<()> {
        let batches = self.batches(files.iter().map(|(uri, _)| uri.as_str())).await?;
        let mut data: Vec<Option<Bytes>> = files.into_iter().map(|(_, d)| Some(d)).collect();
        for batch in batches {
            let mut local = Vec::with_capacity(batch.items.len());
            for (index, uri) in &batch.items {
                if let Some(bytes) = data[*index].take() {
                    local.push((uri.local_path().to_string(), bytes));
                }
            }
            batch.backend.pipe(local).await?;
        }
        Ok(())
    }

    async fn head(&self, path: &str, size: usize) -> UrifsResult<Bytes> {
        let (fs, uri) = self.resolve(path).await?;
        fs.head(uri.local_path(), size).await
    }

    async fn tail(&self, path: &str, size: usize) -> UrifsResult<Bytes> {
        let (fs, uri) = self.resolve(path).await?;
        fs.tail(uri.local_path(), size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{params, ListingFactory, RecordingFactory};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn memory_only() -> UriFilesystem {
        UriFilesystem::new(None).unwrap()
    }

    fn file_uri(dir: &tempfile::TempDir, name: &str) -> String {
        format!("file://{}/{}", dir.path().display(), name)
    }

    async fn seeded() -> UriFilesystem {
        let fs = memory_only();
        fs.pipe_file("memory://scratch/dir/a.txt", Bytes::from_static(b"alpha"))
            .await
            .unwrap();
        fs.pipe_file("memory://scratch/dir/sub/b.txt", Bytes::from_static(b"beta!"))
            .await
            .unwrap();
        fs.pipe_file("memory://scratch/top.csv", Bytes::from_static(b"x,y"))
            .await
            .unwrap();
        fs
    }

    /// Every returned URI must resolve back to the backend that produced it
    async fn assert_same_backend(fs: &UriFilesystem, origin: &str, uris: &[String]) {
        let expected = fs.backend(origin).await.unwrap();
        for uri in uris {
            let backend = fs.backend(uri).await.unwrap();
            assert!(Arc::ptr_eq(&expected, &backend), "{uri} left {origin}");
        }
    }

    #[tokio::test]
    async fn test_s3_listing_is_qualified() {
        let factory = Arc::new(RecordingFactory::new("s3"));
        let mut credentials = CredentialTable::new();
        credentials.insert(
            "s3://my-bucket".into(),
            params(json!({"key": "AKIA123", "secret": "shh"})),
        );
        let fs = UriFilesystem::with_factories(Some(credentials), factory.registry()).unwrap();

        fs.pipe_file("s3://my-bucket/dir/file.txt", Bytes::from_static(b"data"))
            .await
            .unwrap();
        let listed: Vec<String> = fs
            .ls("s3://my-bucket/dir")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();

        assert_eq!(listed, vec!["s3://my-bucket/dir/file.txt"]);
        assert_eq!(factory.seen()[0].1.as_ref().unwrap()["secret"], "shh");
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = UriFilesystem::new(None).unwrap();
        assert!(!fs.exists(&file_uri(&dir, "missing")).await.unwrap());
        assert_eq!(fs.container().len(), 1);
        assert_eq!(fs.container().keys()[0].credential, None);
    }

    #[tokio::test]
    async fn test_results_resolve_to_origin() {
        let fs = seeded().await;
        let origin = "memory://scratch/dir";

        let listed: Vec<String> = fs.ls(origin).await.unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(
            listed,
            vec!["memory://scratch/dir/a.txt", "memory://scratch/dir/sub"]
        );
        assert_same_backend(&fs, origin, &listed).await;

        let found = fs
            .find(origin, &FindOptions { maxdepth: None, withdirs: false })
            .await
            .unwrap();
        assert_eq!(
            found,
            vec!["memory://scratch/dir/a.txt", "memory://scratch/dir/sub/b.txt"]
        );
        assert_same_backend(&fs, origin, &found).await;

        let globbed = fs.glob("memory://scratch/dir/*.txt").await.unwrap();
        assert_eq!(globbed, vec!["memory://scratch/dir/a.txt"]);

        let roots: Vec<String> = fs
            .walk("memory://scratch", None)
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.root)
            .collect();
        assert_eq!(roots[0], "memory://scratch/");
        assert!(roots.contains(&"memory://scratch/dir/sub".to_string()));
        assert_same_backend(&fs, origin, &roots).await;

        let info = fs.info("memory://scratch/top.csv").await.unwrap();
        assert_eq!(info.path, "memory://scratch/top.csv");
        assert_eq!(info.size(), Some(3));
    }

    #[tokio::test]
    async fn test_qualification_is_idempotent() {
        let fs = seeded().await;
        let first = fs.find("memory://scratch", &FindOptions::default()).await.unwrap();
        for uri in &first {
            let again = fs.find(uri, &FindOptions::default()).await.unwrap();
            assert_eq!(&again, &vec![uri.clone()]);
        }
    }

    #[tokio::test]
    async fn test_du_keys_are_uris() {
        let fs = seeded().await;
        let du = fs
            .du("memory://scratch/dir", &DuOptions::default())
            .await
            .unwrap();
        let DiskUsage::PerPath(sizes) = du else {
            panic!("expected per-path usage");
        };
        assert_eq!(sizes["memory://scratch/dir/a.txt"], 5);
        assert_eq!(sizes["memory://scratch/dir/sub/b.txt"], 5);

        let total = fs
            .du("memory://scratch", &DuOptions { total: true, maxdepth: None })
            .await
            .unwrap();
        assert_eq!(total, DiskUsage::Total(13));
    }

    #[tokio::test]
    async fn test_sizes_across_backends_keep_order() {
        let fs = seeded().await;
        fs.pipe_file("memory://other/one", Bytes::from_static(b"1"))
            .await
            .unwrap();

        let sizes = fs
            .sizes(&[
                "memory://scratch/top.csv".to_string(),
                "memory://other/one".to_string(),
                "memory://scratch/dir/a.txt".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(sizes, vec![3, 1, 5]);
    }

    #[tokio::test]
    async fn test_pipe_across_backends() {
        let fs = memory_only();
        fs.pipe(vec![
            ("memory://a/x".to_string(), Bytes::from_static(b"ax")),
            ("memory://b/y".to_string(), Bytes::from_static(b"by")),
            ("memory://a/z".to_string(), Bytes::from_static(b"az")),
        ])
        .await
        .unwrap();

        assert_eq!(fs.cat("memory://a/x").await.unwrap(), "ax");
        assert_eq!(fs.cat("memory://b/y").await.unwrap(), "by");
        assert_eq!(fs.cat("memory://a/z").await.unwrap(), "az");
        assert!(!fs.exists("memory://b/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_within_backend() {
        let fs = seeded().await;
        fs.copy(
            "memory://scratch/top.csv",
            "memory://scratch/copy.csv",
            &CopyOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(fs.cat("memory://scratch/copy.csv").await.unwrap(), "x,y");
    }

    #[tokio::test]
    async fn test_copy_across_backends() {
        let fs = seeded().await;
        let dir = tempfile::tempdir().unwrap();

        fs.copy(
            "memory://scratch/top.csv",
            &file_uri(&dir, "top.csv"),
            &CopyOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(dir.path().join("top.csv")).unwrap(), b"x,y");

        let err = fs
            .copy(
                "memory://scratch/dir",
                &file_uri(&dir, "tree"),
                &CopyOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UrifsError::NotAFile(_)));

        fs.copy(
            "memory://scratch/dir",
            &file_uri(&dir, "tree"),
            &CopyOptions { recursive: true },
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(dir.path().join("tree/a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(dir.path().join("tree/sub/b.txt")).unwrap(), b"beta!");
    }

    #[tokio::test]
    async fn test_copy_across_from_unnormalized_source() {
        let fs = seeded().await;
        let dir = tempfile::tempdir().unwrap();

        fs.copy(
            "memory://scratch/x/../dir",
            &file_uri(&dir, "tree"),
            &CopyOptions { recursive: true },
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(dir.path().join("tree/a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(dir.path().join("tree/sub/b.txt")).unwrap(), b"beta!");

        fs.copy(
            "memory://scratch/./",
            "memory://mirror/all",
            &CopyOptions { recursive: true },
        )
        .await
        .unwrap();
        assert_eq!(fs.cat("memory://mirror/all/top.csv").await.unwrap(), "x,y");
        assert_eq!(fs.cat("memory://mirror/all/dir/sub/b.txt").await.unwrap(), "beta!");
    }

    #[tokio::test]
    async fn test_scheme_shaped_keys_stay_on_backend() {
        let factory = Arc::new(ListingFactory::new(
            "s3",
            &["http://example.com/page", "s3://other-bucket/x", "plain.txt"],
        ));
        let mut factories = FactoryRegistry::with_defaults();
        factories.register(factory);
        let fs = UriFilesystem::with_factories(None, factories).unwrap();

        let found = fs.find("s3://archive/", &FindOptions::default()).await.unwrap();
        assert_eq!(
            found,
            vec![
                "s3://archive/http://example.com/page",
                "s3://archive/s3://other-bucket/x",
                "s3://archive/plain.txt",
            ]
        );
        assert_same_backend(&fs, "s3://archive/", &found).await;

        let listed: Vec<String> = fs
            .ls("s3://archive/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(listed, found);
        assert!(fs.exists(&found[0]).await.unwrap());
        assert_eq!(fs.container().len(), 1);
    }

    #[tokio::test]
    async fn test_bare_paths_return_file_uris() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), b"hi").unwrap();
        let fs = UriFilesystem::new(None).unwrap();

        let bare = dir.path().to_string_lossy().into_owned();
        let listed: Vec<String> = fs.ls(&bare).await.unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(listed, vec![file_uri(&dir, "note.txt")]);
        assert_eq!(fs.cat(&listed[0]).await.unwrap(), "hi");

        let from_bare = fs.backend(&bare).await.unwrap();
        let from_uri = fs.backend(&listed[0]).await.unwrap();
        assert!(Arc::ptr_eq(&from_bare, &from_uri));
    }

    #[tokio::test]
    async fn test_open_through_facade() {
        let fs = memory_only();
        let mut writer = fs.open("memory://scratch/log", OpenMode::Write).await.unwrap();
        writer.write_all(b"line").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        let mut reader = fs.open("memory://scratch/log", OpenMode::Read).await.unwrap();
        let mut text = String::new();
        reader.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "line");
    }

    #[tokio::test]
    async fn test_backend_errors_pass_through() {
        let fs = memory_only();
        let err = fs.cat("memory://scratch/nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_resolution_error());
    }

    #[tokio::test]
    async fn test_construction_error_is_wrapped() {
        let fs = memory_only();
        let err = fs.ls("file://remote-host/etc").await.unwrap_err();
        assert!(matches!(
            err,
            UrifsError::BackendConstruction { ref scheme, ref authority, .. }
                if scheme == "file" && authority == "remote-host"
        ));
        assert!(err.is_resolution_error());
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let fs = memory_only();
        let err = fs.exists("ftp://host/path").await.unwrap_err();
        assert!(matches!(err, UrifsError::UnsupportedScheme(_)));
        assert!(fs.container().is_empty());
    }

    #[tokio::test]
    async fn test_read_only_credential() {
        let mut credentials = CredentialTable::new();
        credentials.insert("memory://frozen".into(), params(json!({"read_only": true})));
        let fs = UriFilesystem::new(Some(credentials)).unwrap();

        let err = fs
            .pipe_file("memory://frozen/x", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, UrifsError::PermissionDenied(_)));
        fs.pipe_file("memory://thawed/x", Bytes::from_static(b"x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = UrifsConfig::from_toml_str("[credentials.\"memory://\"]\nread_only = true\n").unwrap();
        let fs = UriFilesystem::from_config(&config).unwrap();
        assert!(fs.pipe_file("memory://any/x", Bytes::new()).await.is_err());

        let clash = "[credentials.\"S3://b\"]\nkey = 1\n[credentials.\"s3://b\"]\nkey = 2\n";
        let config = UrifsConfig::from_toml_str(clash).unwrap();
        assert!(matches!(
            UriFilesystem::from_config(&config).err().unwrap(),
            UrifsError::Config(_)
        ));
    }

    #[tokio::test]
    async fn test_head_tail_checksum() {
        let fs = seeded().await;
        assert_eq!(fs.head("memory://scratch/dir/a.txt", 2).await.unwrap(), "al");
        assert_eq!(fs.tail("memory://scratch/dir/a.txt", 2).await.unwrap(), "ha");
        assert_eq!(
            fs.checksum("memory://scratch/dir/a.txt").await.unwrap(),
            blake3::hash(b"alpha").to_hex().to_string()
        );
    }
}
