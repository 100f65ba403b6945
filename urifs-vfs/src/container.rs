// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend instance cache

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use urifs_core::{
    BackendRequest, CredentialRegistry, FileSystem, Uri, UrifsError, UrifsResult,
};
use urifs_providers::FactoryRegistry;

/// Identity of a cached backend.
///
/// Two URIs share a backend exactly when they agree on scheme, authority
/// and the credential entry that matched them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scheme: String,
    pub authority: String,
    /// Key of the matched credential entry, `None` when nothing matched
    pub credential: Option<String>,
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)?;
        if let Some(credential) = &self.credential {
            write!(f, " [{credential}]")?;
        }
        Ok(())
    }
}

type Slot = Arc<OnceCell<Arc<dyn FileSystem>>>;

/// Resolves URIs to backend instances, constructing each at most once.
///
/// Every key owns a slot that is inserted before construction starts, so
/// concurrent first resolutions of one key wait on the same construction
/// instead of racing. A failed construction leaves its slot empty and the
/// next resolution tries again. Slots are never removed: a task may still
/// be initializing one it fetched earlier.
pub struct FileSystemContainer {
    credentials: CredentialRegistry,
    factories: FactoryRegistry,
    backends: DashMap<CacheKey, Slot>,
}

impl FileSystemContainer {
    pub fn new(credentials: CredentialRegistry, factories: FactoryRegistry) -> Self {
        Self {
            credentials,
            factories,
            backends: DashMap::new(),
        }
    }

    pub fn credentials(&self) -> &CredentialRegistry {
        &self.credentials
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    /// Parse `uri` and return its backend together with the parsed URI.
    pub async fn resolve(&self, uri: &str) -> UrifsResult<(Arc<dyn FileSystem>, Uri)> {
        let parsed = Uri::parse(uri)?;
        let backend = self.backend_for(&parsed).await?;
        Ok((backend, parsed))
    }

    /// Backend instance serving `uri`
    pub async fn get(&self, uri: &str) -> UrifsResult<Arc<dyn FileSystem>> {
        let parsed = Uri::parse(uri)?;
        self.backend_for(&parsed).await
    }

    /// The backend-local path of `uri`
    pub fn strip(&self, uri: &str) -> UrifsResult<String> {
        Ok(Uri::parse(uri)?.local_path().to_string())
    }

    pub async fn backend_for(&self, uri: &Uri) -> UrifsResult<Arc<dyn FileSystem>> {
        // Unknown schemes fail before a slot exists for them
        let factory = self.factories.get_or_err(&uri.scheme)?;
        let credential = self.credentials.lookup(&uri.scheme, &uri.authority);

        let key = CacheKey {
            scheme: uri.scheme.clone(),
            authority: uri.authority.clone(),
            credential: credential.map(|c| c.key().to_string()),
        };
        let slot = self.backends.entry(key.clone()).or_default().value().clone();
        if let Some(backend) = slot.get() {
            tracing::debug!(key = %key, "backend cache hit");
            return Ok(backend.clone());
        }

        let backend = slot
            .get_or_try_init(|| async {
                tracing::debug!(key = %key, "backend cache miss, constructing");
                let request = BackendRequest {
                    scheme: &uri.scheme,
                    authority: &uri.authority,
                    params: credential.map(|c| c.params()),
                };
                match factory.create(&request).await {
                    Ok(backend) => {
                        tracing::info!(key = %key, backend = backend.id(), "backend ready");
                        Ok(backend)
                    }
                    Err(source) => {
                        tracing::warn!(key = %key, error = %source, "backend construction failed");
                        Err(UrifsError::BackendConstruction {
                            scheme: uri.scheme.clone(),
                            authority: uri.authority.clone(),
                            source: Box::new(source),
                        })
                    }
                }
            })
            .await?;

        Ok(backend.clone())
    }

    /// Number of constructed backends
    pub fn len(&self) -> usize {
        self.backends
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the constructed backends, sorted
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .backends
            .iter()
            .filter(|slot| slot.value().initialized())
            .map(|slot| slot.key().clone())
            .collect();
        keys.sort_by(|a, b| {
            (&a.scheme, &a.authority, &a.credential).cmp(&(&b.scheme, &b.authority, &b.credential))
        });
        keys
    }
}

impl std::fmt::Debug for FileSystemContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemContainer")
            .field("factories", &self.factories)
            .field("backends", &self.keys())
            .finish()
    }
}
