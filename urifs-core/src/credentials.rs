//! Credential registry
//!
//! Maps `scheme://authority` (or `scheme://` for every authority under a
//! scheme) to the parameters a backend is constructed with. The registry is
//! built once and never mutated, so lookups need no locking.

use crate::error::{UrifsError, UrifsResult};
use crate::uri::{has_scheme, Uri};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Backend construction parameters. Opaque to URIFS; each backend decides
/// which keys it understands.
pub type BackendParams = serde_json::Map<String, serde_json::Value>;

/// Credential configuration as supplied by the caller, keyed by
/// `"{scheme}://{authority}"`.
pub type CredentialTable = BTreeMap<String, BackendParams>;

/// A matched credential entry
#[derive(Debug, Clone)]
pub struct Credential {
    key: Arc<str>,
    params: Arc<BackendParams>,
}

impl Credential {
    /// Canonical key of the entry that matched, e.g. `s3://bucket-a` or `s3://`.
    /// This is the credential's identity inside the backend cache.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn params(&self) -> &BackendParams {
        &self.params
    }
}

/// Immutable credential lookup table
#[derive(Debug, Clone, Default)]
pub struct CredentialRegistry {
    // scheme -> authority -> credential; "" is the scheme-wide default
    entries: HashMap<String, HashMap<String, Credential>>,
}

impl CredentialRegistry {
    pub fn new(table: CredentialTable) -> UrifsResult<Self> {
        let mut entries: HashMap<String, HashMap<String, Credential>> = HashMap::new();

        for (raw_key, params) in table {
            if !has_scheme(&raw_key) {
                return Err(UrifsError::MalformedUri(format!(
                    "credential key '{raw_key}' must look like scheme://authority"
                )));
            }
            let uri = Uri::parse(&raw_key)?;
            if !uri.is_root() {
                tracing::warn!(key = %raw_key, "ignoring path in credential key");
            }

            let key = uri.credential_key();
            let by_authority = entries.entry(uri.scheme).or_default();
            if by_authority.contains_key(&uri.authority) {
                return Err(UrifsError::Config(format!(
                    "duplicate credential entry for {key}"
                )));
            }
            by_authority.insert(
                uri.authority,
                Credential {
                    key: key.into(),
                    params: Arc::new(params),
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Most specific entry for `(scheme, authority)`: the exact authority
    /// first, then the scheme-wide default, then nothing.
    pub fn lookup(&self, scheme: &str, authority: &str) -> Option<&Credential> {
        let by_authority = self.entries.get(scheme)?;
        by_authority
            .get(authority)
            .or_else(|| by_authority.get(""))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
