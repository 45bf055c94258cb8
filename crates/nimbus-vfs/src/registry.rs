//! Scheme routing.
//!
//! Maps a location's scheme to the backend that serves it and builds the
//! matching [`VfsFile`] variant.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adapters::{BlobNode, BucketNode, Context, SmbFile};
use crate::backends::{ObjectStoreConnector, SmbClient};
use crate::config::VfsConfig;
use crate::credentials::{CredentialStore, MemoryCredentialStore};
use crate::error::{VfsError, VfsResult};
use crate::file::VfsFile;
use crate::location::Location;

/// Namespace model of a registered backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    /// Native directory tree.
    Hierarchical,
    /// Buckets of flat keys.
    ObjectStore,
}

/// Information about a registered scheme.
#[derive(Debug, Clone)]
pub struct SchemeInfo {
    pub scheme: String,
    pub kind: BackendKind,
}

#[derive(Clone)]
enum Backend {
    Smb(Arc<dyn SmbClient>),
    ObjectStore(Arc<dyn ObjectStoreConnector>),
}

impl Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Backend::Smb(_) => BackendKind::Hierarchical,
            Backend::ObjectStore(_) => BackendKind::ObjectStore,
        }
    }
}

/// Entry point: resolves location strings into files.
///
/// Owns the credential registry shared by every file it resolves. Resolving
/// makes no remote call; each file fetches what it needs on first use.
pub struct Vfs {
    ctx: Context,
    backends: RwLock<BTreeMap<String, Backend>>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("schemes", &self.backends.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// Create with an empty in-memory credential registry and default config.
    pub fn new() -> Self {
        Self::with_config(VfsConfig::default())
    }

    /// Create with an empty in-memory credential registry.
    pub fn with_config(config: VfsConfig) -> Self {
        Self::with_credentials(Arc::new(MemoryCredentialStore::new()), config)
    }

    /// Create around an existing credential registry.
    pub fn with_credentials(credentials: Arc<dyn CredentialStore>, config: VfsConfig) -> Self {
        Self {
            ctx: Context {
                credentials,
                config: Arc::new(config),
            },
            backends: RwLock::new(BTreeMap::new()),
        }
    }

    /// The credential registry.
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.ctx.credentials
    }

    pub fn config(&self) -> &VfsConfig {
        &self.ctx.config
    }

    /// Serve `scheme` with a hierarchical client, replacing any earlier
    /// registration.
    pub fn register_smb(&self, scheme: &str, client: impl SmbClient + 'static) {
        self.register_smb_arc(scheme, Arc::new(client));
    }

    /// Serve `scheme` with a hierarchical client (already wrapped in Arc).
    pub fn register_smb_arc(&self, scheme: &str, client: Arc<dyn SmbClient>) {
        self.insert(scheme, Backend::Smb(client));
    }

    /// Serve `scheme` with an object-storage connector, replacing any
    /// earlier registration.
    pub fn register_object_store(&self, scheme: &str, connector: impl ObjectStoreConnector + 'static) {
        self.register_object_store_arc(scheme, Arc::new(connector));
    }

    /// Serve `scheme` with an object-storage connector (already wrapped in Arc).
    pub fn register_object_store_arc(&self, scheme: &str, connector: Arc<dyn ObjectStoreConnector>) {
        self.insert(scheme, Backend::ObjectStore(connector));
    }

    fn insert(&self, scheme: &str, backend: Backend) {
        let scheme = scheme.to_ascii_lowercase();
        tracing::debug!(%scheme, kind = %backend.kind(), "registered backend");
        self.backends.write().insert(scheme, backend);
    }

    /// Stop serving `scheme`.
    ///
    /// Returns `true` if a backend was removed. Files already resolved keep
    /// working.
    pub fn unregister(&self, scheme: &str) -> bool {
        self.backends
            .write()
            .remove(&scheme.to_ascii_lowercase())
            .is_some()
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<SchemeInfo> {
        self.backends
            .read()
            .iter()
            .map(|(scheme, backend)| SchemeInfo {
                scheme: scheme.clone(),
                kind: backend.kind(),
            })
            .collect()
    }

    /// Parse `location` and resolve it.
    pub fn resolve(&self, location: &str) -> VfsResult<VfsFile> {
        self.open(&Location::parse(location)?)
    }

    /// Build the file for `location`.
    ///
    /// Hierarchical schemes give [`VfsFile::Smb`]. Object-storage schemes give
    /// [`VfsFile::Bucket`] for `scheme://account/bucket` and [`VfsFile::Blob`]
    /// for anything deeper.
    pub fn open(&self, location: &Location) -> VfsResult<VfsFile> {
        let backend = self
            .backends
            .read()
            .get(location.scheme())
            .cloned()
            .ok_or_else(|| VfsError::UnknownScheme(location.scheme().to_string()))?;

        match backend {
            Backend::Smb(client) => Ok(VfsFile::Smb(SmbFile::new(
                self.ctx.clone(),
                client,
                location,
            ))),
            Backend::ObjectStore(connector) => match location.depth() {
                0 => Err(VfsError::invalid_location(format!(
                    "{location} does not name a bucket"
                ))),
                1 => BucketNode::new(self.ctx.clone(), connector, location).map(VfsFile::Bucket),
                _ => BlobNode::new(self.ctx.clone(), connector, location).map(VfsFile::Blob),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MemoryObjectStore, MemorySmbShare};
    use crate::file::{AdapterKind, RemoteFile};

    fn vfs() -> Vfs {
        let vfs = Vfs::new();
        vfs.register_smb("smb", MemorySmbShare::new("nas"));
        vfs.register_object_store("gcs", MemoryObjectStore::new("proj"));
        vfs
    }

    #[test]
    fn test_routes_by_scheme_and_depth() {
        let vfs = vfs();
        assert_eq!(vfs.resolve("smb://nas/share").unwrap().kind(), AdapterKind::Smb);
        assert_eq!(vfs.resolve("smb://nas").unwrap().kind(), AdapterKind::Smb);
        assert_eq!(vfs.resolve("gcs://proj/b").unwrap().kind(), AdapterKind::Bucket);
        assert_eq!(vfs.resolve("gcs://proj/b/").unwrap().kind(), AdapterKind::Bucket);
        assert_eq!(vfs.resolve("gcs://proj/b/k/x").unwrap().kind(), AdapterKind::Blob);
    }

    #[test]
    fn test_resolution_errors() {
        let vfs = vfs();
        assert!(matches!(
            vfs.resolve("ftp://host/x").unwrap_err(),
            VfsError::UnknownScheme(s) if s == "ftp"
        ));
        assert!(matches!(
            vfs.resolve("gcs://proj").unwrap_err(),
            VfsError::InvalidLocation(_)
        ));
        assert!(matches!(
            vfs.resolve("::nope").unwrap_err(),
            VfsError::InvalidLocation(_)
        ));
    }

    #[test]
    fn test_register_and_unregister() {
        let vfs = vfs();
        let schemes: Vec<_> = vfs
            .schemes()
            .into_iter()
            .map(|s| (s.scheme, s.kind))
            .collect();
        assert_eq!(
            schemes,
            [
                ("gcs".to_string(), BackendKind::ObjectStore),
                ("smb".to_string(), BackendKind::Hierarchical),
            ]
        );

        assert!(vfs.unregister("SMB"));
        assert!(!vfs.unregister("smb"));
        assert!(vfs.resolve("smb://nas/share").is_err());
    }

    #[test]
    fn test_inline_credential_registered_on_resolve() {
        let vfs = vfs();
        let file = vfs.resolve("smb://amy:pw@nas/share").unwrap();
        assert_eq!(file.location().to_string(), "smb://nas/share");
        assert!(
            vfs.credentials()
                .get(&Location::parse("smb://nas/share").unwrap())
                .is_some()
        );
    }
}
