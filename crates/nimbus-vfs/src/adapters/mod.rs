//! Protocol adapters.
//!
//! Each adapter maps one native client onto [`RemoteFile`](crate::RemoteFile).
//! Attribute reads go through [`memoized`]: the first successful fetch is kept
//! on the instance, a failed fetch degrades to the attribute's default and is
//! retried on the next read, and mutations clear the cells they invalidate.

mod blob;
mod bucket;
mod smb;

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::backends::{ObjectStore, ObjectStoreConnector};
use crate::config::VfsConfig;
use crate::credentials::{self, CredentialStore, ResolvedLocation};
use crate::error::VfsResult;
use crate::location::Location;

pub use blob::BlobNode;
pub use bucket::BucketNode;
pub use smb::SmbFile;

/// One memoized value. The lock is never held across an await.
pub(crate) struct Memo<T> {
    cell: Mutex<Option<T>>,
}

impl<T: Clone> Memo<T> {
    pub(crate) fn new() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }

    pub(crate) fn get(&self) -> Option<T> {
        self.cell.lock().clone()
    }

    pub(crate) fn set(&self, value: T) {
        *self.cell.lock() = Some(value);
    }

    pub(crate) fn clear(&self) {
        *self.cell.lock() = None;
    }
}

/// Read a memoized attribute, fetching it on a miss.
///
/// A failed fetch is logged and yields `default` without being stored.
pub(crate) async fn memoized<T, Fut>(
    memo: &Memo<T>,
    attribute: &'static str,
    location: &Location,
    default: T,
    fetch: impl FnOnce() -> Fut,
) -> T
where
    T: Clone,
    Fut: Future<Output = VfsResult<T>>,
{
    if let Some(value) = memo.get() {
        return value;
    }
    match fetch().await {
        Ok(value) => {
            memo.set(value.clone());
            value
        }
        Err(e) => {
            tracing::debug!(%location, attribute, error = %e, "attribute fetch failed, using default");
            default
        }
    }
}

/// Milliseconds since the Unix epoch, 0 for earlier times.
pub(crate) fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Services every adapter instance is built with.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) config: Arc<VfsConfig>,
}

impl Context {
    pub(crate) fn resolve(&self, location: &Location) -> ResolvedLocation {
        credentials::resolve(self.credentials.as_ref(), location)
    }

    pub(crate) fn authenticate(&self, location: &Location) -> Location {
        credentials::authenticate(self.credentials.as_ref(), location)
    }

    pub(crate) fn delimiter(&self) -> &str {
        &self.config.object_store.delimiter
    }
}

/// Object-storage account shared by a container node and the blob nodes
/// discovered under it. Holds the connection, never attribute state.
pub(crate) struct Account {
    connector: Arc<dyn ObjectStoreConnector>,
    /// Account location (no path), credential embedded when known.
    private: Location,
    session: Memo<Arc<dyn ObjectStore>>,
}

impl Account {
    /// Account for the scheme and host of `private`, keeping its credential.
    pub(crate) fn new(connector: Arc<dyn ObjectStoreConnector>, private: &Location) -> Arc<Self> {
        let root = Location::new(private.scheme(), private.host(), Vec::<String>::new());
        let root = match private.credential() {
            Some(credential) => root.with_credential(credential.clone()),
            None => root,
        };
        Arc::new(Self {
            connector,
            private: root,
            session: Memo::new(),
        })
    }

    /// Stripped account location.
    pub(crate) fn location(&self) -> Location {
        self.private.strip()
    }

    /// Connected client, connecting on first use.
    pub(crate) async fn storage(&self) -> VfsResult<Arc<dyn ObjectStore>> {
        if let Some(storage) = self.session.get() {
            return Ok(storage);
        }
        let storage = self.connector.connect(&self.private).await?;
        self.session.set(Arc::clone(&storage));
        Ok(storage)
    }

    pub(crate) fn same_account(&self, other: &Account) -> bool {
        self.private == other.private
    }
}
