//! Hierarchical adapter over an [`SmbClient`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use super::{Context, Memo, epoch_millis, memoized};
use crate::backends::{ByteReader, ByteWriter, SmbClient};
use crate::error::{VfsError, VfsResult};
use crate::file::{RemoteFile, VfsFile};
use crate::location::{Location, SEPARATOR};

#[derive(Debug, Clone)]
enum State {
    /// No handle yet; the next read opens one. Also the state after a
    /// refused or interrupted open.
    Unopened,
    /// Handle open, bound to this canonical (stripped) location.
    Bound(Location),
    /// Target is absent; reads serve defaults without native calls.
    Stub,
}

/// A file or directory on an SMB host.
///
/// Construction resolves credentials but makes no native call. The handle is
/// opened on first use. An absent target makes the node a stub for the rest
/// of its life, unless a mutation through this same instance resets it. Any
/// other open failure only fails the current read; the next one tries again.
pub struct SmbFile {
    ctx: Context,
    client: Arc<dyn SmbClient>,
    /// Stripped location.
    location: Location,
    /// Location with credential embedded, for native calls.
    private: Location,
    inline: bool,
    state: Mutex<State>,
    exists: Memo<bool>,
    directory: Memo<bool>,
    hidden: Memo<bool>,
    size: Memo<u64>,
    date: Memo<u64>,
    readable: Memo<bool>,
    writable: Memo<bool>,
}

impl SmbFile {
    pub(crate) fn new(ctx: Context, client: Arc<dyn SmbClient>, location: &Location) -> Self {
        let resolved = ctx.resolve(location);
        Self {
            ctx,
            client,
            location: resolved.public,
            private: resolved.private,
            inline: resolved.inline,
            state: Mutex::new(State::Unopened),
            exists: Memo::new(),
            directory: Memo::new(),
            hidden: Memo::new(),
            size: Memo::new(),
            date: Memo::new(),
            readable: Memo::new(),
            writable: Memo::new(),
        }
    }

    /// True once an open attempt found the target absent.
    pub fn is_stub(&self) -> bool {
        matches!(*self.state.lock(), State::Stub)
    }

    /// Open the native handle if needed. `None` for a stub or a failed open.
    async fn bind(&self) -> Option<Location> {
        let state = self.state.lock().clone();
        match state {
            State::Bound(canonical) => return Some(canonical),
            State::Stub => return None,
            State::Unopened => {}
        }

        match self.client.open(&self.private).await {
            Ok(canonical) => {
                let canonical = canonical.strip();
                *self.state.lock() = State::Bound(canonical.clone());
                Some(canonical)
            }
            Err(e) => {
                let absent = e.is_not_found();
                if absent {
                    tracing::debug!(location = %self.location, "target absent, serving defaults");
                } else {
                    tracing::warn!(location = %self.location, error = %e, "cannot open target, will retry");
                }
                if (absent || e.is_permission_denied()) && self.inline {
                    self.forget_credential();
                }
                if absent {
                    *self.state.lock() = State::Stub;
                }
                None
            }
        }
    }

    /// Drop the credential typed into this node's location, if configured.
    fn forget_credential(&self) {
        if self.ctx.config.smb.forget_failed_credentials
            && self.ctx.credentials.remove(&self.location).is_some()
        {
            tracing::debug!(location = %self.location, "forgot inline credential");
        }
    }

    /// Canonical location when bound, the requested one otherwise.
    fn target(&self) -> Location {
        match &*self.state.lock() {
            State::Bound(canonical) => canonical.clone(),
            State::Unopened | State::Stub => self.location.clone(),
        }
    }

    /// `location` with this node's credential embedded.
    fn native(&self, location: &Location) -> Location {
        match self.private.credential() {
            Some(credential) => location.with_credential(credential.clone()),
            None => location.strip(),
        }
    }

    /// Drop the handle and every memoized attribute.
    fn invalidate(&self) {
        *self.state.lock() = State::Unopened;
        self.exists.clear();
        self.directory.clear();
        self.hidden.clear();
        self.size.clear();
        self.date.clear();
        self.readable.clear();
        self.writable.clear();
    }

    fn child(&self, location: &Location) -> SmbFile {
        SmbFile::new(self.ctx.clone(), Arc::clone(&self.client), location)
    }
}

#[async_trait]
impl RemoteFile for SmbFile {
    fn location(&self) -> Location {
        self.target()
    }

    fn name(&self) -> String {
        let target = self.target();
        match target.name() {
            Some(name) => name.to_string(),
            None => format!("{target}{SEPARATOR}"),
        }
    }

    fn parent(&self) -> Option<VfsFile> {
        let parent = self.target().parent()?;
        Some(VfsFile::Smb(self.child(&parent)))
    }

    async fn exists(&self) -> bool {
        let Some(canonical) = self.bind().await else {
            return false;
        };
        let url = self.native(&canonical);
        memoized(&self.exists, "exists", &canonical, false, || {
            self.client.exists(&url)
        })
        .await
    }

    async fn is_directory(&self) -> bool {
        let Some(canonical) = self.bind().await else {
            return false;
        };
        let url = self.native(&canonical);
        memoized(&self.directory, "is_directory", &canonical, false, || {
            self.client.is_directory(&url)
        })
        .await
    }

    async fn is_hidden(&self) -> bool {
        let Some(canonical) = self.bind().await else {
            return false;
        };
        let url = self.native(&canonical);
        memoized(&self.hidden, "is_hidden", &canonical, false, || {
            self.client.is_hidden(&url)
        })
        .await
    }

    async fn size(&self) -> u64 {
        let Some(canonical) = self.bind().await else {
            return 0;
        };
        let url = self.native(&canonical);
        memoized(&self.size, "size", &canonical, 0, || self.client.length(&url)).await
    }

    async fn date(&self) -> u64 {
        let Some(canonical) = self.bind().await else {
            return 0;
        };
        let url = self.native(&canonical);
        memoized(&self.date, "date", &canonical, 0, || async {
            self.client.last_modified(&url).await.map(epoch_millis)
        })
        .await
    }

    async fn can_read(&self) -> bool {
        let Some(canonical) = self.bind().await else {
            return false;
        };
        let url = self.native(&canonical);
        memoized(&self.readable, "can_read", &canonical, false, || {
            self.client.can_read(&url)
        })
        .await
    }

    async fn can_write(&self) -> bool {
        let Some(canonical) = self.bind().await else {
            return false;
        };
        let url = self.native(&canonical);
        memoized(&self.writable, "can_write", &canonical, false, || {
            self.client.can_write(&url)
        })
        .await
    }

    async fn list(&self) -> VfsResult<Vec<VfsFile>> {
        let canonical = self
            .bind()
            .await
            .ok_or_else(|| VfsError::not_found(self.location.to_string()))?;

        let names = self
            .client
            .list(&self.native(&canonical))
            .await
            .map_err(|e| VfsError::backend(format!("unable to list {canonical}"), e))?;

        Ok(names
            .iter()
            .map(|name| VfsFile::Smb(self.child(&canonical.join(name))))
            .collect())
    }

    async fn mkdir(&self) -> VfsResult<()> {
        let target = self.target();
        let result = self.client.mkdir(&self.native(&target)).await;
        self.invalidate();
        result.map_err(|e| VfsError::backend(format!("unable to create {target}"), e))
    }

    async fn mkdir_child(&self, name: &str) -> VfsResult<VfsFile> {
        let location = self.target().join(name);
        self.client
            .mkdir(&self.native(&location))
            .await
            .map_err(|e| VfsError::backend(format!("unable to create {location}"), e))?;
        Ok(VfsFile::Smb(self.child(&location)))
    }

    async fn delete(&self) -> VfsResult<()> {
        let target = self.target();
        let result = self.client.delete(&self.native(&target)).await;
        self.invalidate();
        result.map_err(|e| VfsError::backend(format!("unable to delete {target}"), e))
    }

    async fn input_stream(&self) -> VfsResult<ByteReader> {
        let url = self.ctx.authenticate(&self.target());
        self.client.open_read(&url).await
    }

    async fn output_stream(&self, append: bool) -> VfsResult<ByteWriter> {
        let url = self.ctx.authenticate(&self.target());
        let writer = self.client.open_write(&url, append).await;
        self.invalidate();
        writer
    }

    async fn move_to(&self, destination: &VfsFile) -> bool {
        let VfsFile::Smb(dest) = destination else {
            return false;
        };

        let from = self.target();
        let to = dest.target();
        match self
            .client
            .rename(&self.native(&from), &dest.native(&to))
            .await
        {
            Ok(()) => {
                self.invalidate();
                dest.invalidate();
                true
            }
            Err(e) => {
                tracing::debug!(%from, %to, error = %e, "rename refused");
                false
            }
        }
    }
}

/// Compares requested locations, so equality does not change once either
/// side has opened its handle.
impl PartialEq for SmbFile {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl fmt::Debug for SmbFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbFile")
            .field("location", &self.location)
            .field("state", &*self.state.lock())
            .finish()
    }
}
