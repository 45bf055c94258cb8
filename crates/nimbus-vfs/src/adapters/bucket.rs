//! Container (bucket) node.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use super::blob::BlobNode;
use super::{Account, Context, Memo, epoch_millis};
use crate::backends::{BucketInfo, ByteReader, ByteWriter, ObjectStore, ObjectStoreConnector};
use crate::error::{VfsError, VfsResult};
use crate::file::{RemoteFile, VfsFile};
use crate::location::Location;

/// Top level of an object-storage account. Always a directory.
///
/// The bucket handle is fetched lazily and memoized only once found; while
/// it is absent every attribute reads as a default and the next read asks
/// again. Creation and deletion fail loudly.
pub struct BucketNode {
    ctx: Context,
    account: Arc<Account>,
    /// Stripped location, properties included.
    location: Location,
    name: String,
    handle: Memo<BucketInfo>,
}

impl BucketNode {
    pub(crate) fn new(
        ctx: Context,
        connector: Arc<dyn ObjectStoreConnector>,
        location: &Location,
    ) -> VfsResult<Self> {
        let resolved = ctx.resolve(location);
        let name = match resolved.public.segments() {
            [name] => name.clone(),
            _ => {
                return Err(VfsError::invalid_location(format!(
                    "{} does not name a bucket",
                    resolved.public
                )));
            }
        };
        Ok(Self {
            account: Account::new(connector, &resolved.private),
            location: resolved.public,
            ctx,
            name,
            handle: Memo::new(),
        })
    }

    /// Bucket node sharing an existing account connection.
    pub(crate) fn attached(ctx: Context, account: Arc<Account>, name: &str) -> Self {
        Self {
            location: account.location().join(name),
            ctx,
            account,
            name: name.to_string(),
            handle: Memo::new(),
        }
    }

    /// Memoized bucket handle. `None` (not memoized) when the bucket is
    /// missing or unreachable.
    pub(crate) async fn handle(&self) -> Option<BucketInfo> {
        if let Some(info) = self.handle.get() {
            return Some(info);
        }
        let fetched = async {
            let storage = self.account.storage().await?;
            storage.get_bucket(&self.name).await
        }
        .await;
        match fetched {
            Ok(Some(info)) => {
                self.handle.set(info.clone());
                Some(info)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(location = %self.location, error = %e, "cannot fetch bucket");
                None
            }
        }
    }

    /// Placement for a new bucket.
    ///
    /// A non-empty location property wins. The default-location flag only
    /// matters when no location is given, which is the default placement
    /// anyway.
    fn placement(&self) -> Option<String> {
        let config = &self.ctx.config.object_store;
        let explicit = self
            .location
            .property(&config.location_property)
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let use_default = self
            .location
            .property(&config.default_location_property)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        if let (Some(region), true) = (explicit, use_default) {
            tracing::warn!(location = %self.location, region, "both a region and the default location flag given, using the region");
        }
        explicit.map(str::to_string)
    }
}

impl BucketNode {
    /// Cause for a delete the backend declined. Only a live existence check
    /// that no longer finds the bucket makes it a not-found.
    async fn refusal(&self, storage: &dyn ObjectStore) -> VfsError {
        match storage.bucket_exists(&self.name).await {
            Ok(false) => VfsError::not_found(format!(
                "bucket {} wasn't deleted, it's probably missing",
                self.name
            )),
            Ok(true) => VfsError::other(format!(
                "bucket {} wasn't deleted, it still exists",
                self.name
            )),
            Err(e) => {
                tracing::debug!(location = %self.location, error = %e, "existence check after refused delete failed");
                VfsError::other(format!(
                    "bucket {} wasn't deleted, it's probably missing",
                    self.name
                ))
            }
        }
    }
}

#[async_trait]
impl RemoteFile for BucketNode {
    fn location(&self) -> Location {
        self.location.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn parent(&self) -> Option<VfsFile> {
        None
    }

    async fn exists(&self) -> bool {
        if self.handle().await.is_none() {
            return false;
        }
        // A handle can outlive the bucket; confirm with a live probe.
        let live = async {
            let storage = self.account.storage().await?;
            storage.bucket_exists(&self.name).await
        }
        .await;
        match live {
            Ok(exists) => exists,
            Err(e) => {
                tracing::debug!(location = %self.location, error = %e, "bucket probe failed");
                false
            }
        }
    }

    async fn is_directory(&self) -> bool {
        true
    }

    async fn is_hidden(&self) -> bool {
        false
    }

    async fn size(&self) -> u64 {
        0
    }

    async fn date(&self) -> u64 {
        self.handle()
            .await
            .map(|info| epoch_millis(info.updated))
            .unwrap_or(0)
    }

    async fn can_read(&self) -> bool {
        self.handle().await.is_some()
    }

    async fn can_write(&self) -> bool {
        self.handle().await.is_some()
    }

    async fn list(&self) -> VfsResult<Vec<VfsFile>> {
        let Some(handle) = self.handle().await else {
            return Err(VfsError::not_found(format!(
                "cannot list bucket that doesn't exist: {}",
                self.name
            )));
        };

        let delimiter = self.ctx.delimiter();
        let entries = async {
            let storage = self.account.storage().await?;
            storage.list(&self.name, "", Some(delimiter)).await
        }
        .await
        .map_err(|e| VfsError::backend(format!("unable to list bucket {}", self.name), e))?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                VfsFile::Blob(BlobNode::listed(
                    self.ctx.clone(),
                    Arc::clone(&self.account),
                    &self.name,
                    Some(handle.clone()),
                    entry,
                ))
            })
            .collect())
    }

    async fn mkdir(&self) -> VfsResult<()> {
        let placement = self.placement();
        let created = async {
            let storage = self.account.storage().await?;
            storage
                .create_bucket(&self.name, placement.as_deref())
                .await
        }
        .await;

        match created {
            Ok(info) => {
                tracing::debug!(location = %self.location, region = ?info.location, "created bucket");
                self.handle.set(info);
                Ok(())
            }
            Err(e) => {
                self.handle.clear();
                Err(VfsError::backend(
                    format!("unable to create bucket {}", self.name),
                    e,
                ))
            }
        }
    }

    async fn mkdir_child(&self, name: &str) -> VfsResult<VfsFile> {
        let delimiter = self.ctx.delimiter();
        let key = name.trim_matches(|c: char| delimiter.contains(c));
        if key.is_empty() {
            return Err(VfsError::invalid_location(format!(
                "empty directory name under {}",
                self.location
            )));
        }
        let child = BlobNode::attached(
            self.ctx.clone(),
            Arc::clone(&self.account),
            &self.name,
            key,
        );
        child.mkdir().await?;
        Ok(VfsFile::Blob(child))
    }

    async fn delete(&self) -> VfsResult<()> {
        let context = || format!("unable to delete bucket {}", self.name);
        self.handle.clear();
        let storage = self
            .account
            .storage()
            .await
            .map_err(|e| VfsError::backend(context(), e))?;
        match storage.delete_bucket(&self.name).await {
            Ok(true) => {
                tracing::debug!(location = %self.location, "deleted bucket");
                Ok(())
            }
            Ok(false) => Err(VfsError::backend(context(), self.refusal(storage.as_ref()).await)),
            Err(e) => Err(VfsError::backend(context(), e)),
        }
    }

    async fn input_stream(&self) -> VfsResult<ByteReader> {
        Err(VfsError::is_a_directory(self.location.to_string()))
    }

    async fn output_stream(&self, _append: bool) -> VfsResult<ByteWriter> {
        Err(VfsError::is_a_directory(self.location.to_string()))
    }

    async fn move_to(&self, _destination: &VfsFile) -> bool {
        false
    }
}

impl PartialEq for BucketNode {
    fn eq(&self, other: &Self) -> bool {
        self.account.same_account(&other.account) && self.name == other.name
    }
}

impl fmt::Debug for BucketNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketNode")
            .field("location", &self.location)
            .field("fetched", &self.handle.get().is_some())
            .finish()
    }
}
