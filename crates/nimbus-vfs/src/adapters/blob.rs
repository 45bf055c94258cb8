//! Flat object (blob) node.
//!
//! A blob node names one key under a bucket. Object storage has no
//! directories, so a key that other keys extend with the delimiter (or an
//! empty `key/` marker object) reads as a pseudo-directory.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use super::bucket::BucketNode;
use super::{Account, Context, Memo, epoch_millis, memoized};
use crate::backends::{
    BucketInfo, ByteReader, ByteWriter, ListEntry, ObjectInfo, ObjectStore, ObjectStoreConnector,
};
use crate::error::{VfsError, VfsResult};
use crate::file::{RemoteFile, VfsFile};
use crate::location::Location;

#[derive(Debug, Clone)]
enum BlobState {
    Object(ObjectInfo),
    Directory,
    Missing,
}

/// One key in a bucket, either a stored object or a pseudo-directory.
///
/// Holds the account connection and the bucket name, which it uses to issue
/// calls. It does not keep the bucket node it was listed from alive.
pub struct BlobNode {
    ctx: Context,
    account: Arc<Account>,
    location: Location,
    bucket: String,
    /// Full key, no trailing delimiter.
    key: String,
    container: Memo<BucketInfo>,
    state: Memo<BlobState>,
}

impl BlobNode {
    pub(crate) fn new(
        ctx: Context,
        connector: Arc<dyn ObjectStoreConnector>,
        location: &Location,
    ) -> VfsResult<Self> {
        let resolved = ctx.resolve(location);
        let Some((bucket, path)) = resolved.public.segments().split_first() else {
            return Err(VfsError::invalid_location(format!(
                "{} does not name a bucket",
                resolved.public
            )));
        };
        if path.is_empty() {
            return Err(VfsError::invalid_location(format!(
                "{} does not name a key",
                resolved.public
            )));
        }

        Ok(Self {
            account: Account::new(connector, &resolved.private),
            bucket: bucket.clone(),
            key: path.join("/"),
            location: resolved.public.clone(),
            ctx,
            container: Memo::new(),
            state: Memo::new(),
        })
    }

    /// Node for `key`, sharing an account connection, with nothing fetched.
    pub(crate) fn attached(ctx: Context, account: Arc<Account>, bucket: &str, key: &str) -> Self {
        Self {
            location: account.location().join(bucket).join(key),
            ctx,
            account,
            bucket: bucket.to_string(),
            key: key.to_string(),
            container: Memo::new(),
            state: Memo::new(),
        }
    }

    /// Node built from a listing entry, seeded with what the listing told us.
    pub(crate) fn listed(
        ctx: Context,
        account: Arc<Account>,
        bucket: &str,
        container: Option<BucketInfo>,
        entry: ListEntry,
    ) -> Self {
        let (key, state) = match entry {
            ListEntry::Object(info) => (info.key.clone(), BlobState::Object(info)),
            ListEntry::Prefix(prefix) => {
                let key = prefix
                    .strip_suffix(ctx.delimiter())
                    .unwrap_or(&prefix)
                    .to_string();
                (key, BlobState::Directory)
            }
        };
        let node = Self::attached(ctx, account, bucket, &key);
        if let Some(info) = container {
            node.container.set(info);
        }
        node.state.set(state);
        node
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Full object key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key prefix of everything below this node, delimiter included.
    fn prefix(&self) -> String {
        format!("{}{}", self.key, self.ctx.delimiter())
    }

    async fn container(&self) -> Option<BucketInfo> {
        if let Some(info) = self.container.get() {
            return Some(info);
        }
        let fetched = async {
            let storage = self.account.storage().await?;
            storage.get_bucket(&self.bucket).await
        }
        .await;
        match fetched {
            Ok(Some(info)) => {
                self.container.set(info.clone());
                Some(info)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(location = %self.location, error = %e, "cannot fetch bucket");
                None
            }
        }
    }

    async fn state(&self) -> BlobState {
        memoized(&self.state, "state", &self.location, BlobState::Missing, || {
            self.probe()
        })
        .await
    }

    async fn probe(&self) -> VfsResult<BlobState> {
        let storage = self.account.storage().await?;
        if let Some(info) = storage.get_object(&self.bucket, &self.key).await? {
            return Ok(BlobState::Object(info));
        }
        let below = storage
            .list(&self.bucket, &self.prefix(), Some(self.ctx.delimiter()))
            .await?;
        Ok(if below.is_empty() {
            BlobState::Missing
        } else {
            BlobState::Directory
        })
    }

    async fn storage(&self, action: &str) -> VfsResult<Arc<dyn ObjectStore>> {
        self.account
            .storage()
            .await
            .map_err(|e| self.failed(action, e))
    }

    fn failed(&self, action: &str, cause: VfsError) -> VfsError {
        VfsError::backend(format!("unable to {action} {}", self.location), cause)
    }
}

/// Write an empty `prefix` marker object.
async fn write_marker(storage: &dyn ObjectStore, bucket: &str, prefix: &str) -> VfsResult<()> {
    let mut writer = storage.open_write(bucket, prefix, false).await?;
    writer.shutdown().await?;
    Ok(())
}

fn entry_key(entry: &ListEntry) -> &str {
    match entry {
        ListEntry::Object(info) => &info.key,
        ListEntry::Prefix(prefix) => prefix,
    }
}

#[async_trait]
impl RemoteFile for BlobNode {
    fn location(&self) -> Location {
        self.location.clone()
    }

    fn name(&self) -> String {
        let delimiter = self.ctx.delimiter();
        if delimiter.is_empty() {
            return self.key.clone();
        }
        self.key
            .rsplit(delimiter)
            .next()
            .unwrap_or(&self.key)
            .to_string()
    }

    fn parent(&self) -> Option<VfsFile> {
        let account = Arc::clone(&self.account);
        let delimiter = self.ctx.delimiter();
        let parent_key = match self.key.rsplit_once(delimiter) {
            Some((parent, _)) if !delimiter.is_empty() && !parent.is_empty() => parent,
            _ => {
                return Some(VfsFile::Bucket(BucketNode::attached(
                    self.ctx.clone(),
                    account,
                    &self.bucket,
                )));
            }
        };
        Some(VfsFile::Blob(BlobNode::attached(
            self.ctx.clone(),
            account,
            &self.bucket,
            parent_key,
        )))
    }

    async fn exists(&self) -> bool {
        !matches!(self.state().await, BlobState::Missing)
    }

    async fn is_directory(&self) -> bool {
        matches!(self.state().await, BlobState::Directory)
    }

    async fn is_hidden(&self) -> bool {
        false
    }

    async fn size(&self) -> u64 {
        match self.state().await {
            BlobState::Object(info) => info.size,
            BlobState::Directory | BlobState::Missing => 0,
        }
    }

    async fn date(&self) -> u64 {
        if self.container().await.is_none() {
            return 0;
        }
        match self.state().await {
            BlobState::Object(info) => epoch_millis(info.updated),
            BlobState::Directory | BlobState::Missing => 0,
        }
    }

    async fn can_read(&self) -> bool {
        self.exists().await
    }

    async fn can_write(&self) -> bool {
        self.exists().await
    }

    async fn list(&self) -> VfsResult<Vec<VfsFile>> {
        match self.state().await {
            BlobState::Directory => {}
            BlobState::Object(_) => {
                return Err(VfsError::not_a_directory(self.location.to_string()));
            }
            BlobState::Missing => return Err(VfsError::not_found(self.location.to_string())),
        }

        let prefix = self.prefix();
        let storage = self.storage("list").await?;
        let entries = storage
            .list(&self.bucket, &prefix, Some(self.ctx.delimiter()))
            .await
            .map_err(|e| self.failed("list", e))?;

        let container = self.container.get();
        Ok(entries
            .into_iter()
            .filter(|entry| entry_key(entry) != prefix)
            .map(|entry| {
                VfsFile::Blob(BlobNode::listed(
                    self.ctx.clone(),
                    Arc::clone(&self.account),
                    &self.bucket,
                    container.clone(),
                    entry,
                ))
            })
            .collect())
    }

    async fn mkdir(&self) -> VfsResult<()> {
        self.state.clear();
        let storage = self.storage("create").await?;
        let current = self.probe().await.map_err(|e| self.failed("create", e))?;
        if !matches!(current, BlobState::Missing) {
            return Err(VfsError::already_exists(self.location.to_string()));
        }

        write_marker(storage.as_ref(), &self.bucket, &self.prefix())
            .await
            .map_err(|e| self.failed("create", e))?;
        tracing::debug!(location = %self.location, "created directory marker");
        Ok(())
    }

    async fn mkdir_child(&self, name: &str) -> VfsResult<VfsFile> {
        let delimiter = self.ctx.delimiter();
        let name = name.trim_matches(|c: char| delimiter.contains(c));
        if name.is_empty() {
            return Err(VfsError::invalid_location(format!(
                "empty directory name under {}",
                self.location
            )));
        }
        let child = BlobNode::attached(
            self.ctx.clone(),
            Arc::clone(&self.account),
            &self.bucket,
            &format!("{}{name}", self.prefix()),
        );
        child.mkdir().await?;
        self.state.clear();
        Ok(VfsFile::Blob(child))
    }

    async fn delete(&self) -> VfsResult<()> {
        self.state.clear();
        let storage = self.storage("delete").await?;

        let removed = storage
            .delete_object(&self.bucket, &self.key)
            .await
            .map_err(|e| self.failed("delete", e))?;
        if removed {
            return Ok(());
        }

        let prefix = self.prefix();
        let below = storage
            .list(&self.bucket, &prefix, Some(self.ctx.delimiter()))
            .await
            .map_err(|e| self.failed("delete", e))?;
        if below.iter().any(|entry| entry_key(entry) != prefix) {
            return Err(VfsError::directory_not_empty(self.location.to_string()));
        }

        let removed = storage
            .delete_object(&self.bucket, &prefix)
            .await
            .map_err(|e| self.failed("delete", e))?;
        if removed {
            Ok(())
        } else {
            Err(VfsError::not_found(self.location.to_string()))
        }
    }

    async fn input_stream(&self) -> VfsResult<ByteReader> {
        if let BlobState::Directory = self.state().await {
            return Err(VfsError::is_a_directory(self.location.to_string()));
        }
        let storage = self.storage("read").await?;
        storage.open_read(&self.bucket, &self.key).await
    }

    async fn output_stream(&self, append: bool) -> VfsResult<ByteWriter> {
        if let BlobState::Directory = self.state().await {
            return Err(VfsError::is_a_directory(self.location.to_string()));
        }
        let storage = self.storage("write").await?;
        let writer = storage.open_write(&self.bucket, &self.key, append).await;
        self.state.clear();
        writer
    }

    async fn move_to(&self, destination: &VfsFile) -> bool {
        let VfsFile::Blob(dest) = destination else {
            return false;
        };
        if !self.account.same_account(&dest.account) {
            return false;
        }
        if !matches!(self.state().await, BlobState::Object(_))
            || matches!(dest.state().await, BlobState::Directory)
        {
            return false;
        }

        let renamed = async {
            let storage = self.account.storage().await?;
            storage
                .rename_object(&self.bucket, &self.key, &dest.bucket, &dest.key)
                .await
        }
        .await;
        match renamed {
            Ok(()) => {
                self.state.clear();
                dest.state.clear();
                true
            }
            Err(e) => {
                tracing::debug!(from = %self.location, to = %dest.location, error = %e, "rename refused");
                false
            }
        }
    }
}

impl PartialEq for BlobNode {
    fn eq(&self, other: &Self) -> bool {
        self.account.same_account(&other.account)
            && self.bucket == other.bucket
            && self.key == other.key
    }
}

impl fmt::Debug for BlobNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobNode")
            .field("location", &self.location)
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MemoryObjectStore, ObjectOp};
    use crate::config::VfsConfig;
    use crate::credentials::MemoryCredentialStore;
    use tokio::io::AsyncReadExt;

    fn ctx() -> Context {
        Context {
            credentials: Arc::new(MemoryCredentialStore::new()),
            config: Arc::new(VfsConfig::default()),
        }
    }

    fn blob(store: &MemoryObjectStore, url: &str) -> BlobNode {
        BlobNode::new(
            ctx(),
            Arc::new(store.clone()),
            &Location::parse(url).unwrap(),
        )
        .unwrap()
    }

    fn seeded() -> MemoryObjectStore {
        let store = MemoryObjectStore::new("proj");
        store.put("data", "reports/2024/jan.csv", "a,b\n1,2\n");
        store.put("data", "reports/2024/feb.csv", "a,b\n");
        store.put("data", "reports/summary.txt", "ok");
        store.put("data", "readme.md", "# data");
        store
    }

    #[tokio::test]
    async fn test_object_attributes() {
        let store = seeded();
        let jan = blob(&store, "gcs://proj/data/reports/2024/jan.csv");

        assert_eq!(jan.name(), "jan.csv");
        assert_eq!(jan.key(), "reports/2024/jan.csv");
        assert!(jan.exists().await);
        assert!(!jan.is_directory().await);
        assert_eq!(jan.size().await, 8);
        assert!(jan.date().await > 0);

        let calls = store.total_calls();
        jan.size().await;
        jan.is_directory().await;
        assert_eq!(store.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_pseudo_directory() {
        let store = seeded();
        let dir = blob(&store, "gcs://proj/data/reports/");

        assert!(dir.exists().await);
        assert!(dir.is_directory().await);
        assert_eq!(dir.size().await, 0);

        let children = dir.list().await.unwrap();
        let names: Vec<String> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["2024", "summary.txt"]);
        assert!(children[0].is_directory().await);
        assert_eq!(children[1].size().await, 2);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = seeded();
        let ghost = blob(&store, "gcs://proj/data/nope");
        assert!(!ghost.exists().await);
        assert_eq!(ghost.size().await, 0);
        assert!(ghost.list().await.unwrap_err().is_not_found());

        let file = blob(&store, "gcs://proj/data/readme.md");
        assert!(matches!(
            file.list().await.unwrap_err(),
            VfsError::NotADirectory(_)
        ));
    }

    #[tokio::test]
    async fn test_date_zero_without_bucket() {
        let store = MemoryObjectStore::new("proj");
        let orphan = blob(&store, "gcs://proj/gone/key");
        assert_eq!(orphan.date().await, 0);
        assert!(!orphan.exists().await);
    }

    #[tokio::test]
    async fn test_mkdir_marker_and_list_filters_it() {
        let store = seeded();
        let dir = blob(&store, "gcs://proj/data/archive");
        assert!(!dir.exists().await);

        dir.mkdir().await.unwrap();
        assert_eq!(store.contents("data", "archive/").as_deref(), Some(&b""[..]));
        assert!(dir.exists().await);
        assert!(dir.is_directory().await);
        assert!(dir.list().await.unwrap().is_empty());

        let err = dir.mkdir().await.unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));

        let child = dir.mkdir_child("2023").await.unwrap();
        assert_eq!(child.location().to_string(), "gcs://proj/data/archive/2023");
        assert_eq!(dir.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let store = seeded();
        let readme = blob(&store, "gcs://proj/data/readme.md");
        assert!(readme.exists().await);
        readme.delete().await.unwrap();
        assert!(!readme.exists().await);
        assert!(readme.delete().await.unwrap_err().is_not_found());

        let reports = blob(&store, "gcs://proj/data/reports");
        assert!(matches!(
            reports.delete().await.unwrap_err(),
            VfsError::DirectoryNotEmpty(_)
        ));

        store.put("data", "empty/", "");
        let empty = blob(&store, "gcs://proj/data/empty");
        empty.delete().await.unwrap();
        assert!(store.contents("data", "empty/").is_none());
    }

    #[tokio::test]
    async fn test_streams() {
        let store = seeded();
        store.add_bucket("data");
        let new = blob(&store, "gcs://proj/data/notes/today.txt");
        assert!(!new.exists().await);

        let mut w = new.output_stream(false).await.unwrap();
        w.write_all(b"hello").await.unwrap();
        w.shutdown().await.unwrap();
        assert!(new.exists().await);

        let mut out = String::new();
        new.input_stream()
            .await
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        assert_eq!(out, "hello");

        let dir = blob(&store, "gcs://proj/data/reports");
        assert!(matches!(
            dir.input_stream().await.err(),
            Some(VfsError::IsADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_move_to() {
        let store = seeded();
        store.add_bucket("archive");
        let src = blob(&store, "gcs://proj/data/readme.md");
        let dest = VfsFile::Blob(blob(&store, "gcs://proj/archive/old/readme.md"));

        assert!(src.move_to(&dest).await);
        assert!(!src.exists().await);
        assert!(dest.exists().await);
        assert_eq!(store.contents("archive", "old/readme.md").unwrap(), b"# data");

        let dir = blob(&store, "gcs://proj/data/reports");
        let target = VfsFile::Blob(blob(&store, "gcs://proj/archive/reports"));
        assert!(!dir.move_to(&target).await);

        let elsewhere = MemoryObjectStore::new("other");
        elsewhere.add_bucket("data");
        let foreign = VfsFile::Blob(blob(&elsewhere, "gcs://other/data/x"));
        let jan = blob(&store, "gcs://proj/data/reports/2024/jan.csv");
        assert!(!jan.move_to(&foreign).await);
        assert_eq!(store.calls(ObjectOp::RenameObject), 1);
    }

    #[tokio::test]
    async fn test_equality_by_bucket_and_key() {
        let store = seeded();
        let a = blob(&store, "gcs://proj/data/x/name.txt");
        let b = blob(&store, "gcs://proj/data/x/name.txt");
        let c = blob(&store, "gcs://proj/data/y/name.txt");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.name(), c.name());
    }

    #[tokio::test]
    async fn test_parent_chain() {
        let store = seeded();
        let jan = blob(&store, "gcs://proj/data/reports/2024/jan.csv");
        let parent = jan.parent().unwrap();
        assert!(matches!(parent, VfsFile::Blob(_)));
        assert_eq!(parent.location().to_string(), "gcs://proj/data/reports/2024");

        let top = blob(&store, "gcs://proj/data/readme.md");
        assert!(matches!(top.parent(), Some(VfsFile::Bucket(_))));
    }
}
