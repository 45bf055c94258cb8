//! The file contract every adapter implements.

use async_trait::async_trait;
use std::fmt;

use crate::adapters::{BlobNode, BucketNode, SmbFile};
use crate::backends::{ByteReader, ByteWriter};
use crate::error::VfsResult;
use crate::location::Location;

/// Uniform operations over a remote file or directory.
///
/// Attribute reads never fail: a missing target or a remote error reads as
/// the attribute's default (`false`, `0`). Listing and mutations return
/// errors. Moves report failure as `false` so the caller can fall back to
/// copy and delete.
#[async_trait]
pub trait RemoteFile: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Stripped location of this file.
    fn location(&self) -> Location;

    /// Display name.
    fn name(&self) -> String;

    /// Parent directory, `None` at the top of the backend.
    fn parent(&self) -> Option<VfsFile>;

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Whether the target exists.
    async fn exists(&self) -> bool;

    async fn is_directory(&self) -> bool;

    async fn is_hidden(&self) -> bool;

    /// Size in bytes, 0 for directories or when unknown.
    async fn size(&self) -> u64;

    /// Last modification, milliseconds since the Unix epoch; 0 when unknown.
    async fn date(&self) -> u64;

    async fn can_read(&self) -> bool;

    async fn can_write(&self) -> bool;

    // ========================================================================
    // Directories
    // ========================================================================

    /// Direct children.
    ///
    /// Fails when the target is missing or not a directory, so an empty
    /// directory and an unlistable one stay distinguishable. Every call asks
    /// the backend again.
    async fn list(&self) -> VfsResult<Vec<VfsFile>>;

    /// Create this file as a directory.
    async fn mkdir(&self) -> VfsResult<()>;

    /// Create a directory named `name` under this one.
    async fn mkdir_child(&self, name: &str) -> VfsResult<VfsFile>;

    /// Delete the target. Fails if it was already absent.
    async fn delete(&self) -> VfsResult<()>;

    // ========================================================================
    // Content
    // ========================================================================

    async fn input_stream(&self) -> VfsResult<ByteReader>;

    /// Open for writing, truncating unless `append`.
    async fn output_stream(&self, append: bool) -> VfsResult<ByteWriter>;

    /// Rename onto `destination`. `false` when the backends differ or the
    /// backend refuses.
    async fn move_to(&self, destination: &VfsFile) -> bool;
}

/// Which adapter backs a [`VfsFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AdapterKind {
    Smb,
    Bucket,
    Blob,
}

/// A remote file, from whichever adapter resolved it.
#[derive(Debug)]
pub enum VfsFile {
    /// Node on a hierarchical share.
    Smb(SmbFile),
    /// Object-storage container.
    Bucket(BucketNode),
    /// Object-storage key or pseudo-directory.
    Blob(BlobNode),
}

impl VfsFile {
    pub fn kind(&self) -> AdapterKind {
        match self {
            VfsFile::Smb(_) => AdapterKind::Smb,
            VfsFile::Bucket(_) => AdapterKind::Bucket,
            VfsFile::Blob(_) => AdapterKind::Blob,
        }
    }

    fn inner(&self) -> &dyn RemoteFile {
        match self {
            VfsFile::Smb(file) => file,
            VfsFile::Bucket(node) => node,
            VfsFile::Blob(node) => node,
        }
    }
}

#[async_trait]
impl RemoteFile for VfsFile {
    fn location(&self) -> Location {
        self.inner().location()
    }

    fn name(&self) -> String {
        self.inner().name()
    }

    fn parent(&self) -> Option<VfsFile> {
        self.inner().parent()
    }

    async fn exists(&self) -> bool {
        self.inner().exists().await
    }

    async fn is_directory(&self) -> bool {
        self.inner().is_directory().await
    }

    async fn is_hidden(&self) -> bool {
        self.inner().is_hidden().await
    }

    async fn size(&self) -> u64 {
        self.inner().size().await
    }

    async fn date(&self) -> u64 {
        self.inner().date().await
    }

    async fn can_read(&self) -> bool {
        self.inner().can_read().await
    }

    async fn can_write(&self) -> bool {
        self.inner().can_write().await
    }

    async fn list(&self) -> VfsResult<Vec<VfsFile>> {
        self.inner().list().await
    }

    async fn mkdir(&self) -> VfsResult<()> {
        self.inner().mkdir().await
    }

    async fn mkdir_child(&self, name: &str) -> VfsResult<VfsFile> {
        self.inner().mkdir_child(name).await
    }

    async fn delete(&self) -> VfsResult<()> {
        self.inner().delete().await
    }

    async fn input_stream(&self) -> VfsResult<ByteReader> {
        self.inner().input_stream().await
    }

    async fn output_stream(&self, append: bool) -> VfsResult<ByteWriter> {
        self.inner().output_stream(append).await
    }

    async fn move_to(&self, destination: &VfsFile) -> bool {
        self.inner().move_to(destination).await
    }
}

/// Same-adapter files compare by native identity; files from different
/// adapters fall back to comparing stripped locations.
impl PartialEq for VfsFile {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VfsFile::Smb(a), VfsFile::Smb(b)) => a == b,
            (VfsFile::Bucket(a), VfsFile::Bucket(b)) => a == b,
            (VfsFile::Blob(a), VfsFile::Blob(b)) => a == b,
            _ => self.location() == other.location(),
        }
    }
}

impl fmt::Display for VfsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
