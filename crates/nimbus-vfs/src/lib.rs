//! # nimbus-vfs
//!
//! One file API over remote storage with different hierarchy models.
//!
//! - [`Vfs`] - Resolves location strings to files by scheme
//! - [`RemoteFile`] - The operations every file supports
//! - [`VfsFile`] - Closed set of adapters: SMB node, bucket, blob
//! - [`Location`] - Parsed address; carries a credential but never shows it
//! - [`CredentialStore`] - Registry of credentials keyed by stripped location
//!
//! ## Design Decisions
//!
//! - **Attribute reads never fail**: a missing target or a remote error
//!   reads as a default, so one bad entry cannot abort a large listing.
//!   Listing and mutations return errors; moves return `false`.
//! - **Per-instance memoization**: each file keeps the attributes it has
//!   fetched; mutations through that file clear them. Files never share
//!   attribute state.
//! - **Injectable registry**: credentials typed into a location are
//!   registered in the [`Vfs`]'s own store, not a process global.
//! - **Native client seams**: adapters talk to [`SmbClient`] and
//!   [`ObjectStore`]; the in-memory clients implement both for tests.

mod adapters;
pub mod backends;
pub mod config;
pub mod credentials;
mod error;
pub mod file;
pub mod location;
mod registry;

pub use adapters::{BlobNode, BucketNode, SmbFile};
pub use backends::{
    ByteReader, ByteWriter, MemoryObjectStore, MemorySmbShare, ObjectStore, ObjectStoreConnector,
    SmbClient,
};
pub use config::{ObjectStoreConfig, SmbConfig, VfsConfig};
pub use credentials::{Credential, CredentialStore, MemoryCredentialStore};
pub use error::{BoxError, VfsError, VfsResult};
pub use file::{AdapterKind, RemoteFile, VfsFile};
pub use location::Location;
pub use registry::{BackendKind, SchemeInfo, Vfs};
