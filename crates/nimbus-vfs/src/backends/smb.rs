//! Hierarchical (SMB-style) native client.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use super::{ByteReader, ByteWriter, MemoryWriter, injected, snapshot_reader};
use crate::credentials::Credential;
use crate::error::{VfsError, VfsResult};
use crate::location::Location;

/// Native operations, for call accounting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SmbOp {
    Open,
    Exists,
    IsDirectory,
    IsHidden,
    Length,
    LastModified,
    CanRead,
    CanWrite,
    List,
    Mkdir,
    Delete,
    Rename,
    Read,
    Write,
}

/// Client for a tree-structured remote filesystem.
///
/// Every call takes the location with its credential embedded; the client
/// authenticates per call. Missing targets are reported as
/// [`VfsError::NotFound`].
#[async_trait]
pub trait SmbClient: Send + Sync {
    /// Open a handle: return the canonical (stripped) location of an
    /// existing target, or fail if it is absent or unreachable.
    async fn open(&self, url: &Location) -> VfsResult<Location>;

    /// Whether the target exists.
    async fn exists(&self, url: &Location) -> VfsResult<bool>;

    /// Whether the target is a directory.
    async fn is_directory(&self, url: &Location) -> VfsResult<bool>;

    /// Whether the target carries the hidden attribute.
    async fn is_hidden(&self, url: &Location) -> VfsResult<bool>;

    /// Size in bytes.
    async fn length(&self, url: &Location) -> VfsResult<u64>;

    /// Last modification time.
    async fn last_modified(&self, url: &Location) -> VfsResult<SystemTime>;

    /// Whether the caller may read the target.
    async fn can_read(&self, url: &Location) -> VfsResult<bool>;

    /// Whether the caller may write the target.
    async fn can_write(&self, url: &Location) -> VfsResult<bool>;

    /// Names of the direct children of a directory.
    async fn list(&self, url: &Location) -> VfsResult<Vec<String>>;

    /// Create a directory. The parent must exist.
    async fn mkdir(&self, url: &Location) -> VfsResult<()>;

    /// Delete a file, or a directory with everything under it.
    async fn delete(&self, url: &Location) -> VfsResult<()>;

    /// Rename within the same host.
    async fn rename(&self, from: &Location, to: &Location) -> VfsResult<()>;

    /// Open a file for reading.
    async fn open_read(&self, url: &Location) -> VfsResult<ByteReader>;

    /// Open a file for writing, creating it if needed.
    async fn open_write(&self, url: &Location, append: bool) -> VfsResult<ByteWriter>;
}

#[derive(Debug, Clone, Copy)]
struct Meta {
    modified: SystemTime,
    hidden: bool,
    read_only: bool,
}

impl Meta {
    fn now() -> Self {
        Self {
            modified: SystemTime::now(),
            hidden: false,
            read_only: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    File { data: Arc<Mutex<Vec<u8>>>, meta: Meta },
    Directory { meta: Meta },
}

impl Entry {
    fn meta(&self) -> &Meta {
        match self {
            Entry::File { meta, .. } | Entry::Directory { meta } => meta,
        }
    }

    fn meta_mut(&mut self) -> &mut Meta {
        match self {
            Entry::File { meta, .. } | Entry::Directory { meta } => meta,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }
}

type Key = Vec<String>;

/// In-memory SMB host.
///
/// The first path segment is the share name, as on a real server. The host
/// root always exists and lists the shares. Thread-safe via internal locks.
#[derive(Debug)]
pub struct MemorySmbShare {
    host: String,
    credential: Option<Credential>,
    entries: RwLock<HashMap<Key, Entry>>,
    calls: Mutex<HashMap<SmbOp, usize>>,
    failures: Mutex<HashSet<(SmbOp, Key)>>,
}

impl MemorySmbShare {
    /// Create an empty host that accepts anonymous access.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            credential: None,
            entries: RwLock::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// Require this credential on every call.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Create a directory and any missing parents.
    pub fn add_dir(&self, path: &str) {
        let key = key_of(path);
        let mut entries = self.entries.write();
        ensure_parents(&mut entries, &key);
        entries
            .entry(key)
            .or_insert(Entry::Directory { meta: Meta::now() });
    }

    /// Create or replace a file, creating missing parents.
    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let key = key_of(path);
        let mut entries = self.entries.write();
        ensure_parents(&mut entries, &key);
        entries.insert(
            key,
            Entry::File {
                data: Arc::new(Mutex::new(data.into())),
                meta: Meta::now(),
            },
        );
    }

    /// Set the hidden attribute.
    pub fn set_hidden(&self, path: &str, hidden: bool) {
        if let Some(entry) = self.entries.write().get_mut(&key_of(path)) {
            entry.meta_mut().hidden = hidden;
        }
    }

    /// Set the read-only attribute.
    pub fn set_read_only(&self, path: &str, read_only: bool) {
        if let Some(entry) = self.entries.write().get_mut(&key_of(path)) {
            entry.meta_mut().read_only = read_only;
        }
    }

    /// Set the modification time.
    pub fn set_modified(&self, path: &str, modified: SystemTime) {
        if let Some(entry) = self.entries.write().get_mut(&key_of(path)) {
            entry.meta_mut().modified = modified;
        }
    }

    /// Whether anything exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        let key = key_of(path);
        key.is_empty() || self.entries.read().contains_key(&key)
    }

    /// Contents of the file at `path`.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.entries.read().get(&key_of(path)) {
            Some(Entry::File { data, .. }) => Some(data.lock().clone()),
            _ => None,
        }
    }

    /// Make `op` on `path` fail with a connection error until healed.
    pub fn fail(&self, op: SmbOp, path: &str) {
        self.failures.lock().insert((op, key_of(path)));
    }

    /// Undo [`fail`](Self::fail).
    pub fn heal(&self, op: SmbOp, path: &str) {
        self.failures.lock().remove(&(op, key_of(path)));
    }

    /// Number of `op` calls received.
    pub fn calls(&self, op: SmbOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Number of calls received, all operations.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Accept a call: count it, authenticate it, apply injected failures.
    fn accept(&self, op: SmbOp, url: &Location) -> VfsResult<Key> {
        *self.calls.lock().entry(op).or_default() += 1;

        if url.host() != self.host {
            return Err(VfsError::not_found(format!("host {}", url.host())));
        }
        if let Some(required) = &self.credential {
            if url.credential() != Some(required) {
                return Err(VfsError::permission_denied(url.to_string()));
            }
        }

        let key = url.segments().to_vec();
        if self.failures.lock().contains(&(op, key.clone())) {
            return Err(injected(op, &url.to_string()));
        }
        Ok(key)
    }

    fn with_entry<T>(&self, url: &Location, key: &Key, f: impl FnOnce(&Entry) -> T) -> VfsResult<T> {
        self.entries
            .read()
            .get(key)
            .map(f)
            .ok_or_else(|| VfsError::not_found(url.to_string()))
    }
}

fn key_of(path: &str) -> Key {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn ensure_parents(entries: &mut HashMap<Key, Entry>, key: &Key) {
    for end in 1..key.len() {
        entries
            .entry(key[..end].to_vec())
            .or_insert(Entry::Directory { meta: Meta::now() });
    }
}

/// Check that the parent of `key` is an existing directory.
fn check_parent(entries: &HashMap<Key, Entry>, url: &Location, key: &Key) -> VfsResult<()> {
    let Some((_, parent)) = key.split_last() else {
        return Err(VfsError::permission_denied("cannot modify the host root"));
    };
    if parent.is_empty() {
        return Ok(());
    }
    match entries.get(parent) {
        Some(Entry::Directory { .. }) => Ok(()),
        Some(_) => Err(VfsError::not_a_directory(url.to_string())),
        None => Err(VfsError::not_found(format!("parent of {url}"))),
    }
}

#[async_trait]
impl SmbClient for MemorySmbShare {
    async fn open(&self, url: &Location) -> VfsResult<Location> {
        let key = self.accept(SmbOp::Open, url)?;
        if key.is_empty() || self.entries.read().contains_key(&key) {
            Ok(url.strip())
        } else {
            Err(VfsError::not_found(url.to_string()))
        }
    }

    async fn exists(&self, url: &Location) -> VfsResult<bool> {
        let key = self.accept(SmbOp::Exists, url)?;
        Ok(key.is_empty() || self.entries.read().contains_key(&key))
    }

    async fn is_directory(&self, url: &Location) -> VfsResult<bool> {
        let key = self.accept(SmbOp::IsDirectory, url)?;
        if key.is_empty() {
            return Ok(true);
        }
        self.with_entry(url, &key, Entry::is_dir)
    }

    async fn is_hidden(&self, url: &Location) -> VfsResult<bool> {
        let key = self.accept(SmbOp::IsHidden, url)?;
        if key.is_empty() {
            return Ok(false);
        }
        self.with_entry(url, &key, |e| e.meta().hidden)
    }

    async fn length(&self, url: &Location) -> VfsResult<u64> {
        let key = self.accept(SmbOp::Length, url)?;
        if key.is_empty() {
            return Ok(0);
        }
        self.with_entry(url, &key, |e| match e {
            Entry::File { data, .. } => data.lock().len() as u64,
            Entry::Directory { .. } => 0,
        })
    }

    async fn last_modified(&self, url: &Location) -> VfsResult<SystemTime> {
        let key = self.accept(SmbOp::LastModified, url)?;
        if key.is_empty() {
            return Ok(SystemTime::UNIX_EPOCH);
        }
        self.with_entry(url, &key, |e| e.meta().modified)
    }

    async fn can_read(&self, url: &Location) -> VfsResult<bool> {
        let key = self.accept(SmbOp::CanRead, url)?;
        if key.is_empty() {
            return Ok(true);
        }
        self.with_entry(url, &key, |_| true)
    }

    async fn can_write(&self, url: &Location) -> VfsResult<bool> {
        let key = self.accept(SmbOp::CanWrite, url)?;
        if key.is_empty() {
            return Ok(false);
        }
        self.with_entry(url, &key, |e| !e.meta().read_only)
    }

    async fn list(&self, url: &Location) -> VfsResult<Vec<String>> {
        let key = self.accept(SmbOp::List, url)?;
        let entries = self.entries.read();

        if !key.is_empty() {
            match entries.get(&key) {
                Some(Entry::Directory { .. }) => {}
                Some(_) => return Err(VfsError::not_a_directory(url.to_string())),
                None => return Err(VfsError::not_found(url.to_string())),
            }
        }

        let mut names: Vec<String> = entries
            .keys()
            .filter(|k| k.len() == key.len() + 1 && k.starts_with(&key))
            .filter_map(|k| k.last().cloned())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn mkdir(&self, url: &Location) -> VfsResult<()> {
        let key = self.accept(SmbOp::Mkdir, url)?;
        let mut entries = self.entries.write();

        if key.is_empty() || entries.contains_key(&key) {
            return Err(VfsError::already_exists(url.to_string()));
        }
        check_parent(&entries, url, &key)?;

        entries.insert(key, Entry::Directory { meta: Meta::now() });
        Ok(())
    }

    async fn delete(&self, url: &Location) -> VfsResult<()> {
        let key = self.accept(SmbOp::Delete, url)?;
        if key.is_empty() {
            return Err(VfsError::permission_denied("cannot remove the host root"));
        }

        let mut entries = self.entries.write();
        match entries.get(&key) {
            Some(entry) if entry.meta().read_only => {
                return Err(VfsError::permission_denied(url.to_string()));
            }
            Some(_) => {}
            None => return Err(VfsError::not_found(url.to_string())),
        }

        entries.retain(|k, _| !k.starts_with(&key));
        Ok(())
    }

    async fn rename(&self, from: &Location, to: &Location) -> VfsResult<()> {
        let from_key = self.accept(SmbOp::Rename, from)?;
        if to.host() != self.host {
            return Err(VfsError::unsupported(format!(
                "rename across hosts: {from} -> {to}"
            )));
        }
        let to_key = to.segments().to_vec();
        if from_key.is_empty() || to_key.is_empty() {
            return Err(VfsError::permission_denied("cannot rename the host root"));
        }
        if to_key.starts_with(&from_key) {
            return Err(VfsError::invalid_location(format!(
                "cannot move {from} inside itself"
            )));
        }

        let mut entries = self.entries.write();
        if !entries.contains_key(&from_key) {
            return Err(VfsError::not_found(from.to_string()));
        }
        if entries.contains_key(&to_key) {
            return Err(VfsError::already_exists(to.to_string()));
        }
        check_parent(&entries, to, &to_key)?;

        let moved: Vec<Key> = entries
            .keys()
            .filter(|k| k.starts_with(&from_key))
            .cloned()
            .collect();
        for old in moved {
            if let Some(entry) = entries.remove(&old) {
                let mut new_key = to_key.clone();
                new_key.extend_from_slice(&old[from_key.len()..]);
                entries.insert(new_key, entry);
            }
        }
        Ok(())
    }

    async fn open_read(&self, url: &Location) -> VfsResult<ByteReader> {
        let key = self.accept(SmbOp::Read, url)?;
        match self.entries.read().get(&key) {
            Some(Entry::File { data, .. }) => Ok(snapshot_reader(data)),
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(url.to_string())),
            None if key.is_empty() => Err(VfsError::is_a_directory(url.to_string())),
            None => Err(VfsError::not_found(url.to_string())),
        }
    }

    async fn open_write(&self, url: &Location, append: bool) -> VfsResult<ByteWriter> {
        let key = self.accept(SmbOp::Write, url)?;
        let mut entries = self.entries.write();

        match entries.get_mut(&key) {
            Some(Entry::File { data, meta }) => {
                if meta.read_only {
                    return Err(VfsError::permission_denied(url.to_string()));
                }
                if !append {
                    data.lock().clear();
                }
                meta.modified = SystemTime::now();
                Ok(MemoryWriter::boxed(Arc::clone(data)))
            }
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(url.to_string())),
            None => {
                check_parent(&entries, url, &key)?;
                let data = Arc::new(Mutex::new(Vec::new()));
                entries.insert(
                    key,
                    Entry::File {
                        data: Arc::clone(&data),
                        meta: Meta::now(),
                    },
                );
                Ok(MemoryWriter::boxed(data))
            }
        }
    }
}
