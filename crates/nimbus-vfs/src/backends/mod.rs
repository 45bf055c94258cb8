//! Native client seams.
//!
//! Adapters never talk to a protocol library directly; they go through
//! [`SmbClient`] or [`ObjectStore`]. The in-memory implementations here are
//! the reference clients used by tests and local tooling.

mod object;
mod smb;

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};

pub use object::{
    BucketInfo, ListEntry, MemoryObjectStore, ObjectInfo, ObjectOp, ObjectStore,
    ObjectStoreConnector,
};
pub use smb::{MemorySmbShare, SmbClient, SmbOp};

/// Byte stream opened for reading.
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte stream opened for writing.
pub type ByteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Error returned by an injected failure.
fn injected(op: impl std::fmt::Display, target: &str) -> crate::VfsError {
    io::Error::new(
        io::ErrorKind::ConnectionReset,
        format!("{op} on {target}: connection reset"),
    )
    .into()
}

/// Writer appending straight into a shared in-memory buffer.
struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    fn boxed(buf: Arc<Mutex<Vec<u8>>>) -> ByteWriter {
        Box::new(Self { buf })
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buf.lock().extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Reader over a snapshot of a buffer.
fn snapshot_reader(buf: &Mutex<Vec<u8>>) -> ByteReader {
    Box::new(io::Cursor::new(buf.lock().clone()))
}
