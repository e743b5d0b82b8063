//! Serialized Byte Sinks

use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Boxed writable half of any stream the relay can feed
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A cloneable writer that serializes every write behind one lock.
///
/// Any number of pumps may hold a clone and write concurrently; each byte is
/// written and flushed while the lock is held, so writes never interleave
/// below byte granularity.
#[derive(Clone)]
pub struct SharedSink {
    label: Arc<str>,
    inner: Arc<Mutex<BoxedWriter>>,
}

impl SharedSink {
    /// Wrap a writer
    pub fn new<W>(label: impl Into<Arc<str>>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_boxed(label, Box::new(writer))
    }

    pub fn from_boxed(label: impl Into<Arc<str>>, writer: BoxedWriter) -> Self {
        Self {
            label: label.into(),
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write a single byte and flush it through
    pub async fn write_byte(&self, byte: u8) -> io::Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(&[byte]).await?;
        writer.flush().await
    }

    /// Shut down the underlying writer, closing its side of the stream
    pub async fn shutdown(&self) -> io::Result<()> {
        self.inner.lock().await.shutdown().await
    }

    /// Whether both handles refer to the same underlying writer
    pub fn same_as(&self, other: &SharedSink) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSink")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
