//! Byte Dispatcher
//!
//! Pumps bytes one at a time from a source stream to either a single sink or
//! to every peer in the [`Registry`]. Single-byte granularity keeps
//! interactive sessions responsive: each keystroke and each output character
//! is forwarded as soon as it is read.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, error, warn};

use super::registry::Registry;
use super::sink::SharedSink;

/// Boxed readable half of any stream the relay pumps from
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where a pump delivers the bytes it reads
#[derive(Debug, Clone)]
pub enum Destination {
    /// One specific writer; a failed write stops the pump
    Direct(SharedSink),
    /// Every registered peer; a failed write only evicts that peer
    Broadcast(Registry),
}

/// Why a pump stopped
#[derive(Debug)]
pub enum PumpEnd {
    EndOfStream,
    ReadError(io::Error),
    WriteError(io::Error),
}

/// Outcome of a finished pump
#[derive(Debug)]
pub struct DispatchSummary {
    pub bytes: u64,
    pub end: PumpEnd,
}

impl DispatchSummary {
    pub fn is_clean(&self) -> bool {
        matches!(self.end, PumpEnd::EndOfStream)
    }
}

/// Relay bytes from `source` to `destination` until end-of-stream or error.
pub async fn dispatch<R>(source: R, destination: Destination) -> DispatchSummary
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut byte = [0u8; 1];
    let mut bytes = 0u64;

    loop {
        match reader.read(&mut byte).await {
            Ok(0) => {
                debug!(bytes, "Source reached end of stream");
                return DispatchSummary {
                    bytes,
                    end: PumpEnd::EndOfStream,
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Error occurred while reading: {}", e);
                return DispatchSummary {
                    bytes,
                    end: PumpEnd::ReadError(e),
                };
            }
        }

        match &destination {
            Destination::Direct(sink) => {
                if let Err(e) = sink.write_byte(byte[0]).await {
                    error!(sink = sink.label(), "Error writing to pipe: {}", e);
                    return DispatchSummary {
                        bytes,
                        end: PumpEnd::WriteError(e),
                    };
                }
            }
            Destination::Broadcast(registry) => registry.broadcast(byte[0]).await,
        }
        bytes += 1;
    }
}

/// Spawn [`dispatch`] as an independent task
pub fn spawn_dispatch<R>(source: R, destination: Destination) -> tokio::task::JoinHandle<DispatchSummary>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(dispatch(source, destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_direct_preserves_order() {
        let (out_writer, mut out_reader) = tokio::io::duplex(64);
        let sink = SharedSink::new("out", out_writer);

        let source: &[u8] = b"hello, pipe";
        let summary = dispatch(source, Destination::Direct(sink.clone())).await;
        assert!(summary.is_clean());
        assert_eq!(summary.bytes, 11);

        sink.shutdown().await.unwrap();
        let mut received = Vec::new();
        out_reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello, pipe");
    }

    #[tokio::test]
    async fn test_direct_stops_on_write_error() {
        let (out_writer, out_reader) = tokio::io::duplex(64);
        drop(out_reader);
        let sink = SharedSink::new("closed", out_writer);

        let (mut in_writer, in_reader) = tokio::io::duplex(64);
        in_writer.write_all(b"abc").await.unwrap();

        let summary = dispatch(in_reader, Destination::Direct(sink)).await;
        assert_eq!(summary.bytes, 0);
        assert!(matches!(summary.end, PumpEnd::WriteError(_)));
    }
}
