//! Message framing over a byte stream
//!
//! `ReadBoundary` treats whatever one read returns as one message, which is
//! what peers speaking the plain protocol expect. `LengthPrefixed` puts a
//! little-endian u32 length in front of every frame.

use bytes::Bytes;
use shared_protocol::Framing;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::{LENGTH_PREFIX_SIZE, TransportError, TransportResult};

/// Reads frames from the receive half of a connection
pub struct FrameReader<R> {
    reader: R,
    framing: Framing,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// `max_frame` bounds one read in boundary mode and the declared length
    /// in length-prefixed mode
    pub fn new(reader: R, framing: Framing, max_frame: usize) -> Self {
        Self {
            reader,
            framing,
            buffer: vec![0u8; max_frame.max(1)],
        }
    }

    pub fn max_frame(&self) -> usize {
        self.buffer.len()
    }

    /// Next frame, or `None` once the peer has closed its side
    pub async fn read_frame(&mut self) -> TransportResult<Option<Bytes>> {
        match self.framing {
            Framing::ReadBoundary => self.read_boundary().await,
            Framing::LengthPrefixed => self.read_length_prefixed().await,
        }
    }

    async fn read_boundary(&mut self) -> TransportResult<Option<Bytes>> {
        let n = self.reader.read(&mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }

        trace!("Read {} byte frame", n);
        Ok(Some(Bytes::copy_from_slice(&self.buffer[..n])))
    }

    async fn read_length_prefixed(&mut self) -> TransportResult<Option<Bytes>> {
        let mut header = [0u8; LENGTH_PREFIX_SIZE];
        match self.reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(header) as usize;
        let max = self.buffer.len();
        if len > max {
            return Err(TransportError::FrameTooLarge { size: len, max });
        }

        self.reader.read_exact(&mut self.buffer[..len]).await?;
        trace!("Read {} byte frame", len);
        Ok(Some(Bytes::copy_from_slice(&self.buffer[..len])))
    }
}

/// Writes frames to the send half of a connection
pub struct FrameWriter<W> {
    writer: W,
    framing: Framing,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W, framing: Framing) -> Self {
        Self { writer, framing }
    }

    /// Write one frame and flush it
    pub async fn write_frame(&mut self, payload: &[u8]) -> TransportResult<()> {
        match self.framing {
            Framing::ReadBoundary => {
                self.writer.write_all(payload).await?;
            }
            Framing::LengthPrefixed => {
                let len = u32::try_from(payload.len()).map_err(|_| {
                    TransportError::FrameTooLarge {
                        size: payload.len(),
                        max: u32::MAX as usize,
                    }
                })?;

                // Header and body in one write so they leave together
                let mut data = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
                data.extend_from_slice(&len.to_le_bytes());
                data.extend_from_slice(payload);
                self.writer.write_all(&data).await?;
            }
        }

        self.writer.flush().await?;
        trace!("Wrote {} byte frame", payload.len());
        Ok(())
    }

    /// Close the write direction
    pub async fn shutdown(&mut self) -> TransportResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_boundary_frame() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(client, Framing::ReadBoundary);
        let mut reader = FrameReader::new(server, Framing::ReadBoundary, 2048);

        writer.write_frame(b"aGVsbG8=").await.unwrap();
        let frame = reader.read_frame().await.unwrap().unwrap();

        assert_eq!(&frame[..], b"aGVsbG8=");
    }

    #[tokio::test]
    async fn test_read_boundary_truncates_to_buffer() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(client, Framing::ReadBoundary);
        let mut reader = FrameReader::new(server, Framing::ReadBoundary, 8);

        writer.write_frame(&[b'x'; 20]).await.unwrap();
        let first = reader.read_frame().await.unwrap().unwrap();

        assert_eq!(first.len(), 8);
    }

    #[tokio::test]
    async fn test_closed_peer_yields_none() {
        for framing in [Framing::ReadBoundary, Framing::LengthPrefixed] {
            let (client, server) = tokio::io::duplex(64);
            let mut reader = FrameReader::new(server, framing, 64);
            drop(client);

            assert!(reader.read_frame().await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_length_prefixed_keeps_frames_apart() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(client, Framing::LengthPrefixed);
        let mut reader = FrameReader::new(server, Framing::LengthPrefixed, 2048);

        // Both frames are buffered before the first read
        writer.write_frame(b"first").await.unwrap();
        writer.write_frame(b"second").await.unwrap();

        assert_eq!(&reader.read_frame().await.unwrap().unwrap()[..], b"first");
        assert_eq!(&reader.read_frame().await.unwrap().unwrap()[..], b"second");
    }

    #[tokio::test]
    async fn test_length_prefixed_wire_layout() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client, Framing::LengthPrefixed);

        writer.write_frame(b"abc").await.unwrap();
        let mut raw = [0u8; 7];
        server.read_exact(&mut raw).await.unwrap();

        assert_eq!(raw, [3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[tokio::test]
    async fn test_length_prefixed_rejects_oversized_declaration() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server, Framing::LengthPrefixed, 16);

        client.write_all(&1000u32.to_le_bytes()).await.unwrap();

        assert!(matches!(
            reader.read_frame().await,
            Err(TransportError::FrameTooLarge { size: 1000, max: 16 })
        ));
    }

    #[tokio::test]
    async fn test_length_prefixed_empty_frame() {
        let (client, server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client, Framing::LengthPrefixed);
        let mut reader = FrameReader::new(server, Framing::LengthPrefixed, 16);

        writer.write_frame(b"").await.unwrap();
        let frame = reader.read_frame().await.unwrap().unwrap();

        assert!(frame.is_empty());
    }
}
