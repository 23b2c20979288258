//! Length-prefixed framing
//!
//! Wire format: 4-byte big-endian body length, then the UTF-8 body.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::errors::{ProtocolError, ProtocolResult};
use super::frame::Frame;

/// Default upper bound for one frame body: 16 MiB
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Encodes and decodes frames under a size bound
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Encode a frame; nothing is produced when the body is over the bound.
    pub fn encode(&self, frame: &Frame) -> ProtocolResult<Vec<u8>> {
        let body = frame.to_text();
        let size = body.len();
        if size > self.max_frame_bytes || size > u32::MAX as usize {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_bytes,
            });
        }

        let mut out = Vec::with_capacity(HEADER_LEN + size);
        out.extend_from_slice(&(size as u32).to_be_bytes());
        out.extend_from_slice(body.as_bytes());
        Ok(out)
    }

    /// Read one frame. `Ok(None)` means the peer closed at a frame boundary.
    pub async fn read_frame<R>(&self, reader: &mut R) -> ProtocolResult<Option<Frame>>
    where
        R: AsyncRead + Unpin,
    {
        let Some(body) = self.read_body(reader).await? else {
            return Ok(None);
        };
        let text = String::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8)?;
        Frame::parse(&text).map(Some)
    }

    /// Encode and write one frame, flushing the writer.
    pub async fn write_frame<W>(&self, writer: &mut W, frame: &Frame) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let bytes = self.encode(frame)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_body<R>(&self, reader: &mut R) -> ProtocolResult<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = reader.read(&mut header[filled..]).await?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(ProtocolError::Truncated)
                };
            }
            filled += n;
        }

        let size = u32::from_be_bytes(header) as usize;
        if size > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_bytes,
            });
        }

        let mut body = vec![0u8; size];
        reader.read_exact(&mut body).await?;
        Ok(Some(body))
    }
}
