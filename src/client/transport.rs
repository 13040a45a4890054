//! LSP header framing over async byte streams.
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <payload>
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::TransportError;

const CONTENT_LENGTH: &str = "content-length";

/// Largest message body accepted from the server.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Reads LSP-framed messages from the server's stdout.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads one message body.
    ///
    /// Returns `Ok(None)` on a clean EOF between messages. EOF in the middle of
    /// a header block or body is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(content_length) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge {
                length: content_length,
                limit: MAX_FRAME_LEN,
            });
        }

        let mut content = vec![0u8; content_length];
        self.reader.read_exact(&mut content).await?;
        Ok(Some(content))
    }

    async fn read_headers(&mut self) -> Result<Option<usize>, TransportError> {
        let mut content_length: Option<usize> = None;
        let mut first_line = true;

        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                if first_line {
                    return Ok(None);
                }
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed while reading headers",
                )));
            }
            first_line = false;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            let Some((name, value)) = trimmed.split_once(':') else {
                return Err(TransportError::InvalidHeader(trimmed.to_string()));
            };
            // Content-Type and friends are ignored
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let length = value
                    .trim()
                    .parse()
                    .map_err(|_| TransportError::InvalidHeader(trimmed.to_string()))?;
                content_length = Some(length);
            }
        }

        content_length
            .map(Some)
            .ok_or(TransportError::MissingContentLength)
    }
}

/// Writes LSP-framed messages to the server's stdin.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(payload).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Flushes and closes the underlying stream, signalling EOF to the server.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}
