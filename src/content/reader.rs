//! Byte streams for blob content
//!
//! Every stream that crosses a target boundary is a [`BlobReader`].
//! [`VerifyReader`] checks size and digest as the stream is drained so
//! corrupted content is rejected before anything is committed.

use crate::content::descriptor::Descriptor;
use crate::content::digest::Hasher;
use crate::error::{from_io, into_io, OrcaError, OrcaResult};
use bytes::Bytes;
use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// Boxed content stream
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Stream over in-memory content
pub fn bytes_reader(content: Bytes) -> BlobReader {
    Box::pin(Cursor::new(content))
}

/// Reader that verifies size and digest against a descriptor.
///
/// Reading past the expected size, or reaching EOF with the wrong size
/// or digest, yields an error wrapping the matching [`OrcaError`].
pub struct VerifyReader<R> {
    inner: R,
    expected: Descriptor,
    hasher: Option<Hasher>,
    read: u64,
}

impl<R: AsyncRead + Unpin> VerifyReader<R> {
    pub fn new(inner: R, expected: &Descriptor) -> Self {
        Self {
            inner,
            hasher: Some(expected.digest.algorithm().hasher()),
            expected: expected.clone(),
            read: 0,
        }
    }

    fn check_eof(&mut self) -> Result<(), OrcaError> {
        if self.read != self.expected.size {
            return Err(OrcaError::SizeMismatch {
                digest: self.expected.digest.to_string(),
                expected: self.expected.size,
                actual: self.read,
            });
        }
        // Already verified on an earlier EOF poll
        let Some(hasher) = self.hasher.take() else {
            return Ok(());
        };
        let actual = hasher.finish();
        if actual != self.expected.digest {
            return Err(OrcaError::DigestMismatch {
                expected: self.expected.digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for VerifyReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        // An empty buffer reads nothing; it is not EOF
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let before = buf.filled().len();
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {
                let len = buf.filled().len() - before;
                if len == 0 {
                    return Poll::Ready(this.check_eof().map_err(into_io));
                }
                this.read += len as u64;
                if this.read > this.expected.size {
                    // Nothing may count as read when the call fails
                    buf.set_filled(before);
                    return Poll::Ready(Err(into_io(OrcaError::SizeMismatch {
                        digest: this.expected.digest.to_string(),
                        expected: this.expected.size,
                        actual: this.read,
                    })));
                }
                if let Some(hasher) = this.hasher.as_mut() {
                    hasher.update(&buf.filled()[before..]);
                }
                Poll::Ready(Ok(()))
            }
        }
    }
}

/// Read a whole stream into memory, verifying it against `desc`
pub async fn read_all(reader: BlobReader, desc: &Descriptor) -> OrcaResult<Bytes> {
    let capacity = usize::try_from(desc.size).unwrap_or(0).min(16 * 1024 * 1024);
    let mut buf = Vec::with_capacity(capacity);
    let mut verified = VerifyReader::new(reader, desc);
    verified
        .read_to_end(&mut buf)
        .await
        .map_err(|e| from_io(format!("reading {}", desc.digest), e))?;
    Ok(Bytes::from(buf))
}
