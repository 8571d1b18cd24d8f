//! Tee reader feeding a background cache push
//!
//! Each chunk handed to the caller is also sent over a bounded channel
//! to a task that pushes the stream into the cache. A slot in the
//! channel is reserved before the origin is read, so a chunk is never
//! delivered without also being queued for the cache.

use crate::content::{BlobReader, Descriptor};
use crate::error::{into_io, OrcaError, OrcaResult};
use crate::target::Storage;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tokio_util::sync::PollSender;
use tracing::{debug, trace};

/// Chunks buffered between the caller and the cache writer
const CHANNEL_CAPACITY: usize = 16;

type WriterHandle = JoinHandle<OrcaResult<()>>;

enum State {
    /// Reading the origin and forwarding every chunk
    Teeing {
        sender: PollSender<Bytes>,
        writer: WriterHandle,
    },
    /// The writer stopped taking chunks before EOF; collect its result
    Detached { writer: WriterHandle },
    /// Reading the origin only
    Passthrough,
    /// Origin at EOF; waiting for the cache push to finish
    Draining { writer: WriterHandle },
    Done,
}

pub(crate) struct TeeReader {
    origin: BlobReader,
    state: State,
    digest: String,
    /// Writer failure to report once the origin is drained
    deferred: Option<OrcaError>,
}

impl TeeReader {
    /// Start the cache push for `desc` and wrap `origin`
    pub fn spawn(origin: BlobReader, desc: &Descriptor, cache: Arc<dyn Storage>) -> Self {
        let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
        });
        let reader: BlobReader = Box::pin(StreamReader::new(chunks));

        let target = desc.clone();
        let writer = tokio::spawn(async move {
            let result = cache.push(&target, reader).await;
            match &result {
                Ok(()) => trace!(digest = %target.digest, "Cached"),
                Err(e) => debug!(digest = %target.digest, error = %e, "Cache push failed"),
            }
            result
        });

        Self {
            origin,
            state: State::Teeing {
                sender: PollSender::new(tx),
                writer,
            },
            digest: desc.digest.to_string(),
            deferred: None,
        }
    }

    fn cache_error(&self, reason: impl ToString) -> std::io::Error {
        into_io(OrcaError::CacheWrite {
            digest: self.digest.clone(),
            reason: reason.to_string(),
        })
    }
}

fn poll_writer(writer: &mut WriterHandle, cx: &mut Context<'_>) -> Poll<Result<(), String>> {
    match Pin::new(writer).poll(cx) {
        Poll::Pending => Poll::Pending,
        Poll::Ready(Ok(Ok(()))) => Poll::Ready(Ok(())),
        Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(e.to_string())),
        Poll::Ready(Err(join)) => Poll::Ready(Err(join.to_string())),
    }
}

impl AsyncRead for TeeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Teeing { sender, .. } => {
                    match sender.poll_reserve(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(_)) => {
                            this.detach();
                            continue;
                        }
                        Poll::Ready(Ok(())) => {}
                    }

                    let before = buf.filled().len();
                    match this.origin.as_mut().poll_read(cx, buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            // The writer sees a short stream and discards it
                            this.state = State::Done;
                            return Poll::Ready(Err(e));
                        }
                        Poll::Ready(Ok(())) => {}
                    }

                    let chunk = &buf.filled()[before..];
                    if chunk.is_empty() {
                        this.finish_teeing();
                        continue;
                    }
                    let chunk = Bytes::copy_from_slice(chunk);
                    if let State::Teeing { sender, .. } = &mut this.state {
                        if sender.send_item(chunk).is_err() {
                            this.detach();
                        }
                    }
                    return Poll::Ready(Ok(()));
                }
                State::Detached { writer } => match poll_writer(writer, cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(result) => {
                        if let Err(reason) = result {
                            this.deferred = Some(OrcaError::CacheWrite {
                                digest: this.digest.clone(),
                                reason,
                            });
                        }
                        this.state = State::Passthrough;
                    }
                },
                State::Passthrough => {
                    let before = buf.filled().len();
                    match this.origin.as_mut().poll_read(cx, buf) {
                        Poll::Ready(Ok(())) if buf.filled().len() == before => {
                            this.state = State::Done;
                            if let Some(err) = this.deferred.take() {
                                return Poll::Ready(Err(into_io(err)));
                            }
                            return Poll::Ready(Ok(()));
                        }
                        other => return other,
                    }
                }
                State::Draining { writer } => match poll_writer(writer, cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(result) => {
                        this.state = State::Done;
                        return Poll::Ready(result.map_err(|reason| this.cache_error(reason)));
                    }
                },
                State::Done => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl TeeReader {
    /// Stop forwarding; the writer ended without waiting for EOF
    fn detach(&mut self) {
        if let State::Teeing { writer, .. } = std::mem::replace(&mut self.state, State::Done) {
            self.state = State::Detached { writer };
        }
    }

    /// Close the channel so the writer sees EOF, then wait for it
    fn finish_teeing(&mut self) {
        if let State::Teeing { sender, writer } = std::mem::replace(&mut self.state, State::Done) {
            drop(sender);
            self.state = State::Draining { writer };
        }
    }
}
