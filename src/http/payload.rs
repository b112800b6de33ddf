use crate::bounded::{BoxError, BoxStream};

use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::{fmt, mem};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use pin_project_lite::pin_project;
use tokio::sync::Mutex;

/// The payload of an inbound request, as handed over by the transport.
///
/// Chunks are pulled with [`read_any`](Payload::read_any); an empty chunk
/// means the stream is exhausted. A `Payload` is shared by reference, so
/// reads go through an internal lock and end-of-stream is tracked
/// separately to allow synchronous [`at_eof`](Payload::at_eof) checks.
pub struct Payload {
    kind: Mutex<PayloadKind>,
    eof: AtomicBool,
    exists: bool,
}

enum PayloadKind {
    Stream(BoxStream<'static, Result<Bytes, BoxError>>),
    Once(Bytes),
    Empty,
}

impl Payload {
    /// Create a `Payload` from a stream of bytes.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        Payload::new(PayloadKind::Stream(Box::pin(MapErr { stream })), false)
    }

    /// Create a `Payload` from a stream that already yields boxed errors.
    pub fn boxed(stream: BoxStream<'static, Result<Bytes, BoxError>>) -> Self {
        Payload::new(PayloadKind::Stream(stream), false)
    }

    /// Create a payload directly from bytes.
    pub fn once(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let eof = bytes.is_empty();
        Payload::new(PayloadKind::Once(bytes), eof)
    }

    /// Create an empty `Payload`, for requests that carry no body at all.
    pub fn empty() -> Self {
        Payload {
            kind: Mutex::new(PayloadKind::Empty),
            eof: AtomicBool::new(true),
            exists: false,
        }
    }

    fn new(kind: PayloadKind, eof: bool) -> Self {
        Payload {
            kind: Mutex::new(kind),
            eof: AtomicBool::new(eof),
            exists: true,
        }
    }

    /// Returns `true` once the stream has been drained.
    pub fn at_eof(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    /// Returns `false` if the transport signaled that there is no body,
    /// as opposed to a body that happens to be empty.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Read the next available chunk.
    ///
    /// Returns an empty chunk at end-of-stream. Empty chunks yielded by
    /// the underlying stream are skipped, so an empty result is always
    /// final.
    pub async fn read_any(&self) -> Result<Bytes, BoxError> {
        let mut kind = self.kind.lock().await;

        loop {
            match &mut *kind {
                PayloadKind::Stream(stream) => match stream.next().await {
                    Some(Ok(chunk)) if chunk.is_empty() => continue,
                    Some(Ok(chunk)) => return Ok(chunk),
                    Some(Err(err)) => return Err(err),
                    None => break,
                },
                PayloadKind::Once(bytes) => {
                    let bytes = mem::take(bytes);
                    *kind = PayloadKind::Empty;
                    self.eof.store(true, Ordering::Release);
                    return Ok(bytes);
                }
                PayloadKind::Empty => break,
            }
        }

        *kind = PayloadKind::Empty;
        self.eof.store(true, Ordering::Release);
        Ok(Bytes::new())
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("exists", &self.exists)
            .field("eof", &self.at_eof())
            .finish()
    }
}

pin_project! {
    struct MapErr<S> {
        #[pin]
        stream: S,
    }
}

impl<T, E, S> Stream for MapErr<S>
where
    E: StdError + Send + Sync + 'static,
    S: Stream<Item = Result<T, E>>,
{
    type Item = Result<T, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project()
            .stream
            .poll_next(cx)
            .map(|item| item.map(|res| res.map_err(|err| Box::new(err) as BoxError)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}
