//! Small stream combinator used to keep a lock guard (or a temp file) alive
//! for exactly as long as a response body is being read.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio_stream::Stream;

/// Wraps a byte stream together with some value that must outlive it - a
/// `PathLock` read guard, a `NamedTempFile`, or a tuple of both. Neither
/// `G` nor `S` need custom pinning: both are plain owned values with no
/// self-references, so this struct is `Unpin` whenever they are.
pub struct GuardedStream<G, S> {
    _guard: G,
    inner: S,
}

impl<G, S> GuardedStream<G, S> {
    pub fn new(guard: G, inner: S) -> Self {
        GuardedStream { _guard: guard, inner }
    }
}

impl<G: Unpin, S: Stream + Unpin> Stream for GuardedStream<G, S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx)
    }
}
