//! Future-returning wrappers over the callback API.

use std::future::Future;

use tokio::sync::oneshot;

use crate::channel::LineChannel;
use crate::error::{ChannelError, Result};

impl LineChannel {
    /// Queue `text` now and return a future resolving once it is written.
    ///
    /// The send is queued before this returns, so calls made one after
    /// another keep their order even if the futures are awaited later.
    /// Dropping the future does not cancel the send.
    pub fn send_async(
        &self,
        text: impl Into<String>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.send(
            text,
            |result, tx: oneshot::Sender<Result<()>>| {
                let _ = tx.send(result);
            },
            tx,
        );
        async move { rx.await.unwrap_or(Err(ChannelError::ConnectionClosed)) }
    }

    /// Like [`send_async`](Self::send_async), appending the delimiter.
    pub fn send_line_async(
        &self,
        text: impl Into<String>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let mut text = text.into();
        text.push(self.config().delimiter);
        self.send_async(text)
    }

    /// Queue a receive now and return a future resolving to its line.
    ///
    /// Dropping the future leaves the request queued; the line it matches
    /// is discarded.
    pub fn receive_async(&self) -> impl Future<Output = Result<String>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.receive(
            |result, tx: oneshot::Sender<Result<String>>| {
                let _ = tx.send(result);
            },
            tx,
        );
        async move { rx.await.unwrap_or(Err(ChannelError::ConnectionClosed)) }
    }
}

#[cfg(test)]
mod tests {
    use linesock_codec::Utf8Codec;
    use linesock_transport::TokioTransport;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_roundtrip_over_tokio_duplex() {
        let (left, right) = tokio::io::duplex(16);
        let a = LineChannel::new(TokioTransport::new(left).unwrap(), Utf8Codec).unwrap();
        let b = LineChannel::new(TokioTransport::new(right).unwrap(), Utf8Codec).unwrap();

        let first = b.receive_async();
        let second = b.receive_async();

        a.send_async("Hello world\nThis is").await.unwrap();
        a.send_line_async(" a test").await.unwrap();

        assert_eq!(first.await.unwrap(), "Hello world");
        assert_eq!(second.await.unwrap(), "This is a test");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn closed_peer_fails_receive() {
        let (left, right) = tokio::io::duplex(16);
        let a = LineChannel::new(TokioTransport::new(left).unwrap(), Utf8Codec).unwrap();
        drop(right);

        let err = a.receive_async().await.unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionClosed));
    }
}
