use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{ByteTransport, ReadCompletion, WriteCompletion, DEFAULT_READ_GRANULARITY};

/// A transport over a tokio stream.
///
/// Every request becomes a task on the runtime the transport was built on;
/// completions run on that runtime's worker threads.
pub struct TokioTransport<T> {
    reader: Arc<Mutex<ReadHalf<T>>>,
    writer: Arc<Mutex<WriteHalf<T>>>,
    handle: Handle,
    read_granularity: usize,
}

impl<T> TokioTransport<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Drive `stream` on the current tokio runtime.
    pub fn new(stream: T) -> Result<Self> {
        let handle =
            Handle::try_current().map_err(|err| TransportError::NoRuntime(err.to_string()))?;
        Ok(Self::with_handle(stream, handle))
    }

    /// Drive `stream` on an explicit runtime.
    pub fn with_handle(stream: T, handle: Handle) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
            handle,
            read_granularity: DEFAULT_READ_GRANULARITY,
        }
    }

    /// Override the preferred read size reported to callers.
    pub fn with_read_granularity(mut self, read_granularity: usize) -> Self {
        self.read_granularity = read_granularity.max(1);
        self
    }
}

impl<T> ByteTransport for TokioTransport<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    fn begin_write(&self, data: Bytes, on_written: WriteCompletion) {
        let writer = Arc::clone(&self.writer);
        self.handle.spawn(async move {
            let mut writer = writer.lock().await;
            let result = match writer.write(&data).await {
                Ok(n) => writer.flush().await.map(|()| n),
                Err(err) => Err(err),
            };
            trace!(requested = data.len(), ok = result.is_ok(), "async write completed");
            on_written(result.map_err(TransportError::Io));
        });
    }

    fn begin_read(&self, max_len: usize, on_read: ReadCompletion) {
        let reader = Arc::clone(&self.reader);
        self.handle.spawn(async move {
            let mut reader = reader.lock().await;
            let mut buf = BytesMut::zeroed(max_len.max(1));
            let result = reader.read(&mut buf).await.map(|n| {
                buf.truncate(n);
                buf.freeze()
            });
            trace!(ok = result.is_ok(), "async read completed");
            on_read(result.map_err(TransportError::Io));
        });
    }

    fn read_granularity(&self) -> usize {
        self.read_granularity
    }

    fn transport_name(&self) -> &'static str {
        "tokio"
    }
}
