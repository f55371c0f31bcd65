use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

/// Read size used when a transport has no better notion of its natural
/// read granularity.
pub const DEFAULT_READ_GRANULARITY: usize = 8 * 1024;

/// Completion for [`ByteTransport::begin_write`]: the number of bytes the
/// transport actually wrote, which may be fewer than requested.
pub type WriteCompletion = Box<dyn FnOnce(Result<usize>) + Send + 'static>;

/// Completion for [`ByteTransport::begin_read`]: the bytes actually read.
/// An empty buffer means the peer closed its sending side.
pub type ReadCompletion = Box<dyn FnOnce(Result<Bytes>) + Send + 'static>;

/// A connected duplex byte connection with asynchronous completions.
///
/// Both operations return immediately. The completion runs exactly once, on
/// whatever execution context the transport uses for I/O. Implementations
/// may complete inline (on the caller's stack) but should prefer their own
/// context.
///
/// Callers keep at most one write and at most one read outstanding at a
/// time; implementations may rely on that.
pub trait ByteTransport: Send + Sync + 'static {
    /// Write some prefix of `data`. Short writes are allowed.
    fn begin_write(&self, data: Bytes, on_written: WriteCompletion);

    /// Read at most `max_len` bytes.
    fn begin_read(&self, max_len: usize, on_read: ReadCompletion);

    /// Preferred size of a single read.
    fn read_granularity(&self) -> usize {
        DEFAULT_READ_GRANULARITY
    }

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str {
        "custom"
    }
}

impl<T: ByteTransport + ?Sized> ByteTransport for Arc<T> {
    fn begin_write(&self, data: Bytes, on_written: WriteCompletion) {
        (**self).begin_write(data, on_written)
    }

    fn begin_read(&self, max_len: usize, on_read: ReadCompletion) {
        (**self).begin_read(max_len, on_read)
    }

    fn read_granularity(&self) -> usize {
        (**self).read_granularity()
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

impl<T: ByteTransport + ?Sized> ByteTransport for Box<T> {
    fn begin_write(&self, data: Bytes, on_written: WriteCompletion) {
        (**self).begin_write(data, on_written)
    }

    fn begin_read(&self, max_len: usize, on_read: ReadCompletion) {
        (**self).begin_read(max_len, on_read)
    }

    fn read_granularity(&self) -> usize {
        (**self).read_granularity()
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}
