//! Completion-based duplex byte transports.
//!
//! A transport accepts "write these bytes" and "read up to N bytes" requests
//! without blocking the caller and reports the outcome through a completion
//! callback, from whatever execution context performs the I/O:
//! - [`StreamTransport`] drives any blocking `Read`/`Write` pair (TCP, Unix
//!   stream sockets) from two dedicated I/O threads
//! - [`TokioTransport`] drives a tokio `AsyncRead + AsyncWrite` stream on a
//!   runtime handle (behind the `async` feature)
//!
//! This is the lowest layer of linesock. Short writes and short reads are
//! normal results here; framing belongs to the layers above.

pub mod error;
pub mod stream;
pub mod traits;

#[cfg(feature = "async")]
pub mod tokio_io;

pub use error::{Result, TransportError};
pub use stream::StreamTransport;
pub use traits::{ByteTransport, ReadCompletion, WriteCompletion, DEFAULT_READ_GRANULARITY};

#[cfg(feature = "async")]
pub use tokio_io::TokioTransport;
