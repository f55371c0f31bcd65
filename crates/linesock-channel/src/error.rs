use std::sync::Arc;

use linesock_codec::CodecError;
use linesock_transport::TransportError;

/// Errors delivered to send and receive callbacks.
///
/// Cloneable: a single read failure is reported to every queued receive.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// The transport failed while writing.
    #[error("write failed: {0}")]
    Write(Arc<TransportError>),

    /// The transport failed while reading.
    #[error("read failed: {0}")]
    Read(Arc<TransportError>),

    /// Text could not be encoded, or received bytes could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A completion worker could not be started.
    #[error("failed to start completion worker: {0}")]
    Dispatch(Arc<std::io::Error>),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
