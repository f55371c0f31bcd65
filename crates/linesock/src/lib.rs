//! Ordered, non-blocking line channels over byte streams.
//!
//! A [`channel::LineChannel`] turns any duplex byte transport into a stream
//! of text lines. Sends and receives are queued and completed through
//! callbacks, in submission order, without ever blocking the caller.
//!
//! # Crate Structure
//!
//! - [`transport`]: completion-based byte transports (threaded streams, tokio)
//! - [`codec`]: text encodings and the line accumulator
//! - [`channel`]: the line channel itself

/// Re-export transport types.
pub mod transport {
    pub use linesock_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use linesock_codec::*;
}

/// Re-export channel types.
pub mod channel {
    pub use linesock_channel::*;
}
