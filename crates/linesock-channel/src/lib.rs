//! Non-blocking line channel over a duplex byte transport.
//!
//! This is the "just works" layer. Queue text to send and requests for the
//! next line to receive; completions arrive through callbacks, in
//! submission order for each direction:
//! - sends are written whole and in order, short writes included
//! - the Nth received line goes to the Nth receive request, however the
//!   bytes were chunked on the wire
//! - callbacks run on a completion worker, never inside the pipelines
//!
//! ```no_run
//! use linesock_channel::LineChannel;
//! use linesock_codec::Utf8Codec;
//! use linesock_transport::StreamTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = StreamTransport::connect_tcp("127.0.0.1:4000")?;
//! let channel = LineChannel::new(transport, Utf8Codec)?;
//!
//! channel.receive(|line, tag| println!("{tag}: {line:?}"), "reply");
//! channel.send_line("hello", |result, ()| assert!(result.is_ok()), ());
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;

mod dispatch;
mod receive;
mod send;

#[cfg(feature = "async")]
pub mod future;

pub use channel::LineChannel;
pub use config::{ChannelConfig, DispatchMode};
pub use error::{ChannelError, Result};
