//! Text codecs and line accumulation.
//!
//! Converts between text and the raw bytes a transport carries, and collects
//! decoded text until a line terminator shows up:
//! - [`TextCodec`] is the pluggable encode/decode capability
//! - [`LineBuffer`] holds decoded text and hands out complete lines
//!
//! Decoding is incremental: a multi-byte character split across two reads
//! stays buffered until its remaining bytes arrive.

pub mod codec;
pub mod error;
pub mod line;

pub use codec::{Latin1Codec, TextCodec, Utf8Codec};
pub use error::{CodecError, Result};
pub use line::{LineBuffer, DEFAULT_DELIMITER};
