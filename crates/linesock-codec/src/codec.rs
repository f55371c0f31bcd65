use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

use crate::error::{CodecError, Result};

/// Converts between text and transport bytes.
///
/// A codec is fixed for the lifetime of a channel and may be shared across
/// threads.
pub trait TextCodec: Send + Sync + 'static {
    /// Encode `text` into bytes.
    fn encode(&self, text: &str) -> Result<Bytes>;

    /// Decode the longest valid prefix of `src`.
    ///
    /// Consumes the decoded bytes from `src`. Bytes that may still become a
    /// valid character once more input arrives are left in place. Text in
    /// front of an invalid sequence is returned first; the error is only
    /// reported once the invalid bytes are at the start of `src`.
    fn decode(&self, src: &mut BytesMut) -> Result<String>;

    /// Encoding name for diagnostics.
    fn name(&self) -> &'static str;
}

/// UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl TextCodec for Utf8Codec {
    fn encode(&self, text: &str) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(text.as_bytes()))
    }

    fn decode(&self, src: &mut BytesMut) -> Result<String> {
        let (text, consumed) = match std::str::from_utf8(src) {
            Ok(text) => (text.to_owned(), src.len()),
            // `error_len() == None` means the input ends mid-character.
            Err(err) if err.valid_up_to() > 0 || err.error_len().is_none() => {
                let valid = err.valid_up_to();
                (String::from_utf8_lossy(&src[..valid]).into_owned(), valid)
            }
            Err(err) => {
                let len = err.error_len().unwrap_or_default();
                debug!(len, "malformed utf-8 input");
                return Err(CodecError::Malformed {
                    encoding: "utf-8",
                    len,
                });
            }
        };
        src.advance(consumed);
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "utf-8"
    }
}

/// ISO-8859-1: one byte per character, code points U+0000..=U+00FF.
#[derive(Debug, Clone, Copy, Default)]
pub struct Latin1Codec;

impl TextCodec for Latin1Codec {
    fn encode(&self, text: &str) -> Result<Bytes> {
        text.chars()
            .map(|ch| {
                u8::try_from(u32::from(ch)).map_err(|_| CodecError::Unrepresentable {
                    encoding: "iso-8859-1",
                    ch,
                })
            })
            .collect::<Result<Vec<u8>>>()
            .map(Bytes::from)
    }

    fn decode(&self, src: &mut BytesMut) -> Result<String> {
        let text = src.iter().map(|&b| char::from(b)).collect();
        src.clear();
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "iso-8859-1"
    }
}
