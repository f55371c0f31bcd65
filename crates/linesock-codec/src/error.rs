/// Errors that can occur while encoding or decoding text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The incoming bytes are not valid for the codec's encoding.
    #[error("malformed {encoding} input ({len} invalid bytes)")]
    Malformed { encoding: &'static str, len: usize },

    /// The text contains a character the encoding cannot represent.
    #[error("character {ch:?} cannot be encoded as {encoding}")]
    Unrepresentable { encoding: &'static str, ch: char },
}

pub type Result<T> = std::result::Result<T, CodecError>;
