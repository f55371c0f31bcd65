/// Default line terminator.
pub const DEFAULT_DELIMITER: char = '\n';

/// Decoded text waiting to be handed out as lines.
///
/// Text is appended as it is decoded; [`next_line`](Self::next_line) removes
/// the oldest complete line (terminator stripped) from the front. Only the
/// terminator character is special: a preceding `'\r'` stays part of the
/// line.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    text: String,
    delimiter: char,
    // Prefix of `text` already known to contain no delimiter.
    scanned: usize,
}

impl LineBuffer {
    /// Create an empty buffer splitting on `delimiter`.
    pub fn new(delimiter: char) -> Self {
        Self {
            text: String::new(),
            delimiter,
            scanned: 0,
        }
    }

    /// Append decoded text.
    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Whether a complete line is buffered.
    pub fn has_line(&mut self) -> bool {
        self.find_delimiter().is_some()
    }

    /// Remove and return the oldest complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.find_delimiter()?;
        let line = self.text[..end].to_string();
        self.text.drain(..end + self.delimiter.len_utf8());
        self.scanned = 0;
        Some(line)
    }

    /// Drop all buffered text.
    pub fn clear(&mut self) {
        self.text.clear();
        self.scanned = 0;
    }

    /// Length of the buffered text in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The line terminator.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    fn find_delimiter(&mut self) -> Option<usize> {
        match self.text[self.scanned..].find(self.delimiter) {
            Some(pos) => Some(self.scanned + pos),
            None => {
                self.scanned = self.text.len();
                None
            }
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}
