//! Reassembles newline-delimited protocol lines from arbitrary network chunks.
//!
//! A line may straddle any number of chunks, and so may a multi-byte UTF-8
//! character. Incomplete bytes are held back until the rest arrives.

#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
    pending_bytes: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unterminated remainder carried over to the next chunk.
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// Appends a chunk and returns every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let scanned = self.buffer.len();
        self.pending_bytes.extend_from_slice(chunk);
        self.decode_pending(false);
        self.drain_complete_lines(scanned)
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<String> {
        self.push(chunk.as_bytes())
    }

    /// Flushes whatever is left once the transport reports end of stream.
    pub fn finish(&mut self) -> Vec<String> {
        let scanned = self.buffer.len();
        self.decode_pending(true);
        let mut lines = self.drain_complete_lines(scanned);
        if !self.buffer.is_empty() {
            lines.push(std::mem::take(&mut self.buffer));
        }
        lines
    }

    fn decode_pending(&mut self, at_end: bool) {
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // valid_up_to() bytes are guaranteed to be valid UTF-8
                    self.buffer.push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + bad);
                        }
                        None if at_end => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.clear();
                            return;
                        }
                        None => {
                            self.pending_bytes.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// `buffer[..scanned]` is known to hold no newline, so only the new text is searched.
    fn drain_complete_lines(&mut self, scanned: usize) -> Vec<String> {
        let Some(last_newline) = self.buffer[scanned..].rfind('\n').map(|i| scanned + i) else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete[..complete.len() - 1].split('\n').map(str::to_string).collect()
    }
}
