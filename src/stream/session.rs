use super::accumulator::DeltaAccumulator;
use super::framer::LineFramer;

/// Parsing state owned by exactly one in-flight reply.
#[derive(Debug, Default)]
pub struct StreamSession {
    framer: LineFramer,
    accumulator: DeltaAccumulator,
    terminated: bool,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk, calling `on_update` with the full text after each delta.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_update: F) where F: FnMut(&str) {
        if self.terminated {
            return;
        }
        for line in self.framer.push(chunk) {
            if let Some(text) = self.accumulator.apply(&line) {
                on_update(text);
            }
        }
    }

    /// Transport reported end of body: flush the tail and terminate.
    pub fn finish<F>(&mut self, mut on_update: F) where F: FnMut(&str) {
        if self.terminated {
            return;
        }
        for line in self.framer.finish() {
            if let Some(text) = self.accumulator.apply(&line) {
                on_update(text);
            }
        }
        self.terminated = true;
    }

    pub fn buffer(&self) -> &str {
        self.framer.remainder()
    }

    pub fn assistant_text(&self) -> &str {
        self.accumulator.text()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn malformed_frames(&self) -> usize {
        self.accumulator.malformed_frames()
    }
}
