use log::{ debug, warn };
use serde::Deserialize;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_TOKEN: &str = "[DONE]";
pub const DONE_FRAME: &str = "data: [DONE]";

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// What a single framed line means to the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Blank line, `:` heartbeat or any line we do not understand.
    Ignored,
    Done,
    /// Valid JSON without usable text (role-only chunks, finish markers).
    Empty,
    Delta(String),
    Malformed(String),
}

pub fn classify(line: &str) -> Frame {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.is_empty() || line.starts_with(':') {
        return Frame::Ignored;
    }
    if line == DONE_FRAME {
        return Frame::Done;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Frame::Ignored;
    }
    if payload == DONE_TOKEN {
        return Frame::Done;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            let content = chunk.choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content);
            match content {
                Some(text) if !text.is_empty() => Frame::Delta(text),
                _ => Frame::Empty,
            }
        }
        Err(e) => Frame::Malformed(e.to_string()),
    }
}

/// Running text of the in-flight assistant turn.
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
    deltas: usize,
    malformed: usize,
    done_markers: usize,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the full text when the line extended it.
    pub fn apply(&mut self, line: &str) -> Option<&str> {
        match classify(line) {
            Frame::Delta(fragment) => {
                self.text.push_str(&fragment);
                self.deltas += 1;
                Some(&self.text)
            }
            Frame::Malformed(reason) => {
                self.malformed += 1;
                warn!("Skipping malformed stream frame ({}): {}", reason, line);
                None
            }
            Frame::Done => {
                self.done_markers += 1;
                debug!("Received stream sentinel");
                None
            }
            Frame::Empty | Frame::Ignored => None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    pub fn done_markers(&self) -> usize {
        self.done_markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> String {
        format!("data: {}", serde_json::json!({ "choices": [{ "delta": { "content": text } }] }))
    }

    #[test]
    fn classifies_comments_and_blanks() {
        assert_eq!(classify(""), Frame::Ignored);
        assert_eq!(classify(":"), Frame::Ignored);
        assert_eq!(classify(": keep-alive"), Frame::Ignored);
        assert_eq!(classify("event: message"), Frame::Ignored);
        assert_eq!(classify("data:"), Frame::Ignored);
        assert_eq!(classify("data:    "), Frame::Ignored);
    }

    #[test]
    fn sentinel_variants_are_never_payload() {
        assert_eq!(classify("data: [DONE]"), Frame::Done);
        assert_eq!(classify("data:[DONE]"), Frame::Done);
        assert_eq!(classify("data: [DONE]\r"), Frame::Done);
        assert_eq!(classify("data:  [DONE]  "), Frame::Done);
    }

    #[test]
    fn extracts_first_choice_delta() {
        assert_eq!(classify(&delta("Bonjour")), Frame::Delta("Bonjour".into()));
        assert_eq!(
            classify("data: {\"choices\":[{\"delta\":{\"content\":\"a\"}},{\"delta\":{\"content\":\"b\"}}]}"),
            Frame::Delta("a".into())
        );
        assert_eq!(classify("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}"), Frame::Empty);
        assert_eq!(classify("data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}"), Frame::Empty);
        assert_eq!(classify("data: {\"choices\":[]}"), Frame::Empty);
        assert_eq!(classify("data: {\"choices\":[{\"delta\":{\"content\":null}}]}"), Frame::Empty);
    }

    #[test]
    fn malformed_json_is_reported_not_fatal() {
        assert!(matches!(classify("data: {\"choices\":"), Frame::Malformed(_)));
        assert!(matches!(classify("data: not json"), Frame::Malformed(_)));
    }

    #[test]
    fn accumulates_fragments_in_order() {
        let mut acc = DeltaAccumulator::new();
        assert_eq!(acc.apply(&delta("La ")), Some("La "));
        assert_eq!(acc.apply(&delta("dérivée")), Some("La dérivée"));
        assert_eq!(acc.apply(": ping"), None);
        assert_eq!(acc.delta_count(), 2);
        assert_eq!(acc.into_text(), "La dérivée");
    }

    #[test]
    fn malformed_lines_do_not_change_result() {
        let fragments = ["Un ", "deux ", "trois"];
        let garbage = "data: {oops";
        for position in 0..=fragments.len() {
            let mut acc = DeltaAccumulator::new();
            for (i, fragment) in fragments.iter().enumerate() {
                if i == position {
                    acc.apply(garbage);
                }
                acc.apply(&delta(fragment));
            }
            if position == fragments.len() {
                acc.apply(garbage);
            }
            assert_eq!(acc.text(), "Un deux trois");
            assert_eq!(acc.malformed_frames(), 1);
        }
    }

    #[test]
    fn sentinels_never_contribute_or_stop() {
        for repeats in 0..3 {
            let mut acc = DeltaAccumulator::new();
            acc.apply(&delta("a"));
            for _ in 0..repeats {
                acc.apply(DONE_FRAME);
            }
            acc.apply(&delta("b"));
            assert_eq!(acc.text(), "ab");
            assert_eq!(acc.done_markers(), repeats);
        }
    }
}
