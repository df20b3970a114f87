//! Inline tag extraction for plain-text providers.
//!
//! Compatibility backends have no structured thinking or tool-call events;
//! models running on them interleave `<thinking>`/`<think>` reasoning and
//! `<tool_call>` JSON directly into the text stream. [`TagExtractor`] is a
//! stateful filter that splits arriving text fragments into three channels:
//! visible text, thinking text, and closed tool-call payloads.
//!
//! Fragment boundaries are arbitrary, so a tag can be split across feeds
//! (`"<thi"` then `"nking>"`). The extractor holds back at most
//! `longest-tag-length − 1` trailing bytes that could still turn out to be a
//! tag, and releases them as soon as they cannot.

use tracing::warn;

const OPEN_TAGS: [(&str, Mode); 3] = [
    // Longer alternative listed first so "<thinking>" never half-matches as
    // "<think" + "ing>".
    ("<thinking>", Mode::Thinking(ThinkStyle::Long)),
    ("<think>", Mode::Thinking(ThinkStyle::Short)),
    ("<tool_call>", Mode::ToolCall),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ThinkStyle {
    /// Opened with `<thinking>`, closed by `</thinking>`.
    Long,
    /// Opened with `<think>`, closed by `</think>`.
    Short,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Visible,
    Thinking(ThinkStyle),
    ToolCall,
}

impl Mode {
    fn close_tag(self) -> Option<&'static str> {
        match self {
            Self::Visible => None,
            Self::Thinking(ThinkStyle::Long) => Some("</thinking>"),
            Self::Thinking(ThinkStyle::Short) => Some("</think>"),
            Self::ToolCall => Some("</tool_call>"),
        }
    }
}

/// One run of extracted output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagOutput {
    /// Ordinary text, outside any tag.
    Visible(String),
    /// Text between thinking tags.
    Thinking(String),
    /// The complete payload of one closed `<tool_call>` block.
    ToolCall(String),
}

/// Stateful inline-tag splitter over a stream of text fragments.
#[derive(Debug, Default)]
pub struct TagExtractor {
    mode: Mode,
    carry: String,
    payload: String,
}

impl TagExtractor {
    /// Create an extractor in the visible (untagged) state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next text fragment; returns completed runs in order.
    ///
    /// Tool-call payloads are buffered internally and only released as a
    /// whole when the closing tag arrives.
    pub fn feed(&mut self, fragment: &str) -> Vec<TagOutput> {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(fragment);

        let mut out = Vec::new();
        let mut pos = 0;
        while pos < text.len() {
            let Some(lt) = text[pos..].find('<').map(|i| pos + i) else {
                self.emit(&mut out, &text[pos..]);
                break;
            };
            self.emit(&mut out, &text[pos..lt]);
            let rest = &text[lt..];
            match self.match_tag(rest) {
                TagMatch::Full(consumed, next_mode) => {
                    self.transition(&mut out, next_mode);
                    pos = lt + consumed;
                }
                TagMatch::Partial => {
                    self.carry = rest.to_string();
                    pos = text.len();
                }
                TagMatch::None => {
                    self.emit(&mut out, "<");
                    pos = lt + 1;
                }
            }
        }
        out
    }

    /// Flush everything still held at end of stream.
    ///
    /// Held-back bytes drain to the current channel. An unterminated
    /// tool-call block is malformed; its payload is logged and dropped.
    pub fn finish(&mut self) -> Vec<TagOutput> {
        let mut out = Vec::new();
        let carry = std::mem::take(&mut self.carry);
        self.emit(&mut out, &carry);
        if !self.payload.is_empty() {
            warn!(
                len = self.payload.len(),
                "dropping unterminated tool_call payload at end of stream"
            );
            self.payload.clear();
        }
        self.mode = Mode::Visible;
        out
    }

    /// Reset to the initial state, discarding any held bytes.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Route a run of text to the channel the current mode selects.
    fn emit(&mut self, out: &mut Vec<TagOutput>, run: &str) {
        if run.is_empty() {
            return;
        }
        match self.mode {
            Mode::Visible => push_run(out, run, TagOutput::Visible),
            Mode::Thinking(_) => push_run(out, run, TagOutput::Thinking),
            Mode::ToolCall => self.payload.push_str(run),
        }
    }

    fn transition(&mut self, out: &mut Vec<TagOutput>, next: Mode) {
        if self.mode == Mode::ToolCall {
            let payload = std::mem::take(&mut self.payload);
            out.push(TagOutput::ToolCall(payload));
        }
        self.mode = next;
    }

    /// Try to match a tag at the start of `rest`.
    ///
    /// In the visible state the candidates are the open tags; inside a tag
    /// the only candidate is the close tag matching the open kind — a
    /// mismatched closer is literal content.
    fn match_tag(&self, rest: &str) -> TagMatch {
        match self.mode {
            Mode::Visible => {
                for (tag, next) in OPEN_TAGS {
                    if rest.starts_with(tag) {
                        return TagMatch::Full(tag.len(), next);
                    }
                }
                if OPEN_TAGS.iter().any(|(tag, _)| tag.starts_with(rest)) {
                    return TagMatch::Partial;
                }
                TagMatch::None
            }
            mode => {
                let close = mode.close_tag().unwrap_or_default();
                if rest.starts_with(close) {
                    TagMatch::Full(close.len(), Mode::Visible)
                } else if close.starts_with(rest) {
                    TagMatch::Partial
                } else {
                    TagMatch::None
                }
            }
        }
    }
}

enum TagMatch {
    /// Matched a whole tag of the given byte length.
    Full(usize, Mode),
    /// `rest` is a strict prefix of a candidate tag; wait for more bytes.
    Partial,
    /// Not a tag; the `<` is literal.
    None,
}

/// Append a run, coalescing with a preceding run of the same kind.
fn push_run(out: &mut Vec<TagOutput>, run: &str, make: fn(String) -> TagOutput) {
    match (out.last_mut(), make(String::new())) {
        (Some(TagOutput::Visible(prev)), TagOutput::Visible(_))
        | (Some(TagOutput::Thinking(prev)), TagOutput::Thinking(_)) => prev.push_str(run),
        _ => out.push(make(run.to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(extractor: &mut TagExtractor, fragments: &[&str]) -> Vec<TagOutput> {
        let mut out = Vec::new();
        for f in fragments {
            out.extend(extractor.feed(f));
        }
        out.extend(extractor.finish());
        out
    }

    #[test]
    fn plain_text_passes_through() {
        let mut x = TagExtractor::new();
        assert_eq!(
            feed_all(&mut x, &["hello world"]),
            vec![TagOutput::Visible("hello world".into())]
        );
    }

    #[test]
    fn thinking_block_splits_channels() {
        let mut x = TagExtractor::new();
        assert_eq!(
            feed_all(&mut x, &["before<thinking>deep</thinking>after"]),
            vec![
                TagOutput::Visible("before".into()),
                TagOutput::Thinking("deep".into()),
                TagOutput::Visible("after".into()),
            ]
        );
    }

    #[test]
    fn short_think_variant() {
        let mut x = TagExtractor::new();
        assert_eq!(
            feed_all(&mut x, &["<think>hmm</think>ok"]),
            vec![
                TagOutput::Thinking("hmm".into()),
                TagOutput::Visible("ok".into()),
            ]
        );
    }

    #[test]
    fn close_tag_must_match_open_style() {
        // </think> inside a <thinking> block is literal content.
        let mut x = TagExtractor::new();
        assert_eq!(
            feed_all(&mut x, &["<thinking>a</think>b</thinking>"]),
            vec![TagOutput::Thinking("a</think>b".into())]
        );
    }

    #[test]
    fn tool_call_payload_released_whole() {
        let mut x = TagExtractor::new();
        assert_eq!(
            feed_all(&mut x, &["<tool_call>{\"name\":\"bash\"}</tool_call>"]),
            vec![TagOutput::ToolCall("{\"name\":\"bash\"}".into())]
        );
    }

    #[test]
    fn tool_call_payload_not_streamed_early() {
        let mut x = TagExtractor::new();
        assert!(x.feed("<tool_call>{\"na").is_empty());
        assert!(x.feed("me\":\"bash\"}").is_empty());
        assert_eq!(
            x.feed("</tool_call>"),
            vec![TagOutput::ToolCall("{\"name\":\"bash\"}".into())]
        );
    }

    #[test]
    fn tag_split_across_fragments() {
        let mut x = TagExtractor::new();
        assert_eq!(
            feed_all(&mut x, &["a<thi", "nking>b</thin", "king>c"]),
            vec![
                TagOutput::Visible("a".into()),
                TagOutput::Thinking("b".into()),
                TagOutput::Visible("c".into()),
            ]
        );
    }

    #[test]
    fn literal_angle_bracket_is_released() {
        let mut x = TagExtractor::new();
        assert_eq!(
            feed_all(&mut x, &["a < b and 1<2"]),
            vec![TagOutput::Visible("a < b and 1<2".into())]
        );
    }

    #[test]
    fn lookalike_tag_is_literal() {
        let mut x = TagExtractor::new();
        assert_eq!(
            feed_all(&mut x, &["<thinker>x"]),
            vec![TagOutput::Visible("<thinker>x".into())]
        );
    }

    #[test]
    fn carry_is_bounded_by_longest_tag() {
        let mut x = TagExtractor::new();
        let _ = x.feed("</tool_cal");
        assert!(x.carry.len() < "</tool_call>".len());
    }

    #[test]
    fn finish_flushes_held_prefix() {
        let mut x = TagExtractor::new();
        // "<thin" could still become a tag, so it is held back...
        assert_eq!(x.feed("text<thin"), vec![TagOutput::Visible("text".into())]);
        // ...and released verbatim at end of stream.
        assert_eq!(x.finish(), vec![TagOutput::Visible("<thin".into())]);
    }

    #[test]
    fn unterminated_tool_call_is_dropped() {
        let mut x = TagExtractor::new();
        let _ = x.feed("<tool_call>{\"name\":");
        let out = x.finish();
        assert!(out.iter().all(|o| !matches!(o, TagOutput::ToolCall(_))));
    }

    #[test]
    fn unterminated_thinking_flushes_as_thinking() {
        let mut x = TagExtractor::new();
        let mut out = x.feed("<thinking>never closed");
        out.extend(x.finish());
        assert_eq!(out, vec![TagOutput::Thinking("never closed".into())]);
    }

    #[test]
    fn multiple_tool_calls_in_one_stream() {
        let mut x = TagExtractor::new();
        let out = feed_all(&mut x, &["<tool_call>{\"a\":1}</tool_call><tool_call>{\"b\":2}</tool_call>"]);
        assert_eq!(
            out,
            vec![
                TagOutput::ToolCall("{\"a\":1}".into()),
                TagOutput::ToolCall("{\"b\":2}".into()),
            ]
        );
    }

    #[test]
    fn reset_clears_state() {
        let mut x = TagExtractor::new();
        let _ = x.feed("<tool_call>{\"half\":");
        x.reset();
        assert_eq!(
            feed_all(&mut x, &["clean"]),
            vec![TagOutput::Visible("clean".into())]
        );
    }

    // Output must not depend on how the input text was split into fragments.
    proptest::proptest! {
        #[test]
        fn split_invariance(cuts in proptest::collection::vec(0usize..64, 0..6)) {
            let full = "x<thinking>plan</thinking>mid<tool_call>{\"name\":\"ls\"}</tool_call>y";
            let reference = {
                let mut x = TagExtractor::new();
                feed_all(&mut x, &[full])
            };

            let mut offsets: Vec<usize> = cuts
                .into_iter()
                .map(|c| c.min(full.len()))
                .filter(|c| full.is_char_boundary(*c))
                .collect();
            offsets.push(0);
            offsets.push(full.len());
            offsets.sort_unstable();
            offsets.dedup();

            let fragments: Vec<&str> = offsets.windows(2).map(|w| &full[w[0]..w[1]]).collect();
            let mut x = TagExtractor::new();
            let split = feed_all(&mut x, &fragments);
            proptest::prop_assert_eq!(split, reference);
        }
    }
}
