//! Normalizer for plain-text compatibility backends.
//!
//! These backends (Ollama-style chat endpoints) stream `message.content`
//! fragments and close with a single `done` event carrying `done_reason`
//! and token counts. They have no structured thinking or tool-call events,
//! so every text fragment is routed through the [`TagExtractor`] — never
//! emitted directly — and structure is recovered from inline tags.
//!
//! A closed `<tool_call>` payload is expected to be a JSON object naming
//! the tool and its arguments; malformed payloads are logged and dropped.
//! A turn that produced any tool call terminates with `tool_use` regardless
//! of the backend's own `done_reason`.

use serde_json::Value;
use strand_core::{Message, StopReason, new_unit_id};
use tracing::warn;

use crate::normalizer::ChunkNormalizer;
use crate::tags::{TagExtractor, TagOutput};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Visible,
    Thinking,
}

/// Turn-scoped state; one instance per in-flight provider call.
#[derive(Debug, Default)]
struct TurnState {
    text_unit: Option<String>,
    thinking_unit: Option<String>,
    // Chunks only merge within one run: switching channel starts new ids.
    last_channel: Option<Channel>,
    saw_tool_call: bool,
}

/// Normalizer for the plain-text provider family.
#[derive(Debug, Default)]
pub struct CompatNormalizer {
    extractor: TagExtractor,
    state: TurnState,
}

impl CompatNormalizer {
    /// Create a normalizer with fresh turn state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn route(&mut self, outputs: Vec<TagOutput>) -> Vec<Message> {
        let mut out = Vec::new();
        for output in outputs {
            match output {
                TagOutput::Visible(text) => {
                    if self.state.last_channel != Some(Channel::Visible) {
                        self.state.text_unit = Some(new_unit_id());
                        self.state.last_channel = Some(Channel::Visible);
                    }
                    let unit = self
                        .state
                        .text_unit
                        .get_or_insert_with(new_unit_id)
                        .clone();
                    out.push(Message::text_chunk(unit, text));
                }
                TagOutput::Thinking(text) => {
                    if self.state.last_channel != Some(Channel::Thinking) {
                        self.state.thinking_unit = Some(new_unit_id());
                        self.state.last_channel = Some(Channel::Thinking);
                    }
                    let unit = self
                        .state
                        .thinking_unit
                        .get_or_insert_with(new_unit_id)
                        .clone();
                    out.push(Message::thinking_chunk(unit, text));
                }
                TagOutput::ToolCall(payload) => {
                    self.state.last_channel = None;
                    if let Some(msg) = self.tool_call_from_payload(&payload) {
                        self.state.saw_tool_call = true;
                        out.push(msg);
                    }
                }
            }
        }
        out
    }

    fn tool_call_from_payload(&self, payload: &str) -> Option<Message> {
        let parsed: Value = match serde_json::from_str(payload.trim()) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, len = payload.len(), "dropping malformed tool_call payload");
                return None;
            }
        };
        let Some(name) = parsed.get("name").and_then(Value::as_str) else {
            warn!("dropping tool_call payload without a tool name");
            return None;
        };
        let input = parsed
            .get("arguments")
            .or_else(|| parsed.get("parameters"))
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        // The backend has no call ids; synthesize one.
        Some(Message::tool_use(new_unit_id(), name, input))
    }

    fn on_done(&mut self, raw: &Value) -> Vec<Message> {
        let mut out = self.route_finish();
        out.push(Message::usage(
            raw.get("prompt_eval_count").and_then(Value::as_u64),
            raw.get("eval_count").and_then(Value::as_u64),
        ));
        let delta = if self.state.saw_tool_call {
            Message::delta(Some(StopReason::ToolUse), None)
        } else {
            match raw.get("done_reason").and_then(Value::as_str) {
                Some("stop") | None => Message::delta(Some(StopReason::EndTurn), None),
                Some("length") => Message::delta(Some(StopReason::MaxTokens), None),
                Some(other) => {
                    warn!(done_reason = other, "unrecognized done reason");
                    out.push(Message::error(format!(
                        "unrecognized done reason: {other}"
                    )));
                    Message::delta(None, None)
                }
            }
        };
        out.push(delta);
        out
    }

    fn route_finish(&mut self) -> Vec<Message> {
        let residue = self.extractor.finish();
        self.route(residue)
    }
}

impl ChunkNormalizer for CompatNormalizer {
    fn normalize(&mut self, raw: &Value) -> Vec<Message> {
        if raw.get("done").and_then(Value::as_bool) == Some(true) {
            return self.on_done(raw);
        }
        match raw.pointer("/message/content").and_then(Value::as_str) {
            Some("") => Vec::new(),
            Some(text) => {
                let outputs = self.extractor.feed(text);
                self.route(outputs)
            }
            None => {
                if raw.get("done").is_none() {
                    warn!("chunk without message content");
                }
                Vec::new()
            }
        }
    }

    fn finish(&mut self) -> Vec<Message> {
        // Stream closed without a done event; flush held-back text.
        self.route_finish()
    }

    fn reset(&mut self) {
        self.extractor.reset();
        self.state = TurnState::default();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_core::{Block, MessageKind, merge_chunks};

    fn chunk(content: &str) -> Value {
        json!({"message": {"role": "assistant", "content": content}, "done": false})
    }

    fn done(reason: &str) -> Value {
        json!({"done": true, "done_reason": reason, "prompt_eval_count": 30, "eval_count": 8})
    }

    fn run(normalizer: &mut CompatNormalizer, events: &[Value]) -> Vec<Message> {
        events.iter().flat_map(|e| normalizer.normalize(e)).collect()
    }

    #[test]
    fn plain_text_turn() {
        let mut n = CompatNormalizer::new();
        let out = run(&mut n, &[chunk("Hello "), chunk("world"), done("stop")]);

        let merged = merge_chunks(
            out.iter()
                .filter(|m| m.chunk && m.kind == MessageKind::Message),
        )
        .unwrap();
        assert_eq!(merged.content[0].as_text(), Some("Hello world"));

        let usage = out.iter().find(|m| m.kind == MessageKind::Usage).unwrap();
        assert_eq!(
            usage.content[0],
            Block::Usage {
                input: Some(30),
                output: Some(8)
            }
        );
        assert_eq!(out.last().unwrap().stop_reason(), Some(StopReason::EndTurn));
    }

    #[test]
    fn inline_thinking_splits_into_thinking_chunks() {
        let mut n = CompatNormalizer::new();
        let out = run(
            &mut n,
            &[chunk("<think>plan"), chunk(" it</think>answer"), done("stop")],
        );
        let thinking = merge_chunks(out.iter().filter(|m| m.kind == MessageKind::Thinking)).unwrap();
        match &thinking.content[0] {
            Block::Thinking { thinking, .. } => assert_eq!(thinking, "plan it"),
            other => panic!("expected thinking, got {other:?}"),
        }
        let visible = merge_chunks(out.iter().filter(|m| m.kind == MessageKind::Message)).unwrap();
        assert_eq!(visible.content[0].as_text(), Some("answer"));
    }

    #[test]
    fn channel_switch_starts_new_chunk_ids() {
        let mut n = CompatNormalizer::new();
        let out = run(&mut n, &[chunk("a<think>t</think>b"), done("stop")]);
        let visible: Vec<_> = out
            .iter()
            .filter(|m| m.kind == MessageKind::Message && m.chunk)
            .collect();
        assert_eq!(visible.len(), 2);
        // Text after the thinking run is a new logical unit, not a
        // continuation of the text before it.
        assert_ne!(visible[0].id, visible[1].id);
    }

    #[test]
    fn inline_tool_call_becomes_tool_use_with_synthetic_id() {
        let mut n = CompatNormalizer::new();
        let out = run(
            &mut n,
            &[
                chunk("<tool_call>{\"name\": \"bash\", \"arguments\": {\"command\": \"ls\"}}</tool_call>"),
                done("stop"),
            ],
        );
        let tool_use = out.iter().find(|m| m.kind == MessageKind::ToolUse).unwrap();
        match &tool_use.content[0] {
            Block::ToolUse { id, name, input, .. } => {
                assert!(!id.is_empty());
                assert_eq!(name, "bash");
                assert_eq!(input, &json!({"command": "ls"}));
            }
            other => panic!("expected tool_use, got {other:?}"),
        }
        // Tool call overrides the backend's own done_reason.
        assert_eq!(out.last().unwrap().stop_reason(), Some(StopReason::ToolUse));
    }

    #[test]
    fn tool_call_split_across_chunks() {
        let mut n = CompatNormalizer::new();
        let out = run(
            &mut n,
            &[
                chunk("<tool_"),
                chunk("call>{\"name\": \"read\", "),
                chunk("\"arguments\": {}}</tool"),
                chunk("_call>"),
                done("stop"),
            ],
        );
        assert!(out.iter().any(|m| m.kind == MessageKind::ToolUse));
    }

    #[test]
    fn malformed_tool_payload_is_dropped() {
        let mut n = CompatNormalizer::new();
        let out = run(
            &mut n,
            &[chunk("<tool_call>not json</tool_call>"), done("stop")],
        );
        assert!(out.iter().all(|m| m.kind != MessageKind::ToolUse));
        // Dropped payload means no tool call; done_reason wins.
        assert_eq!(out.last().unwrap().stop_reason(), Some(StopReason::EndTurn));
    }

    #[test]
    fn payload_without_name_is_dropped() {
        let mut n = CompatNormalizer::new();
        let out = run(
            &mut n,
            &[chunk("<tool_call>{\"arguments\": {}}</tool_call>"), done("stop")],
        );
        assert!(out.iter().all(|m| m.kind != MessageKind::ToolUse));
    }

    #[test]
    fn length_done_reason_maps_to_max_tokens() {
        let mut n = CompatNormalizer::new();
        let out = run(&mut n, &[chunk("truncat"), done("length")]);
        assert_eq!(
            out.last().unwrap().stop_reason(),
            Some(StopReason::MaxTokens)
        );
    }

    #[test]
    fn unknown_done_reason_yields_error_then_null_delta() {
        let mut n = CompatNormalizer::new();
        let out = run(&mut n, &[done("exploded")]);
        assert!(out.iter().any(|m| m.kind == MessageKind::Error));
        let last = out.last().unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.stop_reason(), None);
    }

    #[test]
    fn stream_close_without_done_flushes_held_text() {
        let mut n = CompatNormalizer::new();
        let _ = n.normalize(&chunk("tail<thin"));
        let flushed = n.finish();
        // The held "<thin" prefix drains as visible text.
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].content[0].as_text(), Some("<thin"));
    }

    #[test]
    fn unexpected_events_are_advisory_noops() {
        let mut n = CompatNormalizer::new();
        assert!(n.normalize(&json!({"status": "loading model"})).is_empty());
        assert!(n.normalize(&json!({"message": {"role": "assistant"}, "done": false})).is_empty());
    }

    #[test]
    fn reset_clears_tool_flag_and_units() {
        let mut n = CompatNormalizer::new();
        let _ = run(
            &mut n,
            &[chunk("<tool_call>{\"name\": \"x\"}</tool_call>")],
        );
        n.reset();
        let out = n.normalize(&done("stop"));
        assert_eq!(out.last().unwrap().stop_reason(), Some(StopReason::EndTurn));
    }
}
