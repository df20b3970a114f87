//! Normalizer for chat-completion chunk streams.
//!
//! This dialect streams `choices[].delta` objects: visible text under
//! `content`, tool-call argument fragments under indexed `tool_calls`
//! entries, a `finish_reason` on the closing chunk, and (when enabled) a
//! trailing top-level `usage` object after the finish chunk.
//!
//! Because usage trails the finish chunk, the terminal delta is held back
//! once `finish_reason` arrives and released after the usage report (or at
//! end of stream when none comes), keeping the terminal message last.

use std::collections::BTreeMap;

use serde_json::Value;
use strand_core::{Message, StopReason, new_unit_id};
use tracing::warn;

use crate::args::parse_tool_input;
use crate::normalizer::ChunkNormalizer;

#[derive(Debug)]
struct ToolState {
    call_id: String,
    name: String,
    args: String,
    unit_id: String,
}

/// Turn-scoped state; one instance per in-flight provider call.
#[derive(Debug, Default)]
struct TurnState {
    text_unit: Option<String>,
    // BTreeMap so parallel calls complete in index order.
    tools: BTreeMap<u64, ToolState>,
    pending: Vec<Message>,
}

/// Normalizer for the chat-completion provider family.
#[derive(Debug, Default)]
pub struct OpenAiNormalizer {
    state: TurnState,
}

impl OpenAiNormalizer {
    /// Create a normalizer with fresh turn state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn on_tool_fragments(&mut self, fragments: &[Value]) -> Vec<Message> {
        let mut out = Vec::new();
        for fragment in fragments {
            let Some(index) = fragment.get("index").and_then(Value::as_u64) else {
                warn!("tool call fragment without index");
                continue;
            };
            let tool = self.state.tools.entry(index).or_insert_with(|| ToolState {
                call_id: String::new(),
                name: String::new(),
                args: String::new(),
                unit_id: new_unit_id(),
            });
            if let Some(id) = fragment.get("id").and_then(Value::as_str) {
                tool.call_id = id.to_string();
            }
            if let Some(name) = fragment.pointer("/function/name").and_then(Value::as_str) {
                tool.name = name.to_string();
            }
            let args = fragment
                .pointer("/function/arguments")
                .and_then(Value::as_str)
                .unwrap_or_default();
            tool.args.push_str(args);
            out.push(Message::tool_delta(
                tool.unit_id.clone(),
                (!tool.call_id.is_empty()).then(|| tool.call_id.clone()),
                (!tool.name.is_empty()).then(|| tool.name.clone()),
                args,
            ));
        }
        out
    }

    fn on_finish(&mut self, reason: &str) -> Vec<Message> {
        let mut out = Vec::new();
        for (_, tool) in std::mem::take(&mut self.state.tools) {
            let call_id = if tool.call_id.is_empty() {
                new_unit_id()
            } else {
                tool.call_id
            };
            let input = parse_tool_input(&tool.name, &tool.args);
            out.push(Message::tool_use(call_id, tool.name, input));
        }
        let delta = match reason {
            "stop" => Message::delta(Some(StopReason::EndTurn), None),
            "length" => Message::delta(Some(StopReason::MaxTokens), None),
            "tool_calls" => Message::delta(Some(StopReason::ToolUse), None),
            other => {
                warn!(finish_reason = other, "unrecognized finish reason");
                out.push(Message::error(format!(
                    "unrecognized finish reason: {other}"
                )));
                Message::delta(None, None)
            }
        };
        // Held back until the trailing usage chunk (or end of stream).
        self.state.pending.push(delta);
        out
    }
}

impl ChunkNormalizer for OpenAiNormalizer {
    fn normalize(&mut self, raw: &Value) -> Vec<Message> {
        let mut out = Vec::new();

        if let Some(choice) = raw.pointer("/choices/0") {
            let delta = &choice["delta"];
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    let unit = self
                        .state
                        .text_unit
                        .get_or_insert_with(new_unit_id)
                        .clone();
                    out.push(Message::text_chunk(unit, text));
                }
            }
            if let Some(fragments) = delta.get("tool_calls").and_then(Value::as_array) {
                out.extend(self.on_tool_fragments(fragments));
            }
            if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                out.extend(self.on_finish(reason));
            }
        } else if raw.get("choices").is_some_and(|c| !c.is_array()) {
            warn!("chunk with non-array choices");
        }

        if let Some(usage) = raw.get("usage").filter(|u| u.is_object()) {
            // Totals replace; the report itself is emitted once, here.
            out.push(Message::usage(
                usage.get("prompt_tokens").and_then(Value::as_u64),
                usage.get("completion_tokens").and_then(Value::as_u64),
            ));
            out.append(&mut self.state.pending);
        }

        out
    }

    fn finish(&mut self) -> Vec<Message> {
        // No trailing usage chunk arrived; release the held terminal delta.
        std::mem::take(&mut self.state.pending)
    }

    fn reset(&mut self) {
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

    fn run(normalizer: &mut OpenAiNormalizer, events: &[Value]) -> Vec<Message> {
        let mut out: Vec<Message> = events.iter().flat_map(|e| normalizer.normalize(e)).collect();
        out.extend(normalizer.finish());
        out
    }

    #[test]
    fn text_stream_shares_one_unit_id() {
        let mut n = OpenAiNormalizer::new();
        let out = run(
            &mut n,
            &[
                json!({"choices": [{"delta": {"role": "assistant", "content": "Hel"}}]}),
                json!({"choices": [{"delta": {"content": "lo"}}]}),
                json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
            ],
        );
        let merged = merge_chunks(out.iter().filter(|m| m.chunk)).unwrap();
        assert_eq!(merged.content[0].as_text(), Some("Hello"));
        let last = out.last().unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.stop_reason(), Some(StopReason::EndTurn));
    }

    #[test]
    fn tool_arguments_accumulate_per_index() {
        let mut n = OpenAiNormalizer::new();
        let out = run(
            &mut n,
            &[
                json!({"choices": [{"delta": {"tool_calls": [
                    {"index": 0, "id": "call_a", "function": {"name": "bash", "arguments": "{\"comm"}}
                ]}}]}),
                json!({"choices": [{"delta": {"tool_calls": [
                    {"index": 0, "function": {"arguments": "and\": \"ls\"}"}}
                ]}}]}),
                json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            ],
        );
        let tool_use = out.iter().find(|m| m.kind == MessageKind::ToolUse).unwrap();
        assert_eq!(
            tool_use.content[0],
            Block::tool_use("call_a", "bash", json!({"command": "ls"}))
        );
        assert_eq!(out.last().unwrap().stop_reason(), Some(StopReason::ToolUse));
    }

    proptest::proptest! {
        #[test]
        fn tool_arguments_parse_under_any_fragmentation(
            cuts in proptest::collection::vec(0usize..64, 0..8)
        ) {
            let args = r#"{"path": "src/main.rs", "offset": 10, "limit": 40}"#;
            let mut offsets: Vec<usize> = cuts.into_iter().map(|c| c.min(args.len())).collect();
            offsets.push(0);
            offsets.push(args.len());
            offsets.sort_unstable();
            offsets.dedup();

            let mut events = vec![json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_a", "function": {"name": "read", "arguments": ""}}
            ]}}]})];
            events.extend(offsets.windows(2).map(|w| {
                json!({"choices": [{"delta": {"tool_calls": [
                    {"index": 0, "function": {"arguments": &args[w[0]..w[1]]}}
                ]}}]})
            }));
            events.push(json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}));

            let mut n = OpenAiNormalizer::new();
            let out = run(&mut n, &events);
            let tool_use = out.iter().find(|m| m.kind == MessageKind::ToolUse).unwrap();
            proptest::prop_assert_eq!(
                &tool_use.content[0],
                &Block::tool_use("call_a", "read", json!({"path": "src/main.rs", "offset": 10, "limit": 40}))
            );
        }
    }

    #[test]
    fn parallel_tool_calls_complete_in_index_order() {
        let mut n = OpenAiNormalizer::new();
        let out = run(
            &mut n,
            &[
                json!({"choices": [{"delta": {"tool_calls": [
                    {"index": 1, "id": "call_b", "function": {"name": "read", "arguments": "{}"}},
                    {"index": 0, "id": "call_a", "function": {"name": "ls", "arguments": "{}"}}
                ]}}]}),
                json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            ],
        );
        let names: Vec<_> = out
            .iter()
            .filter(|m| m.kind == MessageKind::ToolUse)
            .map(|m| match &m.content[0] {
                Block::ToolUse { name, .. } => name.clone(),
                other => panic!("expected tool_use, got {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["ls", "read"]);
    }

    #[test]
    fn trailing_usage_keeps_terminal_delta_last() {
        let mut n = OpenAiNormalizer::new();
        let out = run(
            &mut n,
            &[
                json!({"choices": [{"delta": {"content": "hi"}}]}),
                json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
                json!({"choices": [], "usage": {"prompt_tokens": 50, "completion_tokens": 12}}),
            ],
        );
        let usage_pos = out.iter().position(|m| m.kind == MessageKind::Usage).unwrap();
        let delta_pos = out.iter().position(Message::is_terminal).unwrap();
        assert!(usage_pos < delta_pos);
        assert_eq!(delta_pos, out.len() - 1);
        assert_eq!(
            out[usage_pos].content[0],
            Block::Usage {
                input: Some(50),
                output: Some(12)
            }
        );
    }

    #[test]
    fn no_usage_chunk_still_terminates_at_stream_end() {
        let mut n = OpenAiNormalizer::new();
        let _ = n.normalize(&json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}));
        let flushed = n.finish();
        assert_eq!(flushed.len(), 1);
        assert!(flushed[0].is_terminal());
    }

    #[test]
    fn unknown_finish_reason_yields_error_then_null_delta() {
        let mut n = OpenAiNormalizer::new();
        let out = run(
            &mut n,
            &[json!({"choices": [{"delta": {}, "finish_reason": "content_filter"}]})],
        );
        assert_eq!(out[0].kind, MessageKind::Error);
        let last = out.last().unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.stop_reason(), None);
    }

    #[test]
    fn unparseable_arguments_fail_open() {
        let mut n = OpenAiNormalizer::new();
        let out = run(
            &mut n,
            &[
                json!({"choices": [{"delta": {"tool_calls": [
                    {"index": 0, "id": "call_a", "function": {"name": "bash", "arguments": "{\"tru"}}
                ]}}]}),
                json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            ],
        );
        let tool_use = out.iter().find(|m| m.kind == MessageKind::ToolUse).unwrap();
        assert_eq!(
            tool_use.content[0],
            Block::tool_use("call_a", "bash", json!({}))
        );
    }

    #[test]
    fn unexpected_events_are_advisory_noops() {
        let mut n = OpenAiNormalizer::new();
        assert!(n.normalize(&json!({"object": "chat.completion.chunk"})).is_empty());
        assert!(n.normalize(&json!({"choices": []})).is_empty());
        assert!(n.normalize(&json!({"choices": "nope"})).is_empty());
    }

    #[test]
    fn reset_discards_pending_and_tools() {
        let mut n = OpenAiNormalizer::new();
        let _ = n.normalize(&json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_a", "function": {"name": "bash", "arguments": "{"}}
        ]}}]}));
        let _ = n.normalize(&json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}));
        n.reset();
        assert!(n.finish().is_empty());
    }
}
