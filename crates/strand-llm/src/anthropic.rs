//! Normalizer for native structured streaming events.
//!
//! This dialect already separates text, thinking, and tool use into typed
//! events (`message_start`, `content_block_start/delta/stop`,
//! `message_delta`, `message_stop`), so normalization is mostly a 1:1
//! mapping plus per-block bookkeeping: each open content block gets a stable
//! unit id for its chunks, and tool input accumulates until the block stops.
//!
//! Usage arithmetic: input tokens arrive once at `message_start` (replace);
//! output tokens are cumulative totals on each `message_delta` (replace).

use std::collections::HashMap;

use serde_json::Value;
use strand_core::{Block, Message, MessageKind, Role, StopReason, new_unit_id};
use tracing::warn;

use crate::args::parse_tool_input;
use crate::normalizer::ChunkNormalizer;

#[derive(Debug)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse {
        id: String,
        name: String,
        partial: String,
    },
}

#[derive(Debug)]
struct BlockState {
    unit_id: String,
    kind: BlockKind,
}

/// Turn-scoped state; one instance per in-flight provider call.
#[derive(Debug, Default)]
struct TurnState {
    blocks: HashMap<u64, BlockState>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    stop_reason: Option<String>,
    stop_sequence: Option<String>,
}

/// Normalizer for the structured-event provider family.
#[derive(Debug, Default)]
pub struct AnthropicNormalizer {
    state: TurnState,
}

impl AnthropicNormalizer {
    /// Create a normalizer with fresh turn state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn on_block_start(&mut self, raw: &Value) -> Vec<Message> {
        let Some(index) = raw.get("index").and_then(Value::as_u64) else {
            warn!("content_block_start without index");
            return Vec::new();
        };
        let block = &raw["content_block"];
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                let _ = self.state.blocks.insert(
                    index,
                    BlockState {
                        unit_id: new_unit_id(),
                        kind: BlockKind::Text,
                    },
                );
                Vec::new()
            }
            Some("thinking") => {
                let _ = self.state.blocks.insert(
                    index,
                    BlockState {
                        unit_id: new_unit_id(),
                        kind: BlockKind::Thinking,
                    },
                );
                Vec::new()
            }
            Some("redacted_thinking") => {
                // Arrives whole; no deltas follow.
                let data = block
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                vec![Message::new(
                    new_unit_id(),
                    MessageKind::RedactedThinking,
                    Role::Assistant,
                    vec![Block::RedactedThinking { data: data.into() }],
                )]
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .map_or_else(new_unit_id, str::to_string);
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let unit_id = new_unit_id();
                let announce = Message::tool_delta(
                    unit_id.clone(),
                    Some(id.clone()),
                    Some(name.clone()),
                    "",
                );
                let _ = self.state.blocks.insert(
                    index,
                    BlockState {
                        unit_id,
                        kind: BlockKind::ToolUse {
                            id,
                            name,
                            partial: String::new(),
                        },
                    },
                );
                vec![announce]
            }
            other => {
                warn!(block_type = ?other, "unrecognized content block type");
                Vec::new()
            }
        }
    }

    fn on_block_delta(&mut self, raw: &Value) -> Vec<Message> {
        let Some(index) = raw.get("index").and_then(Value::as_u64) else {
            warn!("content_block_delta without index");
            return Vec::new();
        };
        let Some(block) = self.state.blocks.get_mut(&index) else {
            warn!(index, "delta for unknown content block");
            return Vec::new();
        };
        let delta = &raw["delta"];
        match delta.get("type").and_then(Value::as_str) {
            Some("text_delta") => {
                let text = delta.get("text").and_then(Value::as_str).unwrap_or_default();
                vec![Message::text_chunk(block.unit_id.clone(), text)]
            }
            Some("thinking_delta") => {
                let text = delta
                    .get("thinking")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                vec![Message::thinking_chunk(block.unit_id.clone(), text)]
            }
            Some("signature_delta") => {
                let sig = delta
                    .get("signature")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                vec![Message::signature_chunk(block.unit_id.clone(), sig)]
            }
            Some("input_json_delta") => {
                let fragment = delta
                    .get("partial_json")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if let BlockKind::ToolUse { id, name, partial } = &mut block.kind {
                    partial.push_str(fragment);
                    vec![Message::tool_delta(
                        block.unit_id.clone(),
                        Some(id.clone()),
                        Some(name.clone()),
                        fragment,
                    )]
                } else {
                    warn!(index, "input_json_delta on non-tool block");
                    Vec::new()
                }
            }
            other => {
                warn!(delta_type = ?other, "unrecognized content block delta");
                Vec::new()
            }
        }
    }

    fn on_block_stop(&mut self, raw: &Value) -> Vec<Message> {
        let Some(index) = raw.get("index").and_then(Value::as_u64) else {
            return Vec::new();
        };
        let Some(block) = self.state.blocks.remove(&index) else {
            warn!(index, "stop for unknown content block");
            return Vec::new();
        };
        match block.kind {
            BlockKind::ToolUse { id, name, partial } => {
                let input = parse_tool_input(&name, &partial);
                vec![Message::tool_use(id, name, input)]
            }
            BlockKind::Text | BlockKind::Thinking => Vec::new(),
        }
    }

    fn on_message_stop(&mut self) -> Vec<Message> {
        let mut out = vec![Message::usage(
            self.state.input_tokens,
            self.state.output_tokens,
        )];
        match self.state.stop_reason.as_deref() {
            Some("end_turn") => out.push(Message::delta(
                Some(StopReason::EndTurn),
                self.state.stop_sequence.take(),
            )),
            Some("max_tokens") => out.push(Message::delta(Some(StopReason::MaxTokens), None)),
            Some("stop_sequence") => out.push(Message::delta(
                Some(StopReason::StopSequence),
                self.state.stop_sequence.take(),
            )),
            Some("tool_use") => out.push(Message::delta(Some(StopReason::ToolUse), None)),
            None => out.push(Message::delta(None, None)),
            Some(other) => {
                warn!(stop_reason = other, "unrecognized stop reason");
                out.push(Message::error(format!("unrecognized stop reason: {other}")));
                out.push(Message::delta(None, None));
            }
        }
        out
    }
}

impl ChunkNormalizer for AnthropicNormalizer {
    fn normalize(&mut self, raw: &Value) -> Vec<Message> {
        match raw.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                self.state.input_tokens = raw
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64);
                Vec::new()
            }
            Some("content_block_start") => self.on_block_start(raw),
            Some("content_block_delta") => self.on_block_delta(raw),
            Some("content_block_stop") => self.on_block_stop(raw),
            Some("message_delta") => {
                if let Some(reason) = raw.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.state.stop_reason = Some(reason.to_string());
                }
                if let Some(seq) = raw.pointer("/delta/stop_sequence").and_then(Value::as_str) {
                    self.state.stop_sequence = Some(seq.to_string());
                }
                if let Some(output) = raw.pointer("/usage/output_tokens").and_then(Value::as_u64) {
                    self.state.output_tokens = Some(output);
                }
                Vec::new()
            }
            Some("message_stop") => self.on_message_stop(),
            Some("ping") => Vec::new(),
            Some("error") => {
                let message = raw
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("provider error");
                vec![Message::error(message)]
            }
            other => {
                warn!(event_type = ?other, "unrecognized stream event");
                Vec::new()
            }
        }
    }

    fn reset(&mut self) {
        self.state = TurnState::default();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
