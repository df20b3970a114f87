//! Message types for the canonical conversation stream.
//!
//! A [`Message`] is the unit of conversation. Streaming providers emit many
//! partial messages (`chunk: true`) sharing one `id`; merging those fragments
//! is the consumer's responsibility via [`Message::merge_chunk`] — producers
//! never merge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::{Block, StopReason};

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// End user.
    User,
    /// The model.
    Assistant,
    /// System prompt material.
    System,
    /// Tool execution output.
    Tool,
}

/// Which block kind a message carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary visible content (text, image, audio).
    Message,
    /// Extended thinking.
    Thinking,
    /// Completed tool invocation.
    ToolUse,
    /// Streamed tool-input fragment.
    ToolDelta,
    /// Tool execution outcome.
    ToolResult,
    /// Token usage report.
    Usage,
    /// Terminal stop signal.
    Delta,
    /// Error surfaced mid-stream.
    Error,
    /// Thinking-signature fragment.
    SignatureDelta,
    /// Redacted thinking payload.
    RedactedThinking,
    /// Long-running operation progress.
    Progress,
}

/// A canonical message: the unit of the normalized conversation stream.
///
/// Serialized as `{id, type, role, content, chunk?}` — this shape is shared
/// over the wire between a server relay and its clients and must not drift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque identifier, stable across chunks of the same logical unit.
    pub id: String,
    /// Which block kind(s) this message carries.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Who produced the message.
    pub role: Role,
    /// Ordered, non-empty content blocks.
    pub content: Vec<Block>,
    /// `true` means this is a partial fragment to be merged with prior
    /// messages sharing the same `id`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub chunk: bool,
}

/// Generate a fresh opaque id for a logical stream unit.
#[must_use]
pub fn new_unit_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

impl Message {
    /// Create a non-chunked message.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: MessageKind, role: Role, content: Vec<Block>) -> Self {
        Self {
            id: id.into(),
            kind,
            role,
            content,
            chunk: false,
        }
    }

    /// Create a user text message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(
            new_unit_id(),
            MessageKind::Message,
            Role::User,
            vec![Block::text(text)],
        )
    }

    /// Create an assistant text message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(
            new_unit_id(),
            MessageKind::Message,
            Role::Assistant,
            vec![Block::text(text)],
        )
    }

    /// Create an assistant text chunk.
    #[must_use]
    pub fn text_chunk(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Message,
            role: Role::Assistant,
            content: vec![Block::text(delta)],
            chunk: true,
        }
    }

    /// Create an assistant thinking chunk.
    #[must_use]
    pub fn thinking_chunk(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Thinking,
            role: Role::Assistant,
            content: vec![Block::thinking(delta)],
            chunk: true,
        }
    }

    /// Create a thinking-signature fragment.
    #[must_use]
    pub fn signature_chunk(id: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::SignatureDelta,
            role: Role::Assistant,
            content: vec![Block::SignatureDelta {
                signature: signature.into(),
            }],
            chunk: true,
        }
    }

    /// Create a streamed tool-input fragment.
    #[must_use]
    pub fn tool_delta(
        unit_id: impl Into<String>,
        tool_id: Option<String>,
        name: Option<String>,
        partial: impl Into<String>,
    ) -> Self {
        Self {
            id: unit_id.into(),
            kind: MessageKind::ToolDelta,
            role: Role::Assistant,
            content: vec![Block::ToolDelta {
                id: tool_id,
                name,
                partial: partial.into(),
            }],
            chunk: true,
        }
    }

    /// Create a completed tool-use message.
    #[must_use]
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        let id = id.into();
        Self::new(
            id.clone(),
            MessageKind::ToolUse,
            Role::Assistant,
            vec![Block::tool_use(id, name, input)],
        )
    }

    /// Create a tool-result message.
    #[must_use]
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let tool_use_id = tool_use_id.into();
        Self::new(
            tool_use_id.clone(),
            MessageKind::ToolResult,
            Role::Tool,
            vec![Block::tool_result(tool_use_id, name, content, is_error)],
        )
    }

    /// Create a usage message for one provider turn.
    #[must_use]
    pub fn usage(input: Option<u64>, output: Option<u64>) -> Self {
        Self::new(
            new_unit_id(),
            MessageKind::Usage,
            Role::Assistant,
            vec![Block::Usage { input, output }],
        )
    }

    /// Create the terminal stop-signal message for a provider turn.
    #[must_use]
    pub fn delta(stop_reason: Option<StopReason>, stop_sequence: Option<String>) -> Self {
        Self::new(
            new_unit_id(),
            MessageKind::Delta,
            Role::Assistant,
            vec![Block::Delta {
                stop_reason,
                stop_sequence,
            }],
        )
    }

    /// Create an error message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            new_unit_id(),
            MessageKind::Error,
            Role::Assistant,
            vec![Block::Error {
                message: message.into(),
            }],
        )
    }

    /// Returns `true` if this message closes a provider turn.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind == MessageKind::Delta
    }

    /// Normalized stop reason, if this is a terminal message.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.content.iter().find_map(|b| match b {
            Block::Delta { stop_reason, .. } => *stop_reason,
            _ => None,
        })
    }

    /// Completed tool-use blocks carried by this message.
    #[must_use]
    pub fn tool_uses(&self) -> Vec<&Block> {
        self.content.iter().filter(|b| b.is_tool_use()).collect()
    }

    /// Merge a later chunk into this message.
    ///
    /// Returns `false` (leaving `self` untouched) when the fragment does not
    /// belong to this unit: different `id`, different kind, or not a chunk.
    /// Field-specific concatenation per block kind: text and thinking append
    /// their text, signatures append, tool-input fragments append `partial`
    /// and adopt a tool id/name the earlier fragments lacked.
    pub fn merge_chunk(&mut self, other: &Self) -> bool {
        if other.id != self.id || other.kind != self.kind || !other.chunk {
            return false;
        }
        let (Some(mine), Some(theirs)) = (self.content.last_mut(), other.content.first()) else {
            return false;
        };
        match (mine, theirs) {
            (Block::Text { text }, Block::Text { text: delta }) => {
                text.push_str(delta);
            }
            (
                Block::Thinking {
                    thinking,
                    signature,
                },
                Block::Thinking {
                    thinking: delta,
                    signature: sig_delta,
                },
            ) => {
                thinking.push_str(delta);
                signature.push_str(sig_delta);
            }
            (
                Block::SignatureDelta { signature },
                Block::SignatureDelta {
                    signature: sig_delta,
                },
            ) => {
                signature.push_str(sig_delta);
            }
            (
                Block::ToolDelta { id, name, partial },
                Block::ToolDelta {
                    id: other_id,
                    name: other_name,
                    partial: delta,
                },
            ) => {
                partial.push_str(delta);
                if id.is_none() {
                    id.clone_from(other_id);
                }
                if name.is_none() {
                    name.clone_from(other_name);
                }
            }
            _ => return false,
        }
        true
    }
}

/// Fold an ordered run of chunks sharing one id into a single message.
///
/// The first element seeds the result; fragments that fail to merge are
/// skipped. Returns `None` for an empty input.
#[must_use]
pub fn merge_chunks<'a>(chunks: impl IntoIterator<Item = &'a Message>) -> Option<Message> {
    let mut iter = chunks.into_iter();
    let mut merged = iter.next()?.clone();
    for chunk in iter {
        let _ = merged.merge_chunk(chunk);
    }
    merged.chunk = false;
    Some(merged)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
