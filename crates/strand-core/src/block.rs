//! Content block types.
//!
//! Blocks are the primitive building blocks that appear inside messages.
//! The set is closed: every provider event is normalized into one or more
//! of these variants, and the serialized form (serde tag `type` plus the
//! variant's own fields) is the wire format shared with clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Base64 media payload shared by image and audio blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    /// Base64-encoded payload.
    pub data: String,
    /// MIME type (e.g. `image/png`).
    pub media_type: String,
    /// Payload encoding (always `base64` today).
    pub encoding: String,
}

/// Reasons why a provider turn ended, normalized across providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of response.
    EndTurn,
    /// Hit the max output token limit.
    MaxTokens,
    /// Hit a stop sequence.
    StopSequence,
    /// Model wants to use a tool.
    ToolUse,
}

/// One tagged-union content item inside a [`Message`](crate::Message).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Block {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text content.
        text: String,
    },

    /// Image content.
    #[serde(rename = "image")]
    Image {
        /// Image payload.
        source: MediaSource,
        /// Reference to the generation request that produced the image.
        #[serde(rename = "generationRef", skip_serializing_if = "Option::is_none")]
        generation_ref: Option<String>,
    },

    /// Audio content.
    #[serde(rename = "audio")]
    Audio {
        /// Audio payload.
        source: MediaSource,
    },

    /// A completed, ready-to-execute tool invocation.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Unique tool call ID.
        id: String,
        /// Tool name.
        name: String,
        /// Parsed tool input.
        input: Value,
        /// Whether the tool executes on a remote host.
        #[serde(rename = "isRemote", skip_serializing_if = "Option::is_none")]
        is_remote: Option<bool>,
    },

    /// A streamed fragment of a tool's JSON input.
    #[serde(rename = "tool_delta")]
    ToolDelta {
        /// Tool call ID, when the provider reports it per fragment.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Tool name, when known at fragment time.
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Raw partial JSON, accumulated by concatenation.
        partial: String,
    },

    /// The outcome of executing a tool, fed back as conversation input.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// ID of the tool call this result corresponds to.
        tool_use_id: String,
        /// Tool name.
        name: String,
        /// Result content.
        content: String,
        /// Whether the tool execution errored.
        #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Extended thinking content.
    #[serde(rename = "thinking")]
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Verification signature (empty until the provider supplies one).
        signature: String,
    },

    /// Thinking content withheld by the provider.
    #[serde(rename = "redacted_thinking")]
    RedactedThinking {
        /// Opaque provider payload.
        data: String,
    },

    /// A streamed fragment of a thinking-block signature.
    #[serde(rename = "signature_delta")]
    SignatureDelta {
        /// Signature fragment.
        signature: String,
    },

    /// Token usage reported by the provider.
    #[serde(rename = "usage")]
    Usage {
        /// Input tokens.
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<u64>,
        /// Output tokens.
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<u64>,
    },

    /// Terminal stop signal closing a provider turn.
    #[serde(rename = "delta")]
    Delta {
        /// Normalized stop reason; `None` when the provider's reason was
        /// unrecognized (an error-kind message precedes this case).
        stop_reason: Option<StopReason>,
        /// Matched stop sequence, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        stop_sequence: Option<String>,
    },

    /// A provider or stream error surfaced to the consumer.
    #[serde(rename = "error")]
    Error {
        /// Human-readable description.
        message: String,
    },

    /// Progress reported by a long-running operation.
    #[serde(rename = "progress")]
    Progress {
        /// Completion fraction in `[0.0, 1.0]`.
        progress: f64,
        /// Human-readable status.
        message: String,
    },
}

impl Block {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a thinking block without a signature.
    #[must_use]
    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            signature: String::new(),
        }
    }

    /// Create a completed tool-use block.
    #[must_use]
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
            is_remote: None,
        }
    }

    /// Create a tool-result block.
    #[must_use]
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            name: name.into(),
            content: content.into(),
            is_error: if is_error { Some(true) } else { None },
        }
    }

    /// Returns `true` if this is a text block.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Returns `true` if this is a completed tool-use block.
    #[must_use]
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }

    /// Returns the text if this is a text block, `None` otherwise.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Extract the concatenated text from a slice of blocks.
#[must_use]
pub fn extract_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(Block::as_text)
        .collect::<Vec<_>>()
        .join("")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
