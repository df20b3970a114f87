//! Chunk normalizer contract and provider-family dispatch.

use serde::{Deserialize, Serialize};
use strand_core::Message;

use crate::anthropic::AnthropicNormalizer;
use crate::compat::CompatNormalizer;
use crate::openai::OpenAiNormalizer;

/// The closed set of provider event dialects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Native structured events (`message_start`, `content_block_*`, ...).
    Anthropic,
    /// Chat-completion chunks with indexed tool-call fragments.
    OpenAi,
    /// Plain-text chat chunks; structure arrives as inline tags.
    Compat,
}

/// Turns raw provider events into canonical messages.
///
/// One normalizer instance serves exactly one in-flight provider call; its
/// state is turn-scoped. A single raw event may expand to zero or more
/// messages (a tag-extracting provider can release a thinking run, a visible
/// run, and a completed tool call from one delta), though most yield 0–1.
pub trait ChunkNormalizer {
    /// Normalize one raw provider event.
    ///
    /// Structurally-unexpected events are advisory no-ops: log and return
    /// nothing, never panic or error the stream.
    fn normalize(&mut self, raw: &serde_json::Value) -> Vec<Message>;

    /// Flush anything held back once the raw stream closes.
    ///
    /// Providers that buffer (inline tags, deferred terminal delta) emit the
    /// residue here; the default is no residue.
    fn finish(&mut self) -> Vec<Message> {
        Vec::new()
    }

    /// Reset all turn-scoped state, as if freshly constructed.
    fn reset(&mut self);
}

/// Construct the normalizer for a provider family.
#[must_use]
pub fn normalizer_for(kind: ProviderKind) -> Box<dyn ChunkNormalizer + Send> {
    match kind {
        ProviderKind::Anthropic => Box::new(AnthropicNormalizer::new()),
        ProviderKind::OpenAi => Box::new(OpenAiNormalizer::new()),
        ProviderKind::Compat => Box::new(CompatNormalizer::new()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
