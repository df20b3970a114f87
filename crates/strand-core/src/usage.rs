//! Token usage accounting.
//!
//! Providers report usage once per turn (a single final usage message).
//! [`UsageCache`] adds those per-turn figures into per-task totals; totals
//! only grow until the cache is reset for a new task.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::message::{Message, MessageKind};

/// Token counts for one provider turn or one task total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Input (prompt) tokens.
    #[serde(default)]
    pub input: u64,
    /// Output (completion) tokens.
    #[serde(default)]
    pub output: u64,
}

impl Usage {
    /// Create a usage record.
    #[must_use]
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    /// Combined input + output tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Additive per-task usage accumulator.
///
/// Feed it the one final usage message per provider turn; totals accumulate
/// across turns and are read-only between resets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageCache {
    total: Usage,
    turns: u64,
}

impl UsageCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one turn's usage to the task totals.
    pub fn add(&mut self, turn: Usage) {
        self.total.input += turn.input;
        self.total.output += turn.output;
        self.turns += 1;
    }

    /// Add usage carried by a canonical usage-kind message. Returns `true`
    /// if the message carried usage and was recorded.
    pub fn add_message(&mut self, message: &Message) -> bool {
        if message.kind != MessageKind::Usage {
            return false;
        }
        let Some(Block::Usage { input, output }) = message
            .content
            .iter()
            .find(|b| matches!(b, Block::Usage { .. }))
        else {
            return false;
        };
        self.add(Usage {
            input: input.unwrap_or(0),
            output: output.unwrap_or(0),
        });
        true
    }

    /// Accumulated task totals.
    #[must_use]
    pub fn total(&self) -> Usage {
        self.total
    }

    /// Number of turns recorded since the last reset.
    #[must_use]
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Clear the cache for a brand-new task.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
