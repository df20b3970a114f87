//! Fail-open parsing of accumulated tool-call input.

use serde_json::Value;
use tracing::warn;

/// Parse the JSON a provider streamed as a tool's input.
///
/// Providers deliver tool input as concatenated fragments, so intermediate
/// states are routinely invalid JSON; only the final accumulated string is
/// expected to parse. When even that fails, the tool call proceeds with `{}`
/// rather than erroring the stream — the tool itself reports the missing
/// arguments far more usefully than a dropped call would.
#[must_use]
pub fn parse_tool_input(tool_name: &str, accumulated: &str) -> Value {
    if accumulated.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    match serde_json::from_str(accumulated) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                tool = tool_name,
                error = %e,
                len = accumulated.len(),
                "tool input did not parse at block close, substituting empty object"
            );
            Value::Object(serde_json::Map::new())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
