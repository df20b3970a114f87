//! The multi-turn tool loop.
//!
//! One automode run owns the conversation history for its duration: the
//! loop appends each turn's assistant content (text and tool uses), the
//! tool executor appends tool results, and nothing else touches it. The
//! loop is explicit iteration with a configurable turn cap, not recursion,
//! so a model that keeps asking for tools cannot grow the stack or run
//! forever.
//!
//! Tool failures never abort the run: a failed executor call is contained
//! as a `tool_result` with `isError: true`, and the model decides what to
//! do about it on the next turn.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use strand_core::{
    Block, Message, MessageKind, RetryPolicy, StopReason, Usage, UsageCache, extract_text,
};
use strand_llm::{ProviderCall, RetryError, normalizer_for, retry_call, transform};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Boxed stream of automode output.
pub type AutomodeStream = Pin<Box<dyn Stream<Item = Result<Message, AutomodeError>> + Send>>;

/// Executes one completed tool call on behalf of the loop.
///
/// The executor appends its `tool_result` message to `history`; arbitrary
/// failures are absorbed by the loop and fed back to the model as an error
/// result.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool named by `tool_use` and append the result to `history`.
    async fn on_tool(
        &self,
        tool_use: &Message,
        history: &mut Vec<Message>,
    ) -> anyhow::Result<()>;
}

/// Automode configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomodeOptions {
    /// Hard cap on provider turns per run.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Retry policy for opening each provider call.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_max_turns() -> u32 {
    24
}

impl Default for AutomodeOptions {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Errors that end an automode run.
#[derive(Debug, thiserror::Error)]
pub enum AutomodeError {
    /// The turn cap was reached while the model still wanted tools.
    #[error("turn limit of {max_turns} reached")]
    TurnLimit {
        /// The configured cap.
        max_turns: u32,
    },

    /// Opening a provider call failed (after retries, where applicable).
    #[error(transparent)]
    Retry(#[from] RetryError),
}

/// Everything one collected automode run produced.
#[derive(Debug)]
pub struct AutomodeOutcome {
    /// All messages forwarded to the stream, in order.
    pub messages: Vec<Message>,
    /// Cumulative token usage across the run's turns.
    pub usage: Usage,
    /// Number of provider turns that reported usage.
    pub turns: u64,
}

/// The automode loop, bound to one provider backend and one tool executor.
pub struct Automode {
    provider: Arc<dyn ProviderCall>,
    executor: Arc<dyn ToolExecutor>,
    options: AutomodeOptions,
}

impl Automode {
    /// Create a loop over the given provider and executor.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ProviderCall>,
        executor: Arc<dyn ToolExecutor>,
        options: AutomodeOptions,
    ) -> Self {
        Self {
            provider,
            executor,
            options,
        }
    }

    /// Run the loop, streaming every canonical message as it happens.
    ///
    /// The stream ends when the model stops with a non-tool reason, on
    /// cancellation, or with an error item for retry exhaustion or the turn
    /// cap. Tool results appended by the executor are mirrored into the
    /// stream so consumers see the whole conversation.
    pub fn run(
        &self,
        history: Vec<Message>,
        system_prompt: impl Into<String>,
        chain_of_thought: Option<String>,
        cancel: CancellationToken,
    ) -> AutomodeStream {
        let provider = Arc::clone(&self.provider);
        let executor = Arc::clone(&self.executor);
        let options = self.options;
        let system_prompt = system_prompt.into();

        Box::pin(async_stream::stream! {
            let mut history = history;
            let mut turn = 0u32;

            'turns: loop {
                if turn >= options.max_turns {
                    warn!(max_turns = options.max_turns, "automode turn limit reached");
                    yield Err(AutomodeError::TurnLimit { max_turns: options.max_turns });
                    break;
                }
                turn += 1;
                debug!(turn, history_len = history.len(), "starting provider turn");

                let raw = {
                    let factory = || {
                        provider.perform_call(
                            &history,
                            &system_prompt,
                            chain_of_thought.as_deref(),
                        )
                    };
                    match retry_call(factory, &options.retry, &cancel).await {
                        Ok(raw) => raw,
                        Err(err) => {
                            yield Err(err.into());
                            break;
                        }
                    }
                };

                let mut stream =
                    transform(raw, normalizer_for(provider.kind()), cancel.clone());
                let mut turn_text = String::new();
                let mut tool_uses: Vec<Message> = Vec::new();
                let mut stop = None;

                while let Some(message) = stream.next().await {
                    match message.kind {
                        MessageKind::ToolUse => tool_uses.push(message.clone()),
                        MessageKind::Message if message.chunk => {
                            turn_text.push_str(&extract_text(&message.content));
                        }
                        MessageKind::Delta => stop = message.stop_reason(),
                        _ => {}
                    }
                    yield Ok(message);
                }

                if cancel.is_cancelled() {
                    debug!(turn, "automode cancelled");
                    break;
                }

                // Assistant content joins the history before any resume.
                if !turn_text.is_empty() {
                    history.push(Message::assistant(std::mem::take(&mut turn_text)));
                }
                history.extend(tool_uses.iter().cloned());

                if stop != Some(StopReason::ToolUse) {
                    debug!(turn, ?stop, "automode run complete");
                    break;
                }
                if tool_uses.is_empty() {
                    warn!(turn, "tool_use stop with no completed tool calls");
                    break;
                }

                for tool_use in &tool_uses {
                    let Some((call_id, name)) = tool_identity(tool_use) else {
                        warn!("tool_use message without a tool_use block");
                        continue;
                    };
                    let (call_id, name) = (call_id.to_string(), name.to_string());
                    match executor.on_tool(tool_use, &mut history).await {
                        Ok(()) => {
                            let mirrored = find_result(&history, &call_id).cloned();
                            if let Some(result) = mirrored {
                                yield Ok(result);
                            } else {
                                warn!(tool = %name, "executor appended no tool_result");
                                let result = Message::tool_result(call_id, name, "", false);
                                history.push(result.clone());
                                yield Ok(result);
                            }
                        }
                        Err(err) => {
                            warn!(tool = %name, error = %format!("{err:#}"), "tool execution failed");
                            let result = Message::tool_result(
                                call_id,
                                name,
                                format!("tool execution failed: {err:#}"),
                                true,
                            );
                            history.push(result.clone());
                            yield Ok(result);
                        }
                    }
                    if cancel.is_cancelled() {
                        break 'turns;
                    }
                }
            }
        })
    }

    /// Run the loop to completion and collect everything it streamed.
    pub async fn run_collected(
        &self,
        history: Vec<Message>,
        system_prompt: impl Into<String>,
        chain_of_thought: Option<String>,
        cancel: CancellationToken,
    ) -> Result<AutomodeOutcome, AutomodeError> {
        let mut stream = self.run(history, system_prompt, chain_of_thought, cancel);
        let mut messages = Vec::new();
        let mut usage = UsageCache::new();
        while let Some(item) = stream.next().await {
            let message = item?;
            let _ = usage.add_message(&message);
            messages.push(message);
        }
        Ok(AutomodeOutcome {
            messages,
            usage: usage.total(),
            turns: usage.turns(),
        })
    }
}

/// Call id and tool name of a completed tool-use message.
fn tool_identity(tool_use: &Message) -> Option<(&str, &str)> {
    tool_use.content.iter().find_map(|b| match b {
        Block::ToolUse { id, name, .. } => Some((id.as_str(), name.as_str())),
        _ => None,
    })
}

/// Most recent tool result for a call id, searching from the back.
fn find_result<'a>(history: &'a [Message], call_id: &str) -> Option<&'a Message> {
    history.iter().rev().find(|m| {
        m.kind == MessageKind::ToolResult
            && m.content.iter().any(|b| {
                matches!(b, Block::ToolResult { tool_use_id, .. } if tool_use_id == call_id)
            })
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn options_defaults() {
        let options = AutomodeOptions::default();
        assert_eq!(options.max_turns, 24);
        assert_eq!(options.retry, RetryPolicy::default());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: AutomodeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, AutomodeOptions::default());
        let options: AutomodeOptions =
            serde_json::from_str(r#"{"max_turns": 3, "retry": {"delay_ms": 10}}"#).unwrap();
        assert_eq!(options.max_turns, 3);
        assert_eq!(options.retry.delay_ms, 10);
        assert_eq!(options.retry.max_attempts, 10);
    }

    #[test]
    fn tool_identity_reads_the_block() {
        let msg = Message::tool_use("toolu_01", "bash", json!({}));
        assert_eq!(tool_identity(&msg), Some(("toolu_01", "bash")));
        assert_eq!(tool_identity(&Message::user("x")), None);
    }

    #[test]
    fn find_result_prefers_latest() {
        let history = vec![
            Message::tool_result("toolu_01", "bash", "old", false),
            Message::user("between"),
            Message::tool_result("toolu_01", "bash", "new", false),
        ];
        let found = find_result(&history, "toolu_01").unwrap();
        assert_matches::assert_matches!(
            &found.content[0],
            Block::ToolResult { content, .. } if content == "new"
        );
        assert!(find_result(&history, "toolu_99").is_none());
    }
}
