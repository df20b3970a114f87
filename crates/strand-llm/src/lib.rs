//! # strand-llm
//!
//! Provider-facing half of the strand SDK: turns heterogeneous provider
//! streaming events into the canonical message stream defined by
//! `strand-core`.
//!
//! - **Provider contract**: [`ProviderCall`] plus the [`ProviderError`]
//!   taxonomy
//! - **Normalizers**: one [`ChunkNormalizer`] per provider family
//!   (`anthropic`, `openai`, `compat`), selected by [`ProviderKind`]
//! - **Tag extraction**: inline `<thinking>`/`<tool_call>` splitting for
//!   providers that interleave structure into plain text
//! - **Stream transformer**: [`transform`] glues a raw event stream to a
//!   normalizer under a cancellation token
//! - **Retry**: [`retry_call`] wraps call establishment with a flat-delay
//!   retry loop for connection errors

#![deny(unsafe_code)]

pub mod anthropic;
pub mod args;
pub mod compat;
pub mod normalizer;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod tags;
pub mod transform;

pub use anthropic::AnthropicNormalizer;
pub use compat::CompatNormalizer;
pub use normalizer::{ChunkNormalizer, ProviderKind, normalizer_for};
pub use openai::OpenAiNormalizer;
pub use provider::{MessageStream, ProviderCall, ProviderError, RawEventStream};
pub use retry::{RetryError, retry_call};
pub use tags::{TagExtractor, TagOutput};
pub use transform::transform;
