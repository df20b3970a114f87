//! # strand-core
//!
//! Canonical, provider-independent message vocabulary for the strand SDK.
//!
//! This crate provides the shared types every other strand crate depends on:
//!
//! - **Blocks**: `Block` tagged union covering text, images, thinking,
//!   tool use/results, usage, and stream-control signals
//! - **Messages**: `Message` with stable chunk ids and consumer-side merging
//! - **Usage**: `Usage` / `UsageCache` additive per-task token accounting
//! - **Retry policy**: `RetryPolicy` configuration for provider-call retries
//! - **Wire framing**: delimiter-framed JSON codec used between relay and client

#![deny(unsafe_code)]

pub mod block;
pub mod message;
pub mod retry;
pub mod usage;
pub mod wire;

pub use block::{Block, MediaSource, StopReason, extract_text};
pub use message::{Message, MessageKind, Role, merge_chunks, new_unit_id};
pub use retry::RetryPolicy;
pub use usage::{Usage, UsageCache};
pub use wire::{FRAME_DELIMITER, FrameDecoder, FrameError, encode_frame};
