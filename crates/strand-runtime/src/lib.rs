//! # strand-runtime
//!
//! The automode loop: drives multi-turn tool-use conversations over the
//! canonical message stream. Each turn opens a provider call (with retry),
//! normalizes and forwards the resulting stream, executes any completed tool
//! calls through the caller's [`ToolExecutor`], and resumes with the updated
//! history until the model stops asking for tools.

#![deny(unsafe_code)]

pub mod automode;

pub use automode::{
    Automode, AutomodeError, AutomodeOptions, AutomodeOutcome, AutomodeStream, ToolExecutor,
};
