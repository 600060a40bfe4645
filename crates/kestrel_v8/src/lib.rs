//! Embeddable JavaScript evaluation on top of V8.
//!
//! This crate owns the process-wide engine runtime, one isolate per
//! [`Evaluator`], and the JSON-in/JSON-out call protocol used across the
//! embedding boundary. Engine handles never leave an operation's scope
//! stack; everything that crosses the boundary is UTF-8 text.

pub use errors::ScriptError;
pub use evaluator::{Evaluator, HeapReport, InterruptHandle};

pub mod errors;
pub mod evaluator;
mod marshal;
pub mod runtime;
