//! # corax-tools
//!
//! Phase-gated tool execution for Corax.
//!
//! Tools are dispatched by name to registered backends, but only after the
//! phase allow-list check passes. The executor is deliberately fail-soft:
//! every outcome is a [`ToolResult`] the reasoning loop can observe and
//! analyze, never an escaped error.

mod executor;

pub use executor::{StaticBackend, ToolBackend, ToolExecutor, ToolResult};
