//! # corax-agent
//!
//! Anthropic API client and LLM response parsing for Corax.
//!
//! The reasoning engine talks to the model through the [`LlmProvider`]
//! trait; this crate supplies the production client (retry with backoff,
//! circuit breaker) and the fail-soft parsers that turn raw completions
//! into decisions and output analyses.

mod circuit_breaker;
mod client;
mod decision;
mod types;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{LlmClient, LlmProvider, ScriptedLlm};
pub use decision::{
    extract_json, parse_analysis, parse_decision, DecisionAction, LlmDecision, OutputAnalysis,
    PhaseTransition, PARSE_ERROR_REASONING,
};
pub use types::*;
