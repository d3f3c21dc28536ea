//! # corax-orchestrator
//!
//! The reasoning loop that drives a Corax session.
//!
//! This crate provides:
//! - Seven-node state machine (initialize, think, execute_tool,
//!   analyze_output, await_approval, process_approval, generate_response)
//!   with a pure routing function
//! - Approval gate in front of the risky phases, with anti-thrash rules
//!   against redundant transition requests
//! - Prompt builders for reasoning, output analysis, and the final report
//! - Session store trait with an in-memory implementation
//! - Orchestrator façade: `invoke` and `resume_after_approval`, one
//!   traversal per call with per-session exclusive access

#![allow(dead_code)]

mod engine;
mod machine;
mod orchestrator;
mod prompt;
mod store;

pub use engine::{Engine, TraversalReport};
pub use machine::{next_node, Node, NodeOutcome, ThinkOutcome};
pub use orchestrator::Orchestrator;
pub use prompt::{
    build_analysis_prompt, build_react_prompt, build_report_prompt, default_exploit_command,
    phase_tools, transition_message,
};
pub use store::{InMemorySessionStore, SessionStore};
