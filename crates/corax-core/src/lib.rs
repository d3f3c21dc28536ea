//! # corax-core
//!
//! Core types for the Corax penetration-testing agent.
//!
//! Corax runs an autonomous reason-act loop over a fixed set of security
//! tools, gated by engagement phases. Everything the rest of the workspace
//! agrees on lives here:
//!
//! - Phases, the tool policy, and transition approval types
//! - Per-session state: conversation, execution trace, todo list, target intel
//! - Runtime configuration and the unified error type

#![allow(dead_code)]

mod config;
mod error;
mod intel;
mod phase;
mod session;
mod todo;
mod trace;

pub use config::{ApiConfig, ApprovalConfig, CoraxConfig, LoopDefaults, ModelConfig};
pub use error::{CoraxError, Result};
pub use intel::{TargetIntel, TargetType};
pub use phase::{
    ApprovalDecision, Phase, PhaseHistoryEntry, ToolPolicy, TransitionRequest, TOOL_EXECUTE_CURL,
    TOOL_EXECUTE_NAABU, TOOL_METASPLOIT, TOOL_QUERY_GRAPH,
};
pub use session::{
    AgentResult, Message, MessageRole, SessionKey, SessionState, TokenUsage,
};
pub use todo::{
    format_todo_list, replace_todo_list, TodoItem, TodoPriority, TodoStatus, TodoUpdate,
};
pub use trace::{
    format_execution_trace, summarize_trace, truncate_chars, ExecutionStep, StepSummary,
};
