//! Per-session agent state and the result surface returned to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intel::TargetIntel;
use crate::phase::{ApprovalDecision, Phase, PhaseHistoryEntry, TransitionRequest};
use crate::todo::TodoItem;
use crate::trace::{summarize_trace, ExecutionStep, StepSummary};

/// Composite session identity, displayed as `user:project:session`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub project_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.project_id, self.session_id)
    }
}

impl std::str::FromStr for SessionKey {
    type Err = String;

    /// Parse `user:project:session`; the session part may itself contain colons
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(user), Some(project), Some(session))
                if !user.is_empty() && !project.is_empty() && !session.is_empty() =>
            {
                Ok(Self::new(user, project, session))
            }
            _ => Err(format!("Invalid session key: {}", s)),
        }
    }
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Human,
    Assistant,
    System,
}

/// One conversation message in the session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Everything the agent knows about one session
///
/// This is the unit of persistence: the engine loads it, runs the state
/// machine over it, and saves it back. `just_transitioned_to` is a one-shot
/// marker consumed by the next reasoning pass so a freshly approved phase is
/// not immediately re-requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub key: SessionKey,
    pub messages: Vec<Message>,

    pub current_iteration: u32,
    pub max_iterations: u32,
    pub task_complete: bool,
    pub completion_reason: Option<String>,

    pub current_phase: Phase,
    pub phase_history: Vec<PhaseHistoryEntry>,
    pub phase_transition_pending: Option<TransitionRequest>,

    pub execution_trace: Vec<ExecutionStep>,
    pub todo_list: Vec<TodoItem>,
    pub original_objective: String,
    pub target_info: TargetIntel,

    pub awaiting_user_approval: bool,
    pub user_approval_response: Option<ApprovalDecision>,
    pub user_modification: Option<String>,

    #[serde(default)]
    pub just_transitioned_to: Option<Phase>,
}

impl SessionState {
    pub fn new(key: SessionKey, objective: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            key,
            messages: Vec::new(),
            current_iteration: 0,
            max_iterations,
            task_complete: false,
            completion_reason: None,
            current_phase: Phase::Informational,
            phase_history: vec![PhaseHistoryEntry::new(Phase::Informational)],
            phase_transition_pending: None,
            execution_trace: Vec::new(),
            todo_list: Vec::new(),
            original_objective: objective.into(),
            target_info: TargetIntel::default(),
            awaiting_user_approval: false,
            user_approval_response: None,
            user_modification: None,
            just_transitioned_to: None,
        }
    }

    /// Enter a new phase, closing out the current history entry
    pub fn commit_phase(&mut self, to_phase: Phase) {
        let now = Utc::now();
        if let Some(entry) = self.phase_history.last_mut() {
            if entry.exited_at.is_none() {
                entry.exited_at = Some(now);
            }
        }
        self.phase_history.push(PhaseHistoryEntry::new(to_phase));
        self.current_phase = to_phase;
    }

    pub fn push_human(&mut self, content: impl Into<String>) {
        self.messages.push(Message::human(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Most recent assistant message, if any
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// Token counts accumulated across the LLM calls of one agent run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// What one `ask` or `approve` call hands back to the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub answer: String,
    #[serde(default)]
    pub tool_used: Option<String>,
    #[serde(default)]
    pub tool_output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub current_phase: Phase,
    pub iteration_count: u32,
    pub task_complete: bool,
    pub todo_list: Vec<TodoItem>,
    pub execution_trace_summary: Vec<StepSummary>,
    pub awaiting_approval: bool,
    #[serde(default)]
    pub approval_request: Option<TransitionRequest>,
    pub usage: TokenUsage,
}

/// Trace window included in results
const RESULT_TRACE_STEPS: usize = 10;

impl AgentResult {
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            answer: state.last_answer().unwrap_or_default().to_string(),
            tool_used: None,
            tool_output: None,
            error: None,
            current_phase: state.current_phase,
            iteration_count: state.current_iteration,
            task_complete: state.task_complete,
            todo_list: state.todo_list.clone(),
            execution_trace_summary: summarize_trace(&state.execution_trace, RESULT_TRACE_STEPS),
            awaiting_approval: state.awaiting_user_approval,
            approval_request: state.phase_transition_pending.clone(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_tool(mut self, name: Option<String>, output: Option<String>) -> Self {
        self.tool_used = name;
        self.tool_output = output;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new("alice", "acme", "s-01")
    }

    #[test]
    fn test_key_display_and_parse() {
        let parsed: SessionKey = "alice:acme:s-01".parse().unwrap();
        assert_eq!(parsed, key());
        assert_eq!(parsed.to_string(), "alice:acme:s-01");
    }

    #[test]
    fn test_key_session_part_may_contain_colons() {
        let parsed: SessionKey = "alice:acme:run:2024:07".parse().unwrap();
        assert_eq!(parsed.session_id, "run:2024:07");
    }

    #[test]
    fn test_key_rejects_malformed() {
        assert!("alice:acme".parse::<SessionKey>().is_err());
        assert!("::".parse::<SessionKey>().is_err());
        assert!("".parse::<SessionKey>().is_err());
    }

    #[test]
    fn test_new_state_starts_informational() {
        let state = SessionState::new(key(), "scan 10.0.0.5", 30);
        assert_eq!(state.current_phase, Phase::Informational);
        assert_eq!(state.phase_history.len(), 1);
        assert_eq!(state.phase_history[0].phase, Phase::Informational);
        assert!(state.phase_history[0].exited_at.is_none());
        assert!(!state.task_complete);
    }

    #[test]
    fn test_commit_phase_stamps_history() {
        let mut state = SessionState::new(key(), "scan 10.0.0.5", 30);
        state.commit_phase(Phase::Exploitation);

        assert_eq!(state.current_phase, Phase::Exploitation);
        assert_eq!(state.phase_history.len(), 2);
        assert!(state.phase_history[0].exited_at.is_some());
        assert_eq!(state.phase_history[1].phase, Phase::Exploitation);
        assert!(state.phase_history[1].exited_at.is_none());
    }

    #[test]
    fn test_last_answer_skips_human_messages() {
        let mut state = SessionState::new(key(), "scan 10.0.0.5", 30);
        assert!(state.last_answer().is_none());

        state.push_assistant("found two open ports");
        state.push_human("keep going");
        assert_eq!(state.last_answer(), Some("found two open ports"));
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage.add(TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        });
        usage.add(TokenUsage {
            input_tokens: 50,
            output_tokens: 5,
        });
        assert_eq!(usage.input_tokens, 150);
        assert_eq!(usage.total(), 175);
    }

    #[test]
    fn test_result_from_state_reflects_pending_approval() {
        let mut state = SessionState::new(key(), "scan 10.0.0.5", 30);
        state.awaiting_user_approval = true;
        state.phase_transition_pending = Some(TransitionRequest::new(
            Phase::Informational,
            Phase::Exploitation,
            "found an exploitable service",
        ));
        state.push_assistant("requesting approval");

        let result = AgentResult::from_state(&state);
        assert!(result.awaiting_approval);
        assert_eq!(result.answer, "requesting approval");
        assert_eq!(
            result.approval_request.map(|r| r.to_phase),
            Some(Phase::Exploitation)
        );
    }
}
