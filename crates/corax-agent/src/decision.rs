//! Structured parsing of LLM responses
//!
//! The model is asked for a single JSON object but replies through prose,
//! markdown fences, or sometimes not at all. Parsing never fails outward:
//! a response we cannot understand degrades into a deterministic completion
//! decision so the session ends gracefully instead of crashing or looping.

use corax_core::{Phase, TargetIntel, TodoUpdate};
use serde::{Deserialize, Serialize};

/// Reasoning fixed on every fallback decision
pub const PARSE_ERROR_REASONING: &str = "parsing error";

/// What the LLM chose to do this iteration
///
/// Defaults to `UseTool`: a decision that names a tool but omits the action
/// field still executes instead of ending the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    #[default]
    UseTool,
    TransitionPhase,
    Complete,
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UseTool => write!(f, "use_tool"),
            Self::TransitionPhase => write!(f, "transition_phase"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Phase change details carried by a `transition_phase` decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub to_phase: Phase,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub planned_actions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// One parsed reasoning decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmDecision {
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub action: DecisionAction,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_args: Option<serde_json::Value>,
    #[serde(default)]
    pub phase_transition: Option<PhaseTransition>,
    #[serde(default)]
    pub completion_reason: Option<String>,
    #[serde(default)]
    pub updated_todo_list: Vec<TodoUpdate>,
}

impl LlmDecision {
    /// Deterministic completion decision used when parsing fails
    ///
    /// The raw response survives as the thought so nothing the model said is
    /// lost from the trace.
    pub fn fallback(raw: &str, failure: impl Into<String>) -> Self {
        Self {
            thought: raw.to_string(),
            reasoning: PARSE_ERROR_REASONING.to_string(),
            action: DecisionAction::Complete,
            tool_name: None,
            tool_args: None,
            phase_transition: None,
            completion_reason: Some(failure.into()),
            updated_todo_list: Vec::new(),
        }
    }
}

/// Analysis of one tool output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputAnalysis {
    #[serde(default)]
    pub interpretation: String,
    #[serde(default)]
    pub extracted_info: TargetIntel,
    #[serde(default)]
    pub actionable_findings: Vec<String>,
    #[serde(default)]
    pub recommended_next_steps: Vec<String>,
}

/// Extract the JSON object from an LLM response (may be wrapped in markdown)
///
/// Takes the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Parse a reasoning decision, falling back to a graceful completion
pub fn parse_decision(raw: &str) -> LlmDecision {
    let Some(json) = extract_json(raw) else {
        tracing::warn!("No JSON object in LLM decision, completing session");
        return LlmDecision::fallback(raw, "No JSON object found in LLM response");
    };

    match serde_json::from_str(json) {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!("Failed to parse LLM decision, completing session: {}", e);
            LlmDecision::fallback(raw, format!("Failed to parse LLM decision: {}", e))
        }
    }
}

/// Parse an output analysis, falling back to the raw text as interpretation
pub fn parse_analysis(raw: &str) -> OutputAnalysis {
    if let Some(json) = extract_json(raw) {
        if let Ok(analysis) = serde_json::from_str::<OutputAnalysis>(json) {
            return analysis;
        }
    }

    tracing::warn!("Failed to parse output analysis, keeping raw text");
    OutputAnalysis {
        interpretation: raw.to_string(),
        ..Default::default()
    }
}
