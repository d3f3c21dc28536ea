//! Append-only execution trace of completed reasoning steps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::Phase;
use crate::todo::short_id;

/// One completed ReAct step (thought, optional tool run, analysis)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_id: String,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub phase: Phase,
    pub thought: String,
    pub reasoning: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_args: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_output: Option<String>,
    #[serde(default)]
    pub output_analysis: Option<String>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl ExecutionStep {
    pub fn new(
        iteration: u32,
        phase: Phase,
        thought: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            step_id: short_id(),
            iteration,
            timestamp: Utc::now(),
            phase,
            thought: thought.into(),
            reasoning: reasoning.into(),
            tool_name: None,
            tool_args: None,
            tool_output: None,
            output_analysis: None,
            success: true,
            error_message: None,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, args: serde_json::Value) -> Self {
        self.tool_name = Some(name.into());
        self.tool_args = Some(args);
        self
    }
}

/// Compact step view returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub iteration: u32,
    pub phase: Phase,
    pub thought: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub output_summary: Option<String>,
}

/// First `max_chars` characters of `s`, cut on a char boundary
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Render the last `last_n` steps for the reasoning prompt
pub fn format_execution_trace(steps: &[ExecutionStep], last_n: usize) -> String {
    if steps.is_empty() {
        return "No steps executed yet.".to_string();
    }

    let start = steps.len().saturating_sub(last_n);
    let mut lines = Vec::new();
    for step in &steps[start..] {
        let status = if step.success { "OK" } else { "FAILED" };
        lines.push(format!("Step {} [{}] - {}", step.iteration, step.phase, status));
        lines.push(format!("  Thought: {}...", truncate_chars(&step.thought, 100)));
        if let Some(tool) = &step.tool_name {
            lines.push(format!("  Tool: {}", tool));
            if let Some(analysis) = &step.output_analysis {
                lines.push(format!("  Result: {}...", truncate_chars(analysis, 100)));
            }
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Summarize the last `last_n` steps for the API response
pub fn summarize_trace(steps: &[ExecutionStep], last_n: usize) -> Vec<StepSummary> {
    let start = steps.len().saturating_sub(last_n);
    steps[start..]
        .iter()
        .map(|step| StepSummary {
            iteration: step.iteration,
            phase: step.phase,
            thought: truncate_chars(&step.thought, 200).to_string(),
            tool: step.tool_name.clone(),
            success: step.success,
            output_summary: step
                .output_analysis
                .as_deref()
                .map(|analysis| truncate_chars(analysis, 200).to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(iteration: u32, thought: &str) -> ExecutionStep {
        ExecutionStep::new(iteration, Phase::Informational, thought, "reasoning")
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 10), "");
    }

    #[test]
    fn test_format_empty_trace() {
        assert_eq!(format_execution_trace(&[], 5), "No steps executed yet.");
    }

    #[test]
    fn test_format_shows_status_and_tool() {
        let mut failed = step(2, "probe the admin panel")
            .with_tool("execute_curl", json!({"url": "http://10.0.0.5/admin"}));
        failed.tool_output = Some("HTTP/1.1 403 Forbidden\nServer: Apache".to_string());
        failed.output_analysis = Some("admin panel rejects unauthenticated requests".to_string());
        failed.success = false;

        let rendered = format_execution_trace(&[step(1, "start by mapping the host"), failed], 5);
        assert!(rendered.contains("Step 1 [informational] - OK"));
        assert!(rendered.contains("Step 2 [informational] - FAILED"));
        assert!(rendered.contains("  Tool: execute_curl"));
        assert!(rendered.contains("  Result: admin panel rejects unauthenticated requests..."));
        assert!(!rendered.contains("HTTP/1.1 403 Forbidden"));
    }

    #[test]
    fn test_format_windows_to_last_n() {
        let steps: Vec<_> = (1..=10).map(|i| step(i, &format!("thought {}", i))).collect();
        let rendered = format_execution_trace(&steps, 3);
        assert!(!rendered.contains("Step 7 "));
        assert!(rendered.contains("Step 8 "));
        assert!(rendered.contains("Step 10 "));
    }

    #[test]
    fn test_summarize_truncates_long_fields() {
        let mut long = step(1, &"t".repeat(500));
        long.output_analysis = Some("a".repeat(500));

        let summaries = summarize_trace(&[long], 10);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].thought.chars().count(), 200);
        assert_eq!(
            summaries[0].output_summary.as_ref().map(|s| s.chars().count()),
            Some(200)
        );
    }

    #[test]
    fn test_summarize_carries_success_and_analysis() {
        let mut failed = step(3, "try the admin panel")
            .with_tool("execute_curl", json!({"url": "http://10.0.0.5/admin"}));
        failed.tool_output = Some("HTTP/1.1 403 Forbidden\nServer: Apache".to_string());
        failed.output_analysis = Some("admin panel rejects unauthenticated requests".to_string());
        failed.success = false;

        let summaries = summarize_trace(&[failed], 10);
        assert!(!summaries[0].success);
        assert_eq!(
            summaries[0].output_summary.as_deref(),
            Some("admin panel rejects unauthenticated requests")
        );

        let value = serde_json::to_value(&summaries[0]).unwrap();
        assert_eq!(value["success"], json!(false));
    }
}
