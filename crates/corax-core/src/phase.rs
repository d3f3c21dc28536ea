//! Operating phases, transition requests, and the phase-based tool policy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Built-in tool names
pub const TOOL_QUERY_GRAPH: &str = "query_graph";
pub const TOOL_EXECUTE_CURL: &str = "execute_curl";
pub const TOOL_EXECUTE_NAABU: &str = "execute_naabu";
pub const TOOL_METASPLOIT: &str = "metasploit_console";

/// Operating phase of an engagement session
///
/// Each phase carries its own tool allow-list and risk profile. Sessions start
/// in `Informational` and only move forward through the approval gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Informational,
    Exploitation,
    PostExploitation,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Informational => write!(f, "informational"),
            Self::Exploitation => write!(f, "exploitation"),
            Self::PostExploitation => write!(f, "post_exploitation"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "informational" => Ok(Self::Informational),
            "exploitation" => Ok(Self::Exploitation),
            "post_exploitation" | "post-exploitation" | "postexploitation" => {
                Ok(Self::PostExploitation)
            }
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// Decision a human can return for a pending phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Modify,
    Abort,
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Modify => write!(f, "modify"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

impl std::str::FromStr for ApprovalDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "modify" => Ok(Self::Modify),
            "abort" => Ok(Self::Abort),
            _ => Err(format!("Invalid approval decision: {}", s)),
        }
    }
}

/// A proposal to change phase, subject to human approval
///
/// Created by the think node when the LLM requests a phase change and consumed
/// by the approval-processing node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub reason: String,
    #[serde(default)]
    pub planned_actions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

impl TransitionRequest {
    pub fn new(from_phase: Phase, to_phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            from_phase,
            to_phase,
            reason: reason.into(),
            planned_actions: Vec::new(),
            risks: Vec::new(),
        }
    }

    pub fn with_planned_actions(mut self, actions: Vec<String>) -> Self {
        self.planned_actions = actions;
        self
    }

    pub fn with_risks(mut self, risks: Vec<String>) -> Self {
        self.risks = risks;
        self
    }
}

/// Record of one committed stay in a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub phase: Phase,
    pub entered_at: DateTime<Utc>,
    pub exited_at: Option<DateTime<Utc>>,
}

impl PhaseHistoryEntry {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            entered_at: Utc::now(),
            exited_at: None,
        }
    }
}

/// Phase-based tool allow-list
///
/// The policy is data, not behavior: the executor consults it before
/// dispatching, and the prompt builders consult it when listing tools.
/// Exploitation-only tools are unreachable from the informational phase no
/// matter what the LLM asks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPolicy {
    map: BTreeMap<String, Vec<Phase>>,
}

impl ToolPolicy {
    /// Empty policy with no tools allowed anywhere
    pub fn empty() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Allow a tool in the given phases
    pub fn allow(mut self, tool: impl Into<String>, phases: &[Phase]) -> Self {
        self.map.insert(tool.into(), phases.to_vec());
        self
    }

    /// Check whether a tool may run in the given phase
    pub fn is_allowed(&self, tool: &str, phase: Phase) -> bool {
        self.map
            .get(tool)
            .map(|phases| phases.contains(&phase))
            .unwrap_or(false)
    }

    /// Tool names allowed in the given phase, in stable order
    pub fn allowed_tools(&self, phase: Phase) -> Vec<String> {
        self.map
            .iter()
            .filter(|(_, phases)| phases.contains(&phase))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All known tool names, in stable order
    pub fn tool_names(&self) -> Vec<String> {
        self.map.keys().cloned().collect()
    }
}

impl Default for ToolPolicy {
    fn default() -> Self {
        const ALL: [Phase; 3] = [
            Phase::Informational,
            Phase::Exploitation,
            Phase::PostExploitation,
        ];
        const GATED: [Phase; 2] = [Phase::Exploitation, Phase::PostExploitation];

        Self::empty()
            .allow(TOOL_QUERY_GRAPH, &ALL)
            .allow(TOOL_EXECUTE_CURL, &ALL)
            .allow(TOOL_EXECUTE_NAABU, &ALL)
            .allow(TOOL_METASPLOIT, &GATED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parsing() {
        let phase: Phase = "post_exploitation".parse().unwrap();
        assert_eq!(phase, Phase::PostExploitation);
        assert_eq!(phase.to_string(), "post_exploitation");
        assert!("lateral_movement".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_default_is_informational() {
        assert_eq!(Phase::default(), Phase::Informational);
    }

    #[test]
    fn test_approval_decision_parsing() {
        assert_eq!(
            "approve".parse::<ApprovalDecision>().unwrap(),
            ApprovalDecision::Approve
        );
        assert_eq!(
            "ABORT".parse::<ApprovalDecision>().unwrap(),
            ApprovalDecision::Abort
        );
        assert!("reject".parse::<ApprovalDecision>().is_err());
    }

    #[test]
    fn test_default_policy_gates_metasploit() {
        let policy = ToolPolicy::default();
        assert!(!policy.is_allowed(TOOL_METASPLOIT, Phase::Informational));
        assert!(policy.is_allowed(TOOL_METASPLOIT, Phase::Exploitation));
        assert!(policy.is_allowed(TOOL_METASPLOIT, Phase::PostExploitation));
    }

    #[test]
    fn test_default_policy_allows_recon_everywhere() {
        let policy = ToolPolicy::default();
        for phase in [
            Phase::Informational,
            Phase::Exploitation,
            Phase::PostExploitation,
        ] {
            assert!(policy.is_allowed(TOOL_QUERY_GRAPH, phase));
            assert!(policy.is_allowed(TOOL_EXECUTE_CURL, phase));
            assert!(policy.is_allowed(TOOL_EXECUTE_NAABU, phase));
        }
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let policy = ToolPolicy::default();
        assert!(!policy.is_allowed("rm_rf", Phase::PostExploitation));
    }

    #[test]
    fn test_allowed_tools_for_phase() {
        let policy = ToolPolicy::default();
        let informational = policy.allowed_tools(Phase::Informational);
        assert_eq!(informational.len(), 3);
        assert!(!informational.contains(&TOOL_METASPLOIT.to_string()));

        let exploitation = policy.allowed_tools(Phase::Exploitation);
        assert_eq!(exploitation.len(), 4);
    }

    #[test]
    fn test_phase_serde_snake_case() {
        let json = serde_json::to_string(&Phase::PostExploitation).unwrap();
        assert_eq!(json, "\"post_exploitation\"");
    }

    #[test]
    fn test_transition_request_builder() {
        let req = TransitionRequest::new(
            Phase::Informational,
            Phase::Exploitation,
            "confirmed CVE-2021-41773",
        )
        .with_planned_actions(vec!["run the apache_normalize_path_rce module".to_string()])
        .with_risks(vec!["service disruption".to_string()]);

        assert_eq!(req.from_phase, Phase::Informational);
        assert_eq!(req.planned_actions.len(), 1);
        assert_eq!(req.risks.len(), 1);
    }
}
