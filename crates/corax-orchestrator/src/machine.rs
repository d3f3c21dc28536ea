//! Pure routing for the reasoning state machine
//!
//! This module has NO I/O. Node handlers do their work elsewhere and report
//! what happened as a [`NodeOutcome`]; this module alone decides where
//! control goes next. Every routing rule is a deterministic match arm, so
//! the whole graph is testable without an LLM, a tool, or a store.

/// Nodes of the reasoning graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Initialize,
    Think,
    ExecuteTool,
    AnalyzeOutput,
    AwaitApproval,
    ProcessApproval,
    GenerateResponse,
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialize => write!(f, "initialize"),
            Self::Think => write!(f, "think"),
            Self::ExecuteTool => write!(f, "execute_tool"),
            Self::AnalyzeOutput => write!(f, "analyze_output"),
            Self::AwaitApproval => write!(f, "await_approval"),
            Self::ProcessApproval => write!(f, "process_approval"),
            Self::GenerateResponse => write!(f, "generate_response"),
        }
    }
}

/// Where the think node left the session, in routing priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkOutcome {
    /// A transition request is stored and waiting for a human
    AwaitingApproval,
    /// The decision completed the task (includes the parse fallback)
    Completed,
    /// Iteration cap reached
    IterationsExhausted,
    /// A tool is selected and ready to run
    ToolSelected,
    /// Suppressed transition with nothing to run; think again
    Replan,
    /// No tool name and no valid transition in the decision
    Undispatchable,
}

/// What a node handler reports back to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// From initialize: whether an approval decision is waiting in state
    Initialized { approval_pending: bool },
    /// From think
    Thought(ThinkOutcome),
    /// From execute_tool; success and failure route identically
    ToolExecuted,
    /// From analyze_output: whether the loop is over (complete or capped)
    Analyzed { end_of_loop: bool },
    /// From await_approval: traversal suspends here
    Suspended,
    /// From process_approval: whether the decision ended the task (abort)
    ApprovalProcessed { task_complete: bool },
    /// From generate_response: traversal is done
    Finished,
}

/// Pure routing function
///
/// Returns the next node to run, or `None` when the traversal ends (the
/// approval suspension and the final response). A mismatched node/outcome
/// pair also ends the traversal rather than looping.
pub fn next_node(node: Node, outcome: NodeOutcome) -> Option<Node> {
    match (node, outcome) {
        (Node::Initialize, NodeOutcome::Initialized { approval_pending }) => {
            if approval_pending {
                Some(Node::ProcessApproval)
            } else {
                Some(Node::Think)
            }
        }

        (Node::Think, NodeOutcome::Thought(thought)) => match thought {
            ThinkOutcome::AwaitingApproval => Some(Node::AwaitApproval),
            ThinkOutcome::Completed
            | ThinkOutcome::IterationsExhausted
            | ThinkOutcome::Undispatchable => Some(Node::GenerateResponse),
            ThinkOutcome::ToolSelected => Some(Node::ExecuteTool),
            ThinkOutcome::Replan => Some(Node::Think),
        },

        (Node::ExecuteTool, NodeOutcome::ToolExecuted) => Some(Node::AnalyzeOutput),

        (Node::AnalyzeOutput, NodeOutcome::Analyzed { end_of_loop }) => {
            if end_of_loop {
                Some(Node::GenerateResponse)
            } else {
                Some(Node::Think)
            }
        }

        (Node::ProcessApproval, NodeOutcome::ApprovalProcessed { task_complete }) => {
            if task_complete {
                Some(Node::GenerateResponse)
            } else {
                Some(Node::Think)
            }
        }

        (Node::AwaitApproval, NodeOutcome::Suspended) => None,
        (Node::GenerateResponse, NodeOutcome::Finished) => None,

        // Outcome from the wrong node: stop instead of guessing
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_routes_by_pending_approval() {
        assert_eq!(
            next_node(
                Node::Initialize,
                NodeOutcome::Initialized {
                    approval_pending: true
                }
            ),
            Some(Node::ProcessApproval)
        );
        assert_eq!(
            next_node(
                Node::Initialize,
                NodeOutcome::Initialized {
                    approval_pending: false
                }
            ),
            Some(Node::Think)
        );
    }

    #[test]
    fn test_think_routes_every_outcome() {
        let cases = [
            (ThinkOutcome::AwaitingApproval, Some(Node::AwaitApproval)),
            (ThinkOutcome::Completed, Some(Node::GenerateResponse)),
            (
                ThinkOutcome::IterationsExhausted,
                Some(Node::GenerateResponse),
            ),
            (ThinkOutcome::ToolSelected, Some(Node::ExecuteTool)),
            (ThinkOutcome::Replan, Some(Node::Think)),
            (ThinkOutcome::Undispatchable, Some(Node::GenerateResponse)),
        ];
        for (outcome, expected) in cases {
            assert_eq!(
                next_node(Node::Think, NodeOutcome::Thought(outcome)),
                expected,
                "think outcome {:?}",
                outcome
            );
        }
    }

    #[test]
    fn test_tool_always_flows_into_analysis() {
        assert_eq!(
            next_node(Node::ExecuteTool, NodeOutcome::ToolExecuted),
            Some(Node::AnalyzeOutput)
        );
    }

    #[test]
    fn test_analysis_loops_or_finishes() {
        assert_eq!(
            next_node(Node::AnalyzeOutput, NodeOutcome::Analyzed { end_of_loop: false }),
            Some(Node::Think)
        );
        assert_eq!(
            next_node(Node::AnalyzeOutput, NodeOutcome::Analyzed { end_of_loop: true }),
            Some(Node::GenerateResponse)
        );
    }

    #[test]
    fn test_approval_outcome_routing() {
        assert_eq!(
            next_node(
                Node::ProcessApproval,
                NodeOutcome::ApprovalProcessed {
                    task_complete: false
                }
            ),
            Some(Node::Think)
        );
        assert_eq!(
            next_node(
                Node::ProcessApproval,
                NodeOutcome::ApprovalProcessed {
                    task_complete: true
                }
            ),
            Some(Node::GenerateResponse)
        );
    }

    #[test]
    fn test_terminals_end_the_traversal() {
        assert_eq!(next_node(Node::AwaitApproval, NodeOutcome::Suspended), None);
        assert_eq!(
            next_node(Node::GenerateResponse, NodeOutcome::Finished),
            None
        );
    }

    #[test]
    fn test_mismatched_outcome_ends_traversal() {
        assert_eq!(next_node(Node::Think, NodeOutcome::ToolExecuted), None);
        assert_eq!(
            next_node(Node::GenerateResponse, NodeOutcome::Suspended),
            None
        );
    }

    #[test]
    fn test_full_reasoning_cycle_walk() {
        // One tool cycle followed by a completed analysis
        let mut node = Node::Initialize;
        let script = [
            NodeOutcome::Initialized {
                approval_pending: false,
            },
            NodeOutcome::Thought(ThinkOutcome::ToolSelected),
            NodeOutcome::ToolExecuted,
            NodeOutcome::Analyzed { end_of_loop: false },
            NodeOutcome::Thought(ThinkOutcome::AwaitingApproval),
        ];
        let expected = [
            Node::Think,
            Node::ExecuteTool,
            Node::AnalyzeOutput,
            Node::Think,
            Node::AwaitApproval,
        ];
        for (outcome, want) in script.into_iter().zip(expected) {
            node = next_node(node, outcome).unwrap();
            assert_eq!(node, want);
        }
        assert_eq!(next_node(node, NodeOutcome::Suspended), None);
    }
}
