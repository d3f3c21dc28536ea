//! Node handlers and the traversal loop
//!
//! One call to [`Engine::run`] walks the reasoning graph from `initialize`
//! until [`next_node`] reports a terminal: either the approval suspension or
//! the final report. The engine mutates the session state in place; the
//! caller decides whether to persist the result. LLM transport errors
//! propagate out of the traversal unsaved, so a failed run leaves the stored
//! session exactly as it was.

use corax_agent::{parse_analysis, parse_decision, DecisionAction, LlmDecision, LlmProvider};
use corax_core::{
    replace_todo_list, ApprovalDecision, CoraxConfig, ExecutionStep, Phase, Result, SessionState,
    TokenUsage, TransitionRequest, TOOL_METASPLOIT,
};
use corax_tools::ToolExecutor;
use tracing::{debug, info, warn};

use crate::machine::{next_node, Node, NodeOutcome, ThinkOutcome};
use crate::prompt::{
    build_analysis_prompt, build_react_prompt, build_report_prompt, default_exploit_command,
    transition_message,
};

/// Transient inter-node fields for one traversal
///
/// Nothing here is persisted. The one cross-traversal signal, the one-shot
/// `just_transitioned_to` marker, lives on [`SessionState`] instead so it
/// survives the approval suspension.
#[derive(Debug, Default)]
struct TraversalScratch {
    /// Step under construction between think and analyze_output
    step: Option<ExecutionStep>,
    last_tool: Option<String>,
    last_output: Option<String>,
    usage: TokenUsage,
}

/// What one traversal hands back to the façade
#[derive(Debug, Default)]
pub struct TraversalReport {
    pub usage: TokenUsage,
    pub tool_used: Option<String>,
    pub tool_output: Option<String>,
}

/// The reasoning engine: node handlers wired to the pure router
pub struct Engine<'a> {
    llm: &'a dyn LlmProvider,
    tools: &'a ToolExecutor,
    config: &'a CoraxConfig,
}

impl<'a> Engine<'a> {
    pub fn new(llm: &'a dyn LlmProvider, tools: &'a ToolExecutor, config: &'a CoraxConfig) -> Self {
        Self { llm, tools, config }
    }

    /// Run one full traversal over the session
    ///
    /// Ends at the approval suspension or after the final report; there is
    /// no mid-traversal cancellation. `max_iterations` is the safety valve
    /// against runaway loops.
    pub async fn run(&self, state: &mut SessionState) -> Result<TraversalReport> {
        let mut scratch = TraversalScratch::default();
        let mut node = Node::Initialize;

        loop {
            debug!(session = %state.key, node = %node, "entering node");
            let outcome = match node {
                Node::Initialize => self.initialize(state),
                Node::Think => self.think(state, &mut scratch).await?,
                Node::ExecuteTool => self.execute_tool(state, &mut scratch).await,
                Node::AnalyzeOutput => self.analyze_output(state, &mut scratch).await?,
                Node::AwaitApproval => self.await_approval(state),
                Node::ProcessApproval => self.process_approval(state),
                Node::GenerateResponse => self.generate_response(state, &mut scratch).await?,
            };
            match next_node(node, outcome) {
                Some(next) => node = next,
                None => break,
            }
        }

        Ok(TraversalReport {
            usage: scratch.usage,
            tool_used: scratch.last_tool,
            tool_output: scratch.last_output,
        })
    }

    fn initialize(&self, state: &SessionState) -> NodeOutcome {
        let approval_pending = state.user_approval_response.is_some();
        debug!(
            session = %state.key,
            phase = %state.current_phase,
            iteration = state.current_iteration,
            approval_pending,
            "starting traversal"
        );
        NodeOutcome::Initialized { approval_pending }
    }

    /// One reasoning pass: build the prompt, obtain a decision, apply the
    /// anti-thrash rules, and report where that leaves the session
    async fn think(
        &self,
        state: &mut SessionState,
        scratch: &mut TraversalScratch,
    ) -> Result<NodeOutcome> {
        // One-shot: consumed here so it only shields the first pass after
        // an approval
        let just_entered = state.just_transitioned_to.take();
        state.current_iteration += 1;

        let prompt = build_react_prompt(state);
        let reply = self.llm.complete(&prompt).await?;
        scratch.usage.add(reply.usage);

        let mut decision = parse_decision(&reply.text);
        debug!(
            session = %state.key,
            iteration = state.current_iteration,
            action = %decision.action,
            "decision"
        );

        if !decision.updated_todo_list.is_empty() {
            state.todo_list = replace_todo_list(&state.todo_list, &decision.updated_todo_list);
        }

        let mut replan = false;

        match decision.action {
            DecisionAction::Complete => {
                state.task_complete = true;
                if decision.completion_reason.is_some() {
                    state.completion_reason = decision.completion_reason.clone();
                }
            }
            DecisionAction::TransitionPhase => {
                if let Some(transition) = decision.phase_transition.clone() {
                    let to = transition.to_phase;
                    if to == state.current_phase || just_entered == Some(to) {
                        info!(
                            session = %state.key,
                            phase = %to,
                            "suppressing redundant transition request"
                        );
                        replan = !force_default_tool(state, &mut decision);
                    } else if self.config.approval_required(to) {
                        info!(
                            session = %state.key,
                            from = %state.current_phase,
                            to = %to,
                            "transition requires approval"
                        );
                        state.phase_transition_pending = Some(
                            TransitionRequest::new(state.current_phase, to, transition.reason)
                                .with_planned_actions(transition.planned_actions)
                                .with_risks(transition.risks),
                        );
                        state.awaiting_user_approval = true;
                    } else {
                        info!(
                            session = %state.key,
                            from = %state.current_phase,
                            to = %to,
                            "transition auto-approved"
                        );
                        state.commit_phase(to);
                        state.just_transitioned_to = Some(to);
                        replan = !force_default_tool(state, &mut decision);
                    }
                } else {
                    warn!(session = %state.key, "transition decision carries no phase details");
                }
            }
            DecisionAction::UseTool => {}
        }

        let outcome = if state.awaiting_user_approval {
            ThinkOutcome::AwaitingApproval
        } else if state.task_complete {
            ThinkOutcome::Completed
        } else if state.current_iteration >= state.max_iterations {
            info!(
                session = %state.key,
                max_iterations = state.max_iterations,
                "iteration limit reached"
            );
            ThinkOutcome::IterationsExhausted
        } else if replan {
            ThinkOutcome::Replan
        } else if let Some(tool_name) = decision.tool_name.clone() {
            let args = decision
                .tool_args
                .clone()
                .unwrap_or_else(|| serde_json::json!({}));
            scratch.step = Some(
                ExecutionStep::new(
                    state.current_iteration,
                    state.current_phase,
                    decision.thought.clone(),
                    decision.reasoning.clone(),
                )
                .with_tool(tool_name, args),
            );
            ThinkOutcome::ToolSelected
        } else {
            warn!(session = %state.key, "decision has no tool and no usable transition");
            ThinkOutcome::Undispatchable
        };

        Ok(NodeOutcome::Thought(outcome))
    }

    /// Run the selected tool and attach the result to the step
    ///
    /// Failures are data: the step records them and flows on to analysis
    async fn execute_tool(
        &self,
        state: &SessionState,
        scratch: &mut TraversalScratch,
    ) -> NodeOutcome {
        if let Some(step) = scratch.step.as_mut() {
            let tool_name = step.tool_name.clone().unwrap_or_default();
            let args = step
                .tool_args
                .clone()
                .unwrap_or_else(|| serde_json::json!({}));

            info!(session = %state.key, tool = %tool_name, "executing tool");
            let result = self
                .tools
                .execute(&tool_name, &args, state.current_phase)
                .await;

            step.success = result.success;
            step.tool_output = Some(result.observed().to_string());
            step.error_message = result.error.clone();

            scratch.last_tool = Some(tool_name);
            scratch.last_output = Some(result.observed().to_string());
        } else {
            warn!(session = %state.key, "execute_tool reached without a step under construction");
        }
        NodeOutcome::ToolExecuted
    }

    /// Interpret the tool output, fold new intelligence into the session,
    /// and seal the step into the trace
    async fn analyze_output(
        &self,
        state: &mut SessionState,
        scratch: &mut TraversalScratch,
    ) -> Result<NodeOutcome> {
        if let Some(mut step) = scratch.step.take() {
            let tool_name = step.tool_name.clone().unwrap_or_default();
            let args = step
                .tool_args
                .clone()
                .unwrap_or_else(|| serde_json::json!({}));
            let output = step.tool_output.clone().unwrap_or_default();

            let prompt = build_analysis_prompt(
                &tool_name,
                &args,
                &output,
                &state.target_info,
                self.config.loop_defaults.tool_output_max_chars,
            );
            let reply = self.llm.complete(&prompt).await?;
            scratch.usage.add(reply.usage);

            let analysis = parse_analysis(&reply.text);
            step.output_analysis = Some(analysis.interpretation.clone());
            state.push_assistant(format!(
                "Step {} ({}): {}",
                step.iteration, tool_name, analysis.interpretation
            ));
            state.target_info.merge_from(analysis.extracted_info);
            state.execution_trace.push(step);
        }

        let end_of_loop = state.task_complete || state.current_iteration >= state.max_iterations;
        Ok(NodeOutcome::Analyzed { end_of_loop })
    }

    /// Render the pending transition request for the human and suspend
    fn await_approval(&self, state: &mut SessionState) -> NodeOutcome {
        match state.phase_transition_pending.clone() {
            Some(request) => {
                info!(
                    session = %state.key,
                    to = %request.to_phase,
                    "suspending for phase transition approval"
                );
                state.push_assistant(transition_message(&request));
            }
            None => {
                warn!(session = %state.key, "await_approval reached without a pending request");
            }
        }
        NodeOutcome::Suspended
    }

    /// Apply the human's approve/modify/abort decision
    ///
    /// The gate fields are cleared unconditionally, whatever the decision
    /// was, so a session can never get stuck half-suspended.
    fn process_approval(&self, state: &mut SessionState) -> NodeOutcome {
        let decision = state.user_approval_response.take();
        let pending = state.phase_transition_pending.take();
        let modification = state.user_modification.take();
        state.awaiting_user_approval = false;

        match (decision, pending) {
            (Some(ApprovalDecision::Approve), Some(request)) => {
                info!(
                    session = %state.key,
                    from = %request.from_phase,
                    to = %request.to_phase,
                    "phase transition approved"
                );
                state.commit_phase(request.to_phase);
                state.just_transitioned_to = Some(request.to_phase);
                state.push_assistant(format!(
                    "Phase transition approved. Now operating in the {} phase.",
                    request.to_phase
                ));
            }
            (Some(ApprovalDecision::Modify), Some(request)) => {
                let feedback = modification
                    .unwrap_or_else(|| "Please revise the plan before proceeding.".to_string());
                info!(
                    session = %state.key,
                    to = %request.to_phase,
                    "transition plan sent back for modification"
                );
                state.push_human(format!(
                    "Do not proceed to {} as planned. Revised instructions: {}",
                    request.to_phase, feedback
                ));
            }
            (Some(ApprovalDecision::Abort), Some(request)) => {
                info!(session = %state.key, to = %request.to_phase, "phase transition aborted");
                state.task_complete = true;
                state.completion_reason = Some(format!(
                    "User cancelled the transition to {}; staying in the {} phase.",
                    request.to_phase, state.current_phase
                ));
            }
            (decision, _) => {
                warn!(
                    session = %state.key,
                    decision = ?decision,
                    "approval processing with incomplete gate state"
                );
            }
        }

        NodeOutcome::ApprovalProcessed {
            task_complete: state.task_complete,
        }
    }

    /// Produce the final report and close out the session
    async fn generate_response(
        &self,
        state: &mut SessionState,
        scratch: &mut TraversalScratch,
    ) -> Result<NodeOutcome> {
        if state.completion_reason.is_none() {
            state.completion_reason = Some(if state.current_iteration >= state.max_iterations {
                format!("Reached the maximum of {} iterations", state.max_iterations)
            } else {
                "Task completed".to_string()
            });
        }

        let prompt = build_report_prompt(state);
        let reply = self.llm.complete(&prompt).await?;
        scratch.usage.add(reply.usage);

        state.push_assistant(reply.text);
        state.task_complete = true;
        info!(
            session = %state.key,
            iterations = state.current_iteration,
            phase = %state.current_phase,
            "session finished"
        );

        Ok(NodeOutcome::Finished)
    }
}

/// Fallback for a suppressed or auto-committed transition
///
/// Reuses an already chosen tool; in the exploitation phase with nothing
/// chosen, forces the default exploit search derived from the objective.
/// Returns whether a tool is now selected.
fn force_default_tool(state: &SessionState, decision: &mut LlmDecision) -> bool {
    if decision.tool_name.is_some() {
        return true;
    }
    if state.current_phase == Phase::Exploitation {
        let command = default_exploit_command(&state.original_objective);
        info!(
            session = %state.key,
            command = %command,
            "forcing default exploitation action"
        );
        decision.tool_name = Some(TOOL_METASPLOIT.to_string());
        decision.tool_args = Some(serde_json::json!({ "command": command }));
        return true;
    }
    false
}
