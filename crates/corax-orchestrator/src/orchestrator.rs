//! The orchestrator façade
//!
//! Two public entry points: [`Orchestrator::invoke`] threads a new human
//! message into a session, [`Orchestrator::resume_after_approval`] delivers
//! the approval decision a suspended session is waiting on. Each call runs
//! exactly one traversal, saves the session, and extracts an [`AgentResult`].
//!
//! A session must not run two traversals at once; the checkpoint load/save
//! pair assumes exclusive access. The façade enforces that with an in-flight
//! set per session key and rejects the second caller as busy.

use std::collections::HashSet;
use std::sync::Arc;

use corax_agent::LlmProvider;
use corax_core::{
    AgentResult, ApprovalDecision, CoraxConfig, CoraxError, Result, SessionKey, SessionState,
};
use corax_tools::ToolExecutor;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::store::SessionStore;

pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmProvider>,
    tools: ToolExecutor,
    config: CoraxConfig,
    in_flight: Mutex<HashSet<SessionKey>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmProvider>,
        tools: ToolExecutor,
        config: CoraxConfig,
    ) -> Self {
        Self {
            store,
            llm,
            tools,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &CoraxConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    /// Start or continue a session with a new question
    ///
    /// A suspended session does not accept questions; the pending approval
    /// request is returned unchanged until a decision arrives. A completed
    /// session reopens with a fresh iteration budget.
    pub async fn invoke(&self, key: &SessionKey, question: &str) -> Result<AgentResult> {
        self.begin(key).await?;
        let outcome = self.invoke_inner(key, question).await;
        self.finish(key).await;
        outcome
    }

    async fn invoke_inner(&self, key: &SessionKey, question: &str) -> Result<AgentResult> {
        let mut state = match self.store.load(key).await? {
            Some(state) => state,
            None => {
                info!(session = %key, "creating session");
                SessionState::new(key.clone(), question, self.config.loop_defaults.max_iterations)
            }
        };

        if state.awaiting_user_approval {
            warn!(session = %key, "session awaits approval; returning the pending request");
            return Ok(AgentResult::from_state(&state));
        }

        if state.task_complete {
            info!(session = %key, "reopening completed session");
            state.task_complete = false;
            state.completion_reason = None;
            state.current_iteration = 0;
        }

        state.push_human(question);

        let engine = Engine::new(self.llm.as_ref(), &self.tools, &self.config);
        let report = engine.run(&mut state).await?;
        self.store.save(key, &state).await?;

        Ok(AgentResult::from_state(&state)
            .with_tool(report.tool_used, report.tool_output)
            .with_usage(report.usage))
    }

    /// Deliver an approval decision to a suspended session and resume it
    pub async fn resume_after_approval(
        &self,
        key: &SessionKey,
        decision: ApprovalDecision,
        modification: Option<String>,
    ) -> Result<AgentResult> {
        self.begin(key).await?;
        let outcome = self.resume_inner(key, decision, modification).await;
        self.finish(key).await;
        outcome
    }

    async fn resume_inner(
        &self,
        key: &SessionKey,
        decision: ApprovalDecision,
        modification: Option<String>,
    ) -> Result<AgentResult> {
        let mut state = self
            .store
            .load(key)
            .await?
            .ok_or_else(|| CoraxError::NoPendingSession(key.to_string()))?;
        if !state.awaiting_user_approval {
            return Err(CoraxError::NoPendingSession(key.to_string()));
        }

        info!(session = %key, decision = %decision, "resuming after approval decision");
        state.user_approval_response = Some(decision);
        state.user_modification = modification;

        let engine = Engine::new(self.llm.as_ref(), &self.tools, &self.config);
        let report = engine.run(&mut state).await?;
        self.store.save(key, &state).await?;

        Ok(AgentResult::from_state(&state)
            .with_tool(report.tool_used, report.tool_output)
            .with_usage(report.usage))
    }

    pub async fn list_sessions(&self, user_id: &str, project_id: &str) -> Result<Vec<String>> {
        self.store.list(user_id, project_id).await
    }

    pub async fn clear_session(&self, key: &SessionKey) -> Result<bool> {
        info!(session = %key, "clearing session");
        self.store.remove(key).await
    }

    pub async fn session_count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// Transcript length for one session, zero when it does not exist
    pub async fn message_count(&self, key: &SessionKey) -> Result<usize> {
        Ok(self
            .store
            .load(key)
            .await?
            .map(|state| state.messages.len())
            .unwrap_or(0))
    }

    async fn begin(&self, key: &SessionKey) -> Result<()> {
        let mut in_flight = self.in_flight.lock().await;
        if !in_flight.insert(key.clone()) {
            warn!(session = %key, "rejecting concurrent call on busy session");
            return Err(CoraxError::SessionBusy(key.to_string()));
        }
        Ok(())
    }

    async fn finish(&self, key: &SessionKey) {
        self.in_flight.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corax_agent::ScriptedLlm;
    use corax_core::{Phase, ToolPolicy, TOOL_METASPLOIT, TOOL_QUERY_GRAPH};
    use corax_tools::StaticBackend;

    use crate::store::InMemorySessionStore;

    fn key() -> SessionKey {
        SessionKey::new("alice", "acme", "s-01")
    }

    fn tools() -> ToolExecutor {
        ToolExecutor::new(ToolPolicy::default())
            .with_backend(Arc::new(StaticBackend::new(
                TOOL_QUERY_GRAPH,
                "apache 2.4.49 on port 443, CVE-2021-41773 candidate",
            )))
            .with_backend(Arc::new(StaticBackend::new(
                TOOL_METASPLOIT,
                "[*] exploit completed, session 1 opened",
            )))
    }

    fn orchestrator(replies: Vec<String>) -> (Orchestrator, Arc<ScriptedLlm>) {
        let llm = Arc::new(ScriptedLlm::new(replies));
        let orchestrator = Orchestrator::new(
            Arc::new(InMemorySessionStore::new()),
            llm.clone(),
            tools(),
            CoraxConfig::default(),
        );
        (orchestrator, llm)
    }

    fn use_tool_reply(tool: &str) -> String {
        serde_json::json!({
            "thought": "gather data",
            "reasoning": "graph first",
            "action": "use_tool",
            "tool_name": tool,
            "tool_args": {"question": "what do we know?"},
        })
        .to_string()
    }

    fn transition_reply() -> String {
        serde_json::json!({
            "thought": "ready to exploit",
            "reasoning": "vulnerability confirmed",
            "action": "transition_phase",
            "phase_transition": {
                "to_phase": "exploitation",
                "reason": "apache path traversal confirmed",
                "planned_actions": ["use exploit/multi/http/apache_normalize_path_rce"],
                "risks": ["service disruption"],
            },
        })
        .to_string()
    }

    fn analysis_reply() -> String {
        serde_json::json!({
            "interpretation": "vulnerable apache found",
            "extracted_info": {"vulnerabilities": ["CVE-2021-41773"]},
        })
        .to_string()
    }

    fn complete_reply(reason: &str) -> String {
        serde_json::json!({
            "thought": "done",
            "reasoning": "objective met",
            "action": "complete",
            "completion_reason": reason,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_invoke_answers_and_persists() {
        let (orchestrator, _) = orchestrator(vec![
            use_tool_reply(TOOL_QUERY_GRAPH),
            analysis_reply(),
            complete_reply("recon finished"),
            "Final report.".to_string(),
        ]);

        let result = orchestrator
            .invoke(&key(), "what is known about 10.0.0.5?")
            .await
            .unwrap();

        assert_eq!(result.answer, "Final report.");
        assert!(result.task_complete);
        assert_eq!(result.tool_used.as_deref(), Some(TOOL_QUERY_GRAPH));
        assert_eq!(result.iteration_count, 2);
        assert_eq!(result.usage.total(), 80);
        assert_eq!(orchestrator.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_suspension_then_approval_enters_exploitation() {
        let (orchestrator, _) = orchestrator(vec![
            transition_reply(),
            use_tool_reply(TOOL_METASPLOIT),
            analysis_reply(),
            complete_reply("exploit run"),
            "Exploitation report.".to_string(),
        ]);

        let suspended = orchestrator
            .invoke(&key(), "exploit CVE-2021-41773 on 10.0.0.5")
            .await
            .unwrap();
        assert!(suspended.awaiting_approval);
        assert!(!suspended.task_complete);
        assert_eq!(suspended.current_phase, Phase::Informational);
        let request = suspended.approval_request.as_ref().unwrap();
        assert_eq!(request.to_phase, Phase::Exploitation);
        assert_eq!(request.reason, "apache path traversal confirmed");
        assert!(suspended.answer.contains("## Phase Transition Request"));

        let resumed = orchestrator
            .resume_after_approval(&key(), ApprovalDecision::Approve, None)
            .await
            .unwrap();
        assert_eq!(resumed.current_phase, Phase::Exploitation);
        assert!(resumed.task_complete);
        assert!(!resumed.awaiting_approval);
        assert!(resumed.approval_request.is_none());
        assert_eq!(resumed.tool_used.as_deref(), Some(TOOL_METASPLOIT));
    }

    #[tokio::test]
    async fn test_invoke_on_suspended_session_returns_pending_request() {
        let (orchestrator, llm) = orchestrator(vec![transition_reply()]);

        orchestrator
            .invoke(&key(), "exploit CVE-2021-41773 on 10.0.0.5")
            .await
            .unwrap();
        assert_eq!(llm.remaining(), 0);

        // no LLM call, no state change; the caller just sees the request again
        let repeat = orchestrator
            .invoke(&key(), "any progress?")
            .await
            .unwrap();
        assert!(repeat.awaiting_approval);
        assert!(repeat.answer.contains("## Phase Transition Request"));
    }

    #[tokio::test]
    async fn test_resume_without_suspension_is_an_error() {
        let (orchestrator, _) = orchestrator(vec![
            complete_reply("nothing to do"),
            "Report.".to_string(),
        ]);

        // session does not exist yet
        let err = orchestrator
            .resume_after_approval(&key(), ApprovalDecision::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoraxError::NoPendingSession(_)));

        // session exists but is not suspended
        orchestrator.invoke(&key(), "hello").await.unwrap();
        let err = orchestrator
            .resume_after_approval(&key(), ApprovalDecision::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoraxError::NoPendingSession(_)));
    }

    #[tokio::test]
    async fn test_completed_session_reopens_for_followup() {
        let (orchestrator, _) = orchestrator(vec![
            complete_reply("first question answered"),
            "First report.".to_string(),
            complete_reply("second question answered"),
            "Second report.".to_string(),
        ]);

        let first = orchestrator.invoke(&key(), "first question").await.unwrap();
        assert!(first.task_complete);
        assert_eq!(first.answer, "First report.");

        let second = orchestrator.invoke(&key(), "second question").await.unwrap();
        assert!(second.task_complete);
        assert_eq!(second.answer, "Second report.");
        assert_eq!(second.iteration_count, 1);
    }

    #[tokio::test]
    async fn test_transport_error_leaves_store_untouched() {
        let (orchestrator, _) = orchestrator(Vec::new());

        let err = orchestrator.invoke(&key(), "scan 10.0.0.5").await.unwrap_err();
        assert!(matches!(err, CoraxError::Llm(_)));
        assert_eq!(orchestrator.session_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_busy_session_rejected() {
        let (orchestrator, _) = orchestrator(Vec::new());

        orchestrator.begin(&key()).await.unwrap();
        let err = orchestrator.begin(&key()).await.unwrap_err();
        assert!(matches!(err, CoraxError::SessionBusy(_)));

        orchestrator.finish(&key()).await;
        orchestrator.begin(&key()).await.unwrap();
    }

    #[tokio::test]
    async fn test_session_utilities() {
        let (orchestrator, _) = orchestrator(vec![
            complete_reply("done"),
            "Report.".to_string(),
        ]);

        orchestrator.invoke(&key(), "hello").await.unwrap();
        assert_eq!(
            orchestrator.list_sessions("alice", "acme").await.unwrap(),
            vec!["s-01"]
        );
        // the question and the final report
        assert_eq!(orchestrator.message_count(&key()).await.unwrap(), 2);
        assert!(orchestrator.clear_session(&key()).await.unwrap());
        assert!(!orchestrator.clear_session(&key()).await.unwrap());
        assert_eq!(orchestrator.session_count().await.unwrap(), 0);
        assert_eq!(orchestrator.message_count(&key()).await.unwrap(), 0);
    }
}
