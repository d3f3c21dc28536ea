//! Tool execution abstraction
//!
//! The executor owns exactly two jobs: the phase gate-check and dispatch to
//! the backend registered under the tool's name. Backend failures are wrapped
//! into a failed [`ToolResult`] so nothing a tool does can crash a traversal.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use corax_core::{Phase, Result, ToolPolicy};
use tracing::{debug, warn};

/// Outcome of one tool invocation
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// The text worth recording: output on success, the error otherwise
    pub fn observed(&self) -> &str {
        if self.success {
            &self.output
        } else {
            self.error.as_deref().unwrap_or("")
        }
    }
}

/// Trait for tool backends (allows scripting in tests)
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Tool name this backend serves
    fn name(&self) -> &str;

    /// Run the tool with the given JSON arguments
    async fn run(&self, args: &serde_json::Value) -> Result<String>;
}

/// Backend with a fixed canned response, for tests and dry wiring
#[derive(Clone)]
pub struct StaticBackend {
    name: String,
    response: std::result::Result<String, String>,
}

impl StaticBackend {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: Ok(output.into()),
        }
    }

    pub fn failing(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: Err(error.into()),
        }
    }
}

#[async_trait]
impl ToolBackend for StaticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _args: &serde_json::Value) -> Result<String> {
        match &self.response {
            Ok(output) => Ok(output.clone()),
            Err(error) => Err(corax_core::CoraxError::Tool(error.clone())),
        }
    }
}

/// Phase-gated tool dispatcher
pub struct ToolExecutor {
    backends: HashMap<String, Arc<dyn ToolBackend>>,
    policy: ToolPolicy,
}

impl ToolExecutor {
    pub fn new(policy: ToolPolicy) -> Self {
        Self {
            backends: HashMap::new(),
            policy,
        }
    }

    /// Register a backend under its own name
    pub fn with_backend(mut self, backend: Arc<dyn ToolBackend>) -> Self {
        self.backends.insert(backend.name().to_string(), backend);
        self
    }

    pub fn policy(&self) -> &ToolPolicy {
        &self.policy
    }

    /// Names of the registered backends, sorted
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a tool if the phase allows it
    ///
    /// Never returns an error: policy denials, unknown tools, and backend
    /// failures all come back as a failed result.
    pub async fn execute(
        &self,
        tool_name: &str,
        args: &serde_json::Value,
        phase: Phase,
    ) -> ToolResult {
        if !self.policy.is_allowed(tool_name, phase) {
            let allowed = self.policy.allowed_tools(phase).join(", ");
            warn!(
                "Blocked tool '{}' in the {} phase (allowed: {})",
                tool_name, phase, allowed
            );
            return ToolResult::failed(format!(
                "Tool '{}' is not allowed in the {} phase. Allowed tools: {}",
                tool_name, phase, allowed
            ));
        }

        let Some(backend) = self.backends.get(tool_name) else {
            return ToolResult::failed(format!("No backend registered for tool '{}'", tool_name));
        };

        debug!("Executing tool '{}' in the {} phase", tool_name, phase);
        match backend.run(args).await {
            Ok(output) => ToolResult::ok(output),
            Err(e) => ToolResult::failed(format!("Tool '{}' failed: {}", tool_name, e)),
        }
    }
}
