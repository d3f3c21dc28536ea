//! Configuration management for Corax
//!
//! This module provides configuration structures for agent runtime settings,
//! including model selection, loop limits, approval gates, and the API server.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::phase::Phase;
use crate::Result;

/// Agent runtime configuration
///
/// Loaded from `.corax/config.toml` in the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoraxConfig {
    /// Model selection
    #[serde(default)]
    pub models: ModelConfig,

    /// Reasoning loop limits
    #[serde(default)]
    pub loop_defaults: LoopDefaults,

    /// Phase approval gates
    #[serde(default)]
    pub approval: ApprovalConfig,

    /// HTTP API settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model to use
    #[serde(default = "default_model")]
    pub default: String,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Reasoning loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDefaults {
    /// Maximum reasoning iterations before forcing a final report
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Truncate tool output to this many characters in prompts
    #[serde(default = "default_tool_output_max_chars")]
    pub tool_output_max_chars: usize,
}

/// Which phase transitions require human approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_true")]
    pub require_for_exploitation: bool,

    #[serde(default = "default_true")]
    pub require_for_post_exploitation: bool,
}

/// HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address the server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

// Default value providers
fn default_model() -> String {
    "sonnet".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_iterations() -> u32 {
    30
}

fn default_tool_output_max_chars() -> usize {
    8000
}

fn default_true() -> bool {
    true
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl CoraxConfig {
    /// Load configuration from `.corax/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".corax/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content).map_err(|e| {
                crate::CoraxError::Config(format!("Failed to parse config file: {}", e))
            })?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.corax/config.toml`
    pub fn write_default(root: &Path) -> Result<()> {
        let config_dir = root.join(".corax");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config).map_err(|e| {
            crate::CoraxError::Config(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Whether entering `phase` needs explicit human approval
    pub fn approval_required(&self, phase: Phase) -> bool {
        match phase {
            Phase::Informational => false,
            Phase::Exploitation => self.approval.require_for_exploitation,
            Phase::PostExploitation => self.approval.require_for_post_exploitation,
        }
    }
}

impl Default for CoraxConfig {
    fn default() -> Self {
        Self {
            models: ModelConfig::default(),
            loop_defaults: LoopDefaults::default(),
            approval: ApprovalConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for LoopDefaults {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_output_max_chars: default_tool_output_max_chars(),
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            require_for_exploitation: true,
            require_for_post_exploitation: true,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}
