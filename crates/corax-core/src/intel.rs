//! Accumulated target intelligence merged from tool output analysis

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Kind of the primary target identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Ip,
    Hostname,
    Domain,
    Url,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip => write!(f, "ip"),
            Self::Hostname => write!(f, "hostname"),
            Self::Domain => write!(f, "domain"),
            Self::Url => write!(f, "url"),
        }
    }
}

/// What is known about the target so far
///
/// Grows monotonically: every merge unions set fields and never removes
/// anything, so replaying the same analysis twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetIntel {
    pub primary_target: Option<String>,
    pub target_type: Option<TargetType>,
    pub ports: BTreeSet<u16>,
    pub services: BTreeSet<String>,
    pub technologies: BTreeSet<String>,
    pub vulnerabilities: BTreeSet<String>,
    pub credentials: Vec<serde_json::Value>,
    pub sessions: BTreeSet<u32>,
}

impl TargetIntel {
    /// Merge freshly extracted intel into the accumulated view
    ///
    /// Incoming scalars win only when non-empty, set fields union, credentials
    /// append without duplicating entries already present.
    pub fn merge_from(&mut self, other: TargetIntel) {
        if let Some(target) = other.primary_target {
            if !target.is_empty() {
                self.primary_target = Some(target);
            }
        }
        if other.target_type.is_some() {
            self.target_type = other.target_type;
        }
        self.ports.extend(other.ports);
        self.services.extend(other.services);
        self.technologies.extend(other.technologies);
        self.vulnerabilities.extend(other.vulnerabilities);
        for credential in other.credentials {
            if !self.credentials.contains(&credential) {
                self.credentials.push(credential);
            }
        }
        self.sessions.extend(other.sessions);
    }

    pub fn is_empty(&self) -> bool {
        self.primary_target.is_none()
            && self.target_type.is_none()
            && self.ports.is_empty()
            && self.services.is_empty()
            && self.technologies.is_empty()
            && self.vulnerabilities.is_empty()
            && self.credentials.is_empty()
            && self.sessions.is_empty()
    }

    /// Render for prompt insertion (pretty JSON, or a sentinel when empty)
    pub fn to_prompt_block(&self) -> String {
        if self.is_empty() {
            return "Nothing known about the target yet.".to_string();
        }
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
