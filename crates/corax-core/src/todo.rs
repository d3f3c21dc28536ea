//! LLM-managed todo list tracking engagement progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Short identifier for todo items and trace steps (8 hex chars)
pub(crate) fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Status of a todo item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for TodoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid todo status: {}", s)),
        }
    }
}

/// Priority of a todo item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    High = 0,
    #[default]
    Medium = 1,
    Low = 2,
}

impl std::fmt::Display for TodoPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for TodoPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Invalid todo priority: {}", s)),
        }
    }
}

/// A task item owned by the LLM
///
/// Identity is `id`; the LLM may reuse an id to update status or invent a new
/// one for new work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: TodoPriority,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: short_id(),
            description: description.into(),
            status: TodoStatus::Pending,
            priority: TodoPriority::Medium,
            notes: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: TodoPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Todo item as it appears in an LLM decision (simplified update shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoUpdate {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: TodoPriority,
}

/// Replace the todo list wholesale from the LLM's latest view
///
/// The LLM owns the list: ordering and membership come entirely from
/// `updates`. Bookkeeping fields the update shape cannot express are carried
/// over by id (`created_at`, `notes`), and `completed_at` is stamped when an
/// item first reaches `Completed`.
pub fn replace_todo_list(existing: &[TodoItem], updates: &[TodoUpdate]) -> Vec<TodoItem> {
    let now = Utc::now();

    updates
        .iter()
        .map(|update| {
            let prior = update
                .id
                .as_deref()
                .and_then(|id| existing.iter().find(|item| item.id == id));

            let completed_at = match (update.status, prior) {
                (TodoStatus::Completed, Some(p)) => p.completed_at.or(Some(now)),
                (TodoStatus::Completed, None) => Some(now),
                _ => None,
            };

            TodoItem {
                id: update.id.clone().unwrap_or_else(short_id),
                description: update.description.clone(),
                status: update.status,
                priority: update.priority,
                notes: prior.and_then(|p| p.notes.clone()),
                created_at: prior.map(|p| p.created_at).unwrap_or(now),
                completed_at,
            }
        })
        .collect()
}

/// Render the todo list for prompts and logs
///
/// Status icons: `[ ]` pending, `[~]` in progress, `[x]` completed, `[!]`
/// blocked. Priority markers: `!!!` high, `!!` medium, `!` low.
pub fn format_todo_list(todo_list: &[TodoItem]) -> String {
    if todo_list.is_empty() {
        return "No tasks defined yet.".to_string();
    }

    let mut lines = Vec::new();
    for (i, todo) in todo_list.iter().enumerate() {
        let status_icon = match todo.status {
            TodoStatus::Pending => "[ ]",
            TodoStatus::InProgress => "[~]",
            TodoStatus::Completed => "[x]",
            TodoStatus::Blocked => "[!]",
        };

        let priority_marker = match todo.priority {
            TodoPriority::High => "!!!",
            TodoPriority::Medium => "!!",
            TodoPriority::Low => "!",
        };

        lines.push(format!(
            "{}. {} {} {}",
            i + 1,
            status_icon,
            priority_marker,
            todo.description
        ));
        if let Some(notes) = &todo.notes {
            lines.push(format!("   Notes: {}", notes));
        }
    }

    lines.join("\n")
}
