//! Conversation turns

use serde::{Deserialize, Serialize};

/// A tool invocation requested by the reasoning service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, exactly as the service sent them
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One entry of the conversation history.
///
/// System instructions are not part of the history; they are rebuilt for
/// every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        content: String,
    },
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        content: String,
        failed: bool,
    },
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn::User {
            content: content.into(),
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>, failed: bool) -> Self {
        Turn::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
            failed,
        }
    }
}

/// Results for tool calls of the last assistant turn that never got one.
///
/// Keeps the history valid for the next request after a run ended between
/// a tool call and its result.
pub(crate) fn unanswered_calls(history: &[Turn]) -> Vec<String> {
    let Some(pos) = history
        .iter()
        .rposition(|t| matches!(t, Turn::Assistant { .. }))
    else {
        return Vec::new();
    };
    let Turn::Assistant { tool_calls, .. } = &history[pos] else {
        return Vec::new();
    };
    tool_calls
        .iter()
        .filter(|call| {
            !history[pos + 1..].iter().any(|t| {
                matches!(t, Turn::ToolResult { call_id, .. } if *call_id == call.id)
            })
        })
        .map(|call| call.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unanswered_calls() {
        let history = vec![
            Turn::user("check disk"),
            Turn::Assistant {
                text: None,
                tool_calls: vec![
                    ToolCall::new("a", "run_command", r#"{"command":"df -h"}"#),
                    ToolCall::new("b", "run_command", r#"{"command":"du -sh /"}"#),
                ],
            },
            Turn::tool_result("a", "ok", false),
        ];
        assert_eq!(unanswered_calls(&history), vec!["b".to_string()]);
        assert!(unanswered_calls(&history[..1]).is_empty());
    }
}
