//! The tool schema offered to the reasoning service

use serde::Deserialize;
use serde_json::{json, Value};

use crate::turn::ToolCall;

/// Name of the single shell tool
pub const RUN_COMMAND: &str = "run_command";

/// A tool as advertised to the service
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl ToolSpec {
    /// OpenAI-style function tool entry
    pub fn to_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// The fixed tool list
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![ToolSpec {
        name: RUN_COMMAND.to_string(),
        description: "Run a command in the connected remote terminal and return its output"
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command line to send to the remote shell"
                }
            },
            "required": ["command"]
        }),
    }]
}

/// A validated tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    RunCommand { command: String },
}

#[derive(Deserialize)]
struct RunCommandArgs {
    command: String,
}

/// Validate a call against the schema.
///
/// The error text becomes a failed tool result, so it is written for the
/// service to read.
pub fn parse_call(call: &ToolCall) -> Result<Invocation, String> {
    match call.name.as_str() {
        RUN_COMMAND => {
            let raw = if call.arguments.trim().is_empty() {
                "{}"
            } else {
                call.arguments.as_str()
            };
            let args: RunCommandArgs = serde_json::from_str(raw)
                .map_err(|e| format!("Error: invalid arguments for {}: {}", RUN_COMMAND, e))?;
            let command = args.command.trim();
            if command.is_empty() {
                return Err("Error: no command provided".to_string());
            }
            Ok(Invocation::RunCommand {
                command: command.to_string(),
            })
        }
        other => Err(format!("Error: unknown tool: {}", other)),
    }
}
