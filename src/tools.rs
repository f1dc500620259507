//! Tool definitions the model can call to act on the tracker.

use serde::{Deserialize, Serialize};

/// Tool definition sent to the model.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tool calls the model can make, decoded from its raw arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    /// Open a new issue.
    CreateIssue { title: String, description: String },

    /// Comment on an existing issue.
    AddComment {
        #[serde(rename = "issueNumber")]
        issue_number: u64,
        body: String,
    },
}

impl ToolCall {
    /// Decode a tool invocation. Unknown tools, malformed JSON and blank
    /// required strings are all rejected.
    pub fn decode(name: &str, arguments: &str) -> Result<Self, String> {
        let mut args: serde_json::Value = if arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(arguments).map_err(|e| format!("invalid arguments for {name}: {e}"))?
        };
        let object = args
            .as_object_mut()
            .ok_or_else(|| format!("arguments for {name} must be an object"))?;
        object.insert("tool".to_string(), serde_json::Value::String(name.to_string()));

        let call: ToolCall =
            serde_json::from_value(args).map_err(|e| format!("invalid call to {name}: {e}"))?;

        let blank = match &call {
            ToolCall::CreateIssue { title, description } => {
                if title.trim().is_empty() {
                    Some("title")
                } else if description.trim().is_empty() {
                    Some("description")
                } else {
                    None
                }
            }
            ToolCall::AddComment { body, .. } => body.trim().is_empty().then_some("body"),
        };
        match blank {
            Some(field) => Err(format!("{name}: {field} is empty")),
            None => Ok(call),
        }
    }
}

/// Get the tool definitions for the model.
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "create_issue".to_string(),
            description: "Create a new GitHub issue. Default action for any actionable content: bugs, feature requests, questions.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Short, objective issue title in the language of the request"
                    },
                    "description": {
                        "type": "string",
                        "description": "Issue description in Markdown, only what the user stated"
                    }
                },
                "required": ["title", "description"],
                "additionalProperties": false
            }),
        },
        Tool {
            name: "add_comment".to_string(),
            description: "Add a comment to an existing issue. Only when the user explicitly asks to comment on a numbered issue.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "issueNumber": {
                        "type": "integer",
                        "description": "Number of the issue to comment on"
                    },
                    "body": {
                        "type": "string",
                        "description": "Comment text, phrased as the action still to be done (e.g. \"add support for X\")"
                    }
                },
                "required": ["issueNumber", "body"],
                "additionalProperties": false
            }),
        },
    ]
}
