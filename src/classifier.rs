use serde::Deserialize;
use tracing::warn;

use crate::engine::FALLBACK_REFUSAL;
use crate::model::{self, Client, UserPrompt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Create { title: String, description: String },
    Refuse { reason: String },
}

const SYSTEM_PROMPT: &str = r#"Create GitHub issues from the content provided.

- "create": actionable content -> a short, objective title and description, in the language of the content
- "refuse": off-topic or too vague -> refusalReason, in the language of the content

Use only what the content states. Do not invent scope, sections or suggestions.
Unused fields: null."#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDecision {
    action: String,
    title: Option<String>,
    description: Option<String>,
    refusal_reason: Option<String>,
}

fn decision_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["create", "refuse"],
                "description": "'create' to open the issue, 'refuse' for off-topic or too vague content"
            },
            "title": {
                "type": ["string", "null"],
                "description": "Issue title. Required when action='create', null otherwise"
            },
            "description": {
                "type": ["string", "null"],
                "description": "Issue description in Markdown. Required when action='create', null otherwise"
            },
            "refusalReason": {
                "type": ["string", "null"],
                "description": "Why the request was refused. Required when action='refuse', null otherwise"
            }
        },
        "required": ["action", "title", "description", "refusalReason"],
        "additionalProperties": false
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Turn the model's JSON into a decision. Anything that does not carry the
/// fields its action needs becomes the fallback refusal.
pub fn parse_decision(raw: &str) -> Decision {
    let fallback = || Decision::Refuse {
        reason: FALLBACK_REFUSAL.to_string(),
    };

    let parsed: RawDecision = match serde_json::from_str(raw) {
        Ok(p) => p,
        Err(e) => {
            warn!("Unparseable decision from model: {e}");
            return fallback();
        }
    };

    match parsed.action.as_str() {
        "create" => match (non_blank(parsed.title), non_blank(parsed.description)) {
            (Some(title), Some(description)) => Decision::Create { title, description },
            _ => {
                warn!("Model chose create without title/description");
                fallback()
            }
        },
        "refuse" => match non_blank(parsed.refusal_reason) {
            Some(reason) => Decision::Refuse { reason },
            None => fallback(),
        },
        other => {
            warn!("Unknown action from model: {other}");
            fallback()
        }
    }
}

fn build_prompt(content: &str, image_count: usize) -> String {
    if image_count > 0 {
        format!("{content}\n\n[{image_count} image(s) attached as additional context]")
    } else {
        content.to_string()
    }
}

pub async fn classify(content: &str, image_count: usize, client: &Client) -> Result<Decision, model::Error> {
    let prompt = UserPrompt {
        text: build_prompt(content, image_count),
        image_urls: Vec::new(),
    };

    let raw = client
        .complete_structured(SYSTEM_PROMPT, &prompt, "issue_decision", decision_schema())
        .await?;

    match raw {
        Some(raw) => Ok(parse_decision(&raw)),
        None => {
            warn!("Model returned no structured decision");
            Ok(Decision::Refuse {
                reason: FALLBACK_REFUSAL.to_string(),
            })
        }
    }
}
