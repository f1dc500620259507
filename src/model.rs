//! Chat-completions client for the language model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::tools::Tool;

pub struct Client {
    api_key: String,
    api_base: String,
    model: String,
    http: reqwest::Client,
}

/// User turn: text plus image URLs the model should look at.
#[derive(Debug, Clone, Default)]
pub struct UserPrompt {
    pub text: String,
    pub image_urls: Vec<String>,
}

/// A tool invocation emitted by the model. `arguments` is raw JSON text
/// and has not been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: String,
}

/// What the model produced for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    ToolCalls(Vec<ToolInvocation>),
    Text(String),
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    r#type: &'static str,
    function: &'a Tool,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

impl Client {
    pub fn new(api_key: String, api_base: &str, model: String) -> Self {
        Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            http: reqwest::Client::new(),
        }
    }

    /// One turn with tools available. The model picks a tool or answers in text.
    pub async fn complete_with_tools(
        &self,
        system: &str,
        prompt: &UserPrompt,
        tools: &[Tool],
    ) -> Result<Reply, Error> {
        let request = ApiRequest {
            model: &self.model,
            messages: messages(system, prompt),
            tools: Some(
                tools
                    .iter()
                    .map(|function| ApiTool { r#type: "function", function })
                    .collect(),
            ),
            tool_choice: Some("auto"),
            response_format: None,
        };

        let message = self.send(&request).await?;
        if !message.tool_calls.is_empty() {
            let calls = message
                .tool_calls
                .into_iter()
                .map(|c| ToolInvocation {
                    name: c.function.name,
                    arguments: c.function.arguments,
                })
                .collect();
            return Ok(Reply::ToolCalls(calls));
        }
        Ok(Reply::Text(message.content.unwrap_or_default()))
    }

    /// One turn constrained to a JSON schema. Returns the raw JSON text, or
    /// `None` when the model produced no content (e.g. a schema refusal).
    pub async fn complete_structured(
        &self,
        system: &str,
        prompt: &UserPrompt,
        schema_name: &str,
        schema: Value,
    ) -> Result<Option<String>, Error> {
        let request = ApiRequest {
            model: &self.model,
            messages: messages(system, prompt),
            tools: None,
            tool_choice: None,
            response_format: Some(serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name,
                    "strict": true,
                    "schema": schema,
                }
            })),
        };

        let message = self.send(&request).await?;
        if let Some(refusal) = &message.refusal {
            debug!("Model refused structured output: {refusal}");
        }
        Ok(message.content.filter(|c| !c.trim().is_empty()))
    }

    async fn send(&self, request: &ApiRequest<'_>) -> Result<ResponseMessage, Error> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or(Error::Empty)
    }
}

fn messages(system: &str, prompt: &UserPrompt) -> Vec<ApiMessage> {
    let user = if prompt.image_urls.is_empty() {
        ApiContent::Text(prompt.text.clone())
    } else {
        let mut parts = vec![ApiPart::Text {
            text: prompt.text.clone(),
        }];
        parts.extend(prompt.image_urls.iter().map(|url| ApiPart::ImageUrl {
            image_url: ApiImageUrl { url: url.clone() },
        }));
        ApiContent::Parts(parts)
    };

    vec![
        ApiMessage {
            role: "system",
            content: ApiContent::Text(system.to_string()),
        },
        ApiMessage {
            role: "user",
            content: user,
        },
    ]
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}
