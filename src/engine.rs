//! Decision engine - turns one request into one tracker action or a refusal.

use tracing::{info, warn};

use crate::classifier::{self, Decision};
use crate::config::Policy;
use crate::model::{self, Reply, UserPrompt};
use crate::tools::{get_tool_definitions, ToolCall};
use crate::tracker::{self, TrackerClient};

/// Refusal text used whenever the model gives nothing usable.
pub const FALLBACK_REFUSAL: &str = "cannot process this request, please provide more detail.";

/// Content of one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub text_content: String,
    pub image_urls: Vec<String>,
}

/// Outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestResult {
    IssueCreated {
        title: String,
        description: String,
        url: String,
        number: u64,
    },
    CommentAdded {
        issue_title: String,
        url: String,
        issue_number: u64,
    },
    Refused {
        reason: String,
    },
}

impl RequestResult {
    fn refused(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            FALLBACK_REFUSAL.to_string()
        } else {
            reason
        };
        RequestResult::Refused { reason }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Model(model::Error),
    Tracker(tracker::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Model(e) => write!(f, "model call failed: {e}"),
            EngineError::Tracker(e) => write!(f, "tracker call failed: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Model(e) => Some(e),
            EngineError::Tracker(e) => Some(e),
        }
    }
}

impl From<model::Error> for EngineError {
    fn from(e: model::Error) -> Self {
        EngineError::Model(e)
    }
}

impl From<tracker::Error> for EngineError {
    fn from(e: tracker::Error) -> Self {
        EngineError::Tracker(e)
    }
}

/// The clients a request needs, built once at startup and shared by reference.
pub struct Bridge {
    model: model::Client,
    tracker: TrackerClient,
    policy: Policy,
}

impl Bridge {
    pub fn new(model: model::Client, tracker: TrackerClient, policy: Policy) -> Self {
        Self { model, tracker, policy }
    }

    /// Decide and act on one request.
    pub async fn process(&self, request: &IncomingRequest) -> Result<RequestResult, EngineError> {
        match self.policy {
            Policy::Tools => self.dispatch_tools(request).await,
            Policy::Classify => self.classify_and_create(request).await,
        }
    }

    async fn dispatch_tools(&self, request: &IncomingRequest) -> Result<RequestResult, EngineError> {
        let prompt = UserPrompt {
            text: request.text_content.clone(),
            image_urls: request.image_urls.clone(),
        };
        let reply = self
            .model
            .complete_with_tools(SYSTEM_PROMPT, &prompt, &get_tool_definitions())
            .await?;

        let calls = match reply {
            Reply::Text(text) => {
                info!("Model declined to act");
                return Ok(RequestResult::refused(text));
            }
            Reply::ToolCalls(calls) => calls,
        };

        if calls.len() > 1 {
            warn!("Model made {} tool calls, only the first is executed", calls.len());
        }
        let Some(first) = calls.into_iter().next() else {
            return Ok(RequestResult::refused(""));
        };

        match ToolCall::decode(&first.name, &first.arguments) {
            Ok(call) => self.execute_tool(call, &request.image_urls).await,
            Err(e) => {
                warn!("Rejected tool call: {e}");
                Ok(RequestResult::refused(""))
            }
        }
    }

    /// Run a validated tool call against the tracker.
    async fn execute_tool(&self, call: ToolCall, image_urls: &[String]) -> Result<RequestResult, EngineError> {
        match call {
            ToolCall::CreateIssue { title, description } => {
                let created = self.tracker.create_issue(&title, &description, image_urls).await?;
                Ok(RequestResult::IssueCreated {
                    title,
                    description,
                    url: created.url,
                    number: created.number,
                })
            }
            ToolCall::AddComment { issue_number, body } => {
                let Some(issue) = self.tracker.fetch_issue(issue_number).await? else {
                    info!("Comment requested on missing issue #{issue_number}");
                    return Ok(RequestResult::refused(format!("issue #{issue_number} not found")));
                };
                let comment = self.tracker.add_comment(issue_number, &body, image_urls).await?;
                Ok(RequestResult::CommentAdded {
                    issue_title: issue.title,
                    url: comment.url,
                    issue_number,
                })
            }
        }
    }

    async fn classify_and_create(&self, request: &IncomingRequest) -> Result<RequestResult, EngineError> {
        let decision =
            classifier::classify(&request.text_content, request.image_urls.len(), &self.model).await?;

        match decision {
            Decision::Refuse { reason } => Ok(RequestResult::refused(reason)),
            Decision::Create { title, description } => {
                let created = self
                    .tracker
                    .create_issue(&title, &description, &request.image_urls)
                    .await?;
                Ok(RequestResult::IssueCreated {
                    title,
                    description,
                    url: created.url,
                    number: created.number,
                })
            }
        }
    }
}

const SYSTEM_PROMPT: &str = r#"You turn chat messages into GitHub issue tracker actions.

Tools:
- create_issue: the default for any actionable content (bug reports, feature requests, questions).
- add_comment: only when the user explicitly asks to add a comment to a numbered issue.

Rules:
- Write the title, description and comment body in the same language as the request.
- Use only what the user stated. Do not invent scope, sections, acceptance criteria or suggestions that are not in the input.
- Keep titles short and objective. Keep descriptions concise Markdown.
- Comment bodies describe work still to be done, phrased as actions (e.g. "add support for X"), not as a narration of events.
- If the content is off-topic or too vague to act on, do not call any tool. Reply with a short, polite explanation in the language of the request."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::RepoRef;
    use httpmock::prelude::*;
    use serde_json::json;

    fn bridge(model_server: &MockServer, github: &MockServer, policy: Policy) -> Bridge {
        let model = model::Client::new("sk-test".to_string(), &model_server.base_url(), "gpt-4o-mini".to_string());
        let tracker = TrackerClient::new(&github.base_url(), "ghp_test", RepoRef::parse("acme/widgets").unwrap()).unwrap();
        Bridge::new(model, tracker, policy)
    }

    fn tool_call_reply(name: &str, arguments: serde_json::Value) -> serde_json::Value {
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": name, "arguments": arguments.to_string()}
                    }]
                }
            }]
        })
    }

    fn text_reply(text: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
    }

    fn request(text: &str) -> IncomingRequest {
        IncomingRequest {
            text_content: text.to_string(),
            image_urls: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_issue_passes_tracker_values_through() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(tool_call_reply(
                "create_issue",
                json!({"title": "Crash on save", "description": "Saving crashes the app"}),
            ));
        });
        let create = github.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues");
            then.status(201).json_body(json!({
                "number": 314,
                "html_url": "https://github.com/acme/widgets/issues/314"
            }));
        });

        let result = bridge(&model_server, &github, Policy::Tools)
            .process(&request("the app crashes when I save"))
            .await
            .unwrap();

        assert_eq!(
            result,
            RequestResult::IssueCreated {
                title: "Crash on save".to_string(),
                description: "Saving crashes the app".to_string(),
                url: "https://github.com/acme/widgets/issues/314".to_string(),
                number: 314,
            }
        );
        create.assert();
    }

    #[tokio::test]
    async fn test_images_forwarded_to_model_and_issue() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        let model_mock = model_server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_includes("https://cdn.example/shot.png");
            then.status(200).json_body(tool_call_reply(
                "create_issue",
                json!({"title": "Broken layout", "description": "Header overlaps"}),
            ));
        });
        let create = github.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues").json_body(json!({
                "title": "Broken layout",
                "body": "Header overlaps\n\n![image](https://cdn.example/shot.png)"
            }));
            then.status(201).json_body(json!({"number": 1, "html_url": "https://github.com/acme/widgets/issues/1"}));
        });

        let req = IncomingRequest {
            text_content: "layout broken".to_string(),
            image_urls: vec!["https://cdn.example/shot.png".to_string()],
        };
        bridge(&model_server, &github, Policy::Tools).process(&req).await.unwrap();
        model_mock.assert();
        create.assert();
    }

    #[tokio::test]
    async fn test_comment_on_existing_issue() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(tool_call_reply(
                "add_comment",
                json!({"issueNumber": 12, "body": "add support for dark mode"}),
            ));
        });
        github.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/12");
            then.status(200).json_body(json!({
                "title": "Theming",
                "html_url": "https://github.com/acme/widgets/issues/12"
            }));
        });
        let comment = github.mock(|when, then| {
            when.method(POST)
                .path("/repos/acme/widgets/issues/12/comments")
                .json_body(json!({"body": "add support for dark mode"}));
            then.status(201).json_body(json!({
                "html_url": "https://github.com/acme/widgets/issues/12#issuecomment-9"
            }));
        });

        let result = bridge(&model_server, &github, Policy::Tools)
            .process(&request("comment on #12: we need dark mode"))
            .await
            .unwrap();

        assert_eq!(
            result,
            RequestResult::CommentAdded {
                issue_title: "Theming".to_string(),
                url: "https://github.com/acme/widgets/issues/12#issuecomment-9".to_string(),
                issue_number: 12,
            }
        );
        comment.assert();
    }

    #[tokio::test]
    async fn test_comment_on_missing_issue_refuses_without_post() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(tool_call_reply(
                "add_comment",
                json!({"issueNumber": 9876, "body": "add logs"}),
            ));
        });
        github.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/9876");
            then.status(404).json_body(json!({"message": "Not Found"}));
        });
        let comment = github.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues/9876/comments");
            then.status(201).json_body(json!({"html_url": "unused"}));
        });

        let result = bridge(&model_server, &github, Policy::Tools)
            .process(&request("add a comment to #9876"))
            .await
            .unwrap();

        match result {
            RequestResult::Refused { reason } => assert!(reason.contains("9876")),
            other => panic!("expected refusal, got {other:?}"),
        }
        comment.assert_calls(0);
    }

    #[tokio::test]
    async fn test_text_reply_becomes_refusal() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(text_reply("This is not about the project."));
        });

        let result = bridge(&model_server, &github, Policy::Tools)
            .process(&request("what's the weather?"))
            .await
            .unwrap();
        assert_eq!(
            result,
            RequestResult::Refused {
                reason: "This is not about the project.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_text_reply_uses_fallback() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(text_reply("   "));
        });

        let result = bridge(&model_server, &github, Policy::Tools)
            .process(&request("hm"))
            .await
            .unwrap();
        assert_eq!(
            result,
            RequestResult::Refused {
                reason: FALLBACK_REFUSAL.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_tool_arguments_are_not_executed() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(tool_call_reply("create_issue", json!({"title": "no body"})));
        });
        let create = github.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues");
            then.status(201).json_body(json!({"number": 1, "html_url": "unused"}));
        });

        let result = bridge(&model_server, &github, Policy::Tools)
            .process(&request("something"))
            .await
            .unwrap();
        assert_eq!(
            result,
            RequestResult::Refused {
                reason: FALLBACK_REFUSAL.to_string()
            }
        );
        create.assert_calls(0);
    }

    #[tokio::test]
    async fn test_tracker_failure_propagates() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(tool_call_reply(
                "create_issue",
                json!({"title": "t", "description": "d"}),
            ));
        });
        github.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues");
            then.status(502).body("bad gateway");
        });

        let err = bridge(&model_server, &github, Policy::Tools)
            .process(&request("bug"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Tracker(_)));
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500).body("overloaded");
        });

        let err = bridge(&model_server, &github, Policy::Tools)
            .process(&request("bug"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Model(_)));
    }

    #[tokio::test]
    async fn test_classify_policy_creates_issue() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .json_body_includes(json!({"response_format": {"type": "json_schema"}}).to_string());
            then.status(200).json_body(text_reply(
                &json!({
                    "action": "create",
                    "title": "Export to CSV",
                    "description": "Allow exporting reports as CSV",
                    "refusalReason": null
                })
                .to_string(),
            ));
        });
        github.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues");
            then.status(201).json_body(json!({"number": 5, "html_url": "https://github.com/acme/widgets/issues/5"}));
        });

        let result = bridge(&model_server, &github, Policy::Classify)
            .process(&request("we need csv export"))
            .await
            .unwrap();
        assert_eq!(
            result,
            RequestResult::IssueCreated {
                title: "Export to CSV".to_string(),
                description: "Allow exporting reports as CSV".to_string(),
                url: "https://github.com/acme/widgets/issues/5".to_string(),
                number: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_classify_policy_refusal_has_no_side_effect() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(text_reply(
                &json!({"action": "refuse", "title": null, "description": null, "refusalReason": "Off topic."})
                    .to_string(),
            ));
        });
        let create = github.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues");
            then.status(201).json_body(json!({"number": 1, "html_url": "unused"}));
        });

        let result = bridge(&model_server, &github, Policy::Classify)
            .process(&request("lunch?"))
            .await
            .unwrap();
        assert_eq!(result, RequestResult::Refused { reason: "Off topic.".to_string() });
        create.assert_calls(0);
    }

    #[tokio::test]
    async fn test_classify_policy_without_content_uses_fallback() {
        let model_server = MockServer::start();
        let github = MockServer::start();
        model_server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": null, "refusal": "I can't help with that"}}]
            }));
        });
        let create = github.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues");
            then.status(201).json_body(json!({"number": 1, "html_url": "unused"}));
        });

        let result = bridge(&model_server, &github, Policy::Classify)
            .process(&request("make it better"))
            .await
            .unwrap();
        assert_eq!(result, RequestResult::Refused { reason: FALLBACK_REFUSAL.to_string() });
        create.assert_calls(0);
    }
}
