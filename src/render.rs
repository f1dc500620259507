//! How a `RequestResult` is shown to the user.

use crate::engine::RequestResult;

/// Shown for any failure that is not a refusal.
pub const FAILURE_MESSAGE: &str = "could not process the request, try again.";

const PREVIEW_CHARS: usize = 300;
/// Discord rejects message content longer than this.
const MESSAGE_LIMIT: usize = 2000;
const CREATED_COLOUR: u32 = 0x2da44e;
const COMMENTED_COLOUR: u32 = 0x0969da;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedView {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub colour: u32,
    pub footer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Embed(EmbedView),
    Text(String),
}

/// First 300 characters followed by "..." when the description is longer.
pub fn preview(description: &str) -> String {
    clip(description, PREVIEW_CHARS)
}

/// The first `max` characters followed by "..." when `text` is longer.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max).collect();
    format!("{truncated}...")
}

fn fit_message(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text.to_string();
    }
    clip(text, MESSAGE_LIMIT - 3)
}

pub fn render(result: &RequestResult) -> Rendered {
    match result {
        RequestResult::IssueCreated {
            title,
            description,
            url,
            number,
        } => Rendered::Embed(EmbedView {
            title: title.clone(),
            description: Some(preview(description)),
            url: url.clone(),
            colour: CREATED_COLOUR,
            footer: format!("Issue #{number}"),
        }),
        RequestResult::CommentAdded {
            issue_title,
            url,
            issue_number,
        } => Rendered::Embed(EmbedView {
            title: issue_title.clone(),
            description: None,
            url: url.clone(),
            colour: COMMENTED_COLOUR,
            footer: format!("Comment on issue #{issue_number}"),
        }),
        RequestResult::Refused { reason } => Rendered::Text(fit_message(reason)),
    }
}

pub fn render_failure() -> Rendered {
    Rendered::Text(FAILURE_MESSAGE.to_string())
}
