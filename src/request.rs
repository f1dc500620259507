//! Building an `IncomingRequest` from what a chat event carries.

use crate::engine::IncomingRequest;

/// The parts of a chat attachment the bot looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub url: String,
    pub content_type: Option<String>,
}

pub fn is_image(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with("image/"))
}

/// Remove `<@id>` / `<@!id>` mentions of the bot and trim what is left.
pub fn strip_mentions(content: &str, bot_id: u64) -> String {
    content
        .replace(&format!("<@{bot_id}>"), "")
        .replace(&format!("<@!{bot_id}>"), "")
        .trim()
        .to_string()
}

/// Text sent to the engine for a mention. `None` means there is nothing to
/// act on and the event is dropped without a reply.
pub fn assemble_content(referenced: Option<&str>, note: &str) -> Option<String> {
    let note = note.trim();
    match referenced {
        Some(original) if note.is_empty() => Some(format!("original message: {original}")),
        Some(original) => Some(format!("original message: {original}\nuser note: {note}")),
        None if note.is_empty() => None,
        None => Some(note.to_string()),
    }
}

/// Image URLs from the replied-to message first, then from the mention itself.
pub fn collect_image_urls(referenced: &[AttachmentInfo], own: &[AttachmentInfo]) -> Vec<String> {
    referenced
        .iter()
        .chain(own)
        .filter(|a| is_image(a.content_type.as_deref()))
        .map(|a| a.url.clone())
        .collect()
}

/// Request for a bot mention. `referenced` is the replied-to message's text
/// and attachments, or `None` when the mention is not a reply or the
/// replied-to message could not be fetched.
pub fn message_request(
    referenced: Option<(&str, &[AttachmentInfo])>,
    note: &str,
    own_attachments: &[AttachmentInfo],
) -> Option<IncomingRequest> {
    let text_content = assemble_content(referenced.map(|(text, _)| text), note)?;
    let referenced_attachments = referenced.map(|(_, a)| a).unwrap_or_default();
    Some(IncomingRequest {
        text_content,
        image_urls: collect_image_urls(referenced_attachments, own_attachments),
    })
}

/// Request for the `/create-issue` command.
pub fn command_request(description: &str, image: Option<&AttachmentInfo>) -> IncomingRequest {
    IncomingRequest {
        text_content: description.to_string(),
        image_urls: image
            .filter(|a| is_image(a.content_type.as_deref()))
            .map(|a| vec![a.url.clone()])
            .unwrap_or_default(),
    }
}
