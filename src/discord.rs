//! Discord event handler using serenity.

use std::sync::{Arc, OnceLock};

use serenity::async_trait;
use serenity::builder::{
    CreateAllowedMentions, CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter,
    CreateMessage, EditInteractionResponse,
};
use serenity::model::application::{
    Command, CommandInteraction, CommandOptionType, Interaction, ResolvedValue,
};
use serenity::model::channel::{Attachment, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::prelude::*;
use tracing::{debug, error, info, warn};

use crate::engine::{Bridge, IncomingRequest};
use crate::render::{render, render_failure, EmbedView, Rendered};
use crate::request::{command_request, message_request, strip_mentions, AttachmentInfo};

pub const COMMAND_NAME: &str = "create-issue";

impl From<&Attachment> for AttachmentInfo {
    fn from(a: &Attachment) -> Self {
        Self {
            url: a.url.clone(),
            content_type: a.content_type.clone(),
        }
    }
}

fn attachments(message: &Message) -> Vec<AttachmentInfo> {
    message.attachments.iter().map(AttachmentInfo::from).collect()
}

fn create_embed(view: EmbedView) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(view.title)
        .url(view.url)
        .colour(view.colour)
        .footer(CreateEmbedFooter::new(view.footer));
    if let Some(description) = view.description {
        embed = embed.description(description);
    }
    embed
}

/// Reply to `msg` without pinging its author.
fn reply_to(msg: &Message, rendered: Rendered) -> CreateMessage {
    let builder = CreateMessage::new()
        .reference_message(msg)
        .allowed_mentions(CreateAllowedMentions::new().replied_user(false));
    match rendered {
        Rendered::Embed(view) => builder.embed(create_embed(view)),
        Rendered::Text(text) => builder.content(text),
    }
}

fn edit_response(rendered: Rendered) -> EditInteractionResponse {
    match rendered {
        Rendered::Embed(view) => EditInteractionResponse::new().embed(create_embed(view)),
        Rendered::Text(text) => EditInteractionResponse::new().content(text),
    }
}

fn create_issue_command() -> CreateCommand {
    CreateCommand::new(COMMAND_NAME)
        .description("Create a GitHub issue from a description")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "description",
                "Describe the problem or feature",
            )
            .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Attachment,
            "image",
            "Optional image to attach to the issue",
        ))
}

pub struct Handler {
    bridge: Arc<Bridge>,
    bot_id: OnceLock<UserId>,
}

impl Handler {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            bot_id: OnceLock::new(),
        }
    }

    async fn run(&self, request: &IncomingRequest) -> Rendered {
        match self.bridge.process(request).await {
            Ok(result) => {
                info!("Request handled: {:?}", result);
                render(&result)
            }
            Err(e) => {
                error!("Request failed: {e}");
                render_failure()
            }
        }
    }

    /// Build and answer a mention. `None` when there is nothing to act on,
    /// in which case `on_start` never runs and nothing is sent upstream.
    async fn answer_mention(
        &self,
        referenced: Option<(&str, &[AttachmentInfo])>,
        note: &str,
        own: &[AttachmentInfo],
        on_start: impl Future<Output = ()>,
    ) -> Option<Rendered> {
        let request = message_request(referenced, note, own)?;
        info!("📨 Mention with {} image(s)", request.image_urls.len());
        on_start.await;
        Some(self.run(&request).await)
    }

    /// The message `msg` replies to. A failed fetch degrades to `None`.
    async fn referenced_message(&self, ctx: &Context, msg: &Message) -> Option<Message> {
        if let Some(referenced) = &msg.referenced_message {
            return Some((**referenced).clone());
        }
        let reference = msg.message_reference.as_ref()?;
        let message_id = reference.message_id?;
        match reference.channel_id.message(&ctx.http, message_id).await {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Failed to fetch replied-to message {message_id}: {e}");
                None
            }
        }
    }

    async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) {
        if let Err(e) = command.defer(ctx).await {
            warn!("Failed to defer /{COMMAND_NAME}: {e}");
            return;
        }

        let mut description = "";
        let mut image = None;
        for option in command.data.options() {
            match (option.name, option.value) {
                ("description", ResolvedValue::String(value)) => description = value,
                ("image", ResolvedValue::Attachment(attachment)) => {
                    image = Some(AttachmentInfo::from(attachment))
                }
                _ => {}
            }
        }

        info!("📨 /{COMMAND_NAME} from {}", command.user.name);
        let request = command_request(description, image.as_ref());
        let rendered = self.run(&request).await;

        if let Err(e) = command.edit_response(ctx, edit_response(rendered)).await {
            warn!("Failed to answer /{COMMAND_NAME}: {e}");
            if let Err(e) = command.edit_response(ctx, edit_response(render_failure())).await {
                warn!("Failed to send failure message: {e}");
            }
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(bot_id) = self.bot_id.get().copied() else {
            return;
        };
        if !msg.mentions_user_id(bot_id) {
            return;
        }

        let note = strip_mentions(&msg.content, bot_id.get());
        let referenced = if msg.message_reference.is_some() {
            self.referenced_message(&ctx, &msg).await
        } else {
            None
        };
        let referenced_attachments = referenced.as_ref().map(attachments).unwrap_or_default();
        let own_attachments = attachments(&msg);

        let typing = async {
            if let Err(e) = msg.channel_id.broadcast_typing(&ctx.http).await {
                debug!("Failed to send typing indicator: {e}");
            }
        };
        let Some(rendered) = self
            .answer_mention(
                referenced
                    .as_ref()
                    .map(|m| (m.content.as_str(), referenced_attachments.as_slice())),
                &note,
                &own_attachments,
                typing,
            )
            .await
        else {
            debug!("Ignoring bare mention from {}", msg.author.name);
            return;
        };

        if let Err(e) = msg.channel_id.send_message(&ctx, reply_to(&msg, rendered)).await {
            warn!("Failed to reply: {e}");
            if let Err(e) = msg.channel_id.send_message(&ctx, reply_to(&msg, render_failure())).await {
                warn!("Failed to send failure message: {e}");
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if command.data.name != COMMAND_NAME {
            return;
        }
        self.handle_command(&ctx, &command).await;
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Bot connected as {}", ready.user.name);
        if self.bot_id.set(ready.user.id).is_err() {
            debug!("Bot id already known, reconnect");
        }

        match Command::set_global_commands(&ctx.http, vec![create_issue_command()]).await {
            Ok(_) => info!("Slash commands registered"),
            Err(e) => error!("Failed to register slash commands: {e}"),
        }
    }
}
