//! Viewer-dependent rendering of stored rows into API views. Soft-delete
//! semantics live here: a per-viewer delete hides the text for that viewer
//! only, the global tombstone substitutes the placeholder for everyone.

use anyhow::Result;
use uuid::Uuid;

use reunite_db::Database;
use reunite_db::models::MessageContextRow;
use reunite_types::api::{
    AttachmentView, ChatMessageView, ChatroomMessageView, ConversationView, NotificationView,
    ParticipantView, ReplyPreview, SenderRole, UserSummary,
};
use reunite_types::models::{
    Attachment, ChatMessage, ChatroomMessage, Conversation, Notification, User,
    DELETED_PLACEHOLDER,
};

use crate::CoreError;

pub(crate) fn summary(user: &User) -> UserSummary {
    UserSummary {
        id: user.id,
        username: user.username.clone(),
        display_name: user.display_name.clone(),
    }
}

pub(crate) fn summary_for(db: &Database, id: Uuid) -> Result<Option<UserSummary>> {
    Ok(db.get_user(id)?.map(|u| summary(&u)))
}

fn attachment_view(attachment: &Attachment) -> AttachmentView {
    AttachmentView {
        kind: attachment.kind,
        name: attachment.name.clone(),
        size: attachment.size,
        storage_ref: attachment.storage_ref.clone(),
    }
}

/// (rendered text, is_deleted_for_me) for one viewer.
fn rendered_text(
    text: &str,
    is_deleted: bool,
    deleted_for: &[Uuid],
    viewer: Uuid,
) -> (Option<String>, bool) {
    if deleted_for.contains(&viewer) {
        (None, true)
    } else if is_deleted {
        (Some(DELETED_PLACEHOLDER.to_string()), false)
    } else {
        (Some(text.to_string()), false)
    }
}

/// Preview of a reply target; the placeholder replaces the original text
/// when the target was deleted for everyone.
fn reply_preview(
    id: Uuid,
    text: &str,
    is_deleted: bool,
    sender: Option<UserSummary>,
) -> ReplyPreview {
    ReplyPreview {
        id,
        text: Some(if is_deleted {
            DELETED_PLACEHOLDER.to_string()
        } else {
            text.to_string()
        }),
        sender,
    }
}

fn context_reply_preview(ctx: &MessageContextRow) -> Result<Option<ReplyPreview>> {
    let Some(reply_id) = ctx.message.reply_to.as_deref() else {
        return Ok(None);
    };
    let sender = match (ctx.reply_sender_id.as_deref(), ctx.reply_sender_username.clone()) {
        (Some(id), Some(username)) => Some(UserSummary {
            id: id
                .parse()
                .map_err(|e| anyhow::anyhow!("corrupt uuid '{}': {}", id, e))?,
            username,
            display_name: ctx.reply_sender_display_name.clone(),
        }),
        _ => None,
    };
    Ok(Some(reply_preview(
        reply_id
            .parse()
            .map_err(|e| anyhow::anyhow!("corrupt uuid '{}': {}", reply_id, e))?,
        ctx.reply_text.as_deref().unwrap_or_default(),
        ctx.reply_is_deleted,
        sender,
    )))
}

fn context_sender(ctx: &MessageContextRow) -> Result<Option<UserSummary>> {
    Ok(match ctx.sender_username.clone() {
        Some(username) => Some(UserSummary {
            id: ctx
                .message
                .sender_id
                .parse()
                .map_err(|e| anyhow::anyhow!("corrupt uuid '{}': {}", ctx.message.sender_id, e))?,
            username,
            display_name: ctx.sender_display_name.clone(),
        }),
        None => None,
    })
}

pub(crate) fn chat_message_view_from_context(
    conversation: &Conversation,
    ctx: MessageContextRow,
    viewer: Uuid,
) -> Result<ChatMessageView> {
    let sender = context_sender(&ctx)?;
    let reply_to = context_reply_preview(&ctx)?;
    let msg = ctx.message.into_chat_message()?;
    let (text, is_deleted_for_me) =
        rendered_text(&msg.text, msg.is_deleted, &msg.deleted_for, viewer);
    Ok(ChatMessageView {
        id: msg.id,
        conversation_id: msg.conversation_id,
        sender,
        sender_role: sender_role(conversation, msg.sender_id),
        text,
        reply_to,
        attachment: msg.attachment.as_ref().map(attachment_view),
        is_deleted: msg.is_deleted,
        is_deleted_for_me,
        is_system: msg.is_system,
        created_at: msg.created_at,
    })
}

pub(crate) fn room_message_view_from_context(
    ctx: MessageContextRow,
    viewer: Uuid,
) -> Result<ChatroomMessageView> {
    let sender = context_sender(&ctx)?;
    let reply_to = context_reply_preview(&ctx)?;
    let msg = ctx.message.into_room_message()?;
    let (text, is_deleted_for_me) =
        rendered_text(&msg.text, msg.is_deleted, &msg.deleted_for, viewer);
    Ok(ChatroomMessageView {
        id: msg.id,
        chatroom_id: msg.chatroom_id,
        sender,
        text,
        reply_to,
        attachment: msg.attachment.as_ref().map(attachment_view),
        is_deleted: msg.is_deleted,
        is_deleted_for_me,
        is_system: msg.is_system,
        created_at: msg.created_at,
    })
}

/// Render one conversation message without a pre-joined context row; the
/// reply target and sender are fetched individually.
pub(crate) fn chat_message_view(
    db: &Database,
    conversation: &Conversation,
    msg: &ChatMessage,
    viewer: Uuid,
) -> Result<ChatMessageView, CoreError> {
    let sender = summary_for(db, msg.sender_id)?;
    let reply_to = match msg.reply_to {
        Some(reply_id) => db
            .get_chat_message(conversation.id, reply_id)?
            .map(|target| -> Result<ReplyPreview> {
                Ok(reply_preview(
                    target.id,
                    &target.text,
                    target.is_deleted,
                    summary_for(db, target.sender_id)?,
                ))
            })
            .transpose()?,
        None => None,
    };
    let (text, is_deleted_for_me) =
        rendered_text(&msg.text, msg.is_deleted, &msg.deleted_for, viewer);
    Ok(ChatMessageView {
        id: msg.id,
        conversation_id: msg.conversation_id,
        sender,
        sender_role: sender_role(conversation, msg.sender_id),
        text,
        reply_to,
        attachment: msg.attachment.as_ref().map(attachment_view),
        is_deleted: msg.is_deleted,
        is_deleted_for_me,
        is_system: msg.is_system,
        created_at: msg.created_at,
    })
}

pub(crate) fn room_message_view(
    db: &Database,
    msg: &ChatroomMessage,
    viewer: Uuid,
) -> Result<ChatroomMessageView, CoreError> {
    let sender = summary_for(db, msg.sender_id)?;
    let reply_to = match msg.reply_to {
        Some(reply_id) => db
            .get_room_message(msg.chatroom_id, reply_id)?
            .map(|target| -> Result<ReplyPreview> {
                Ok(reply_preview(
                    target.id,
                    &target.text,
                    target.is_deleted,
                    summary_for(db, target.sender_id)?,
                ))
            })
            .transpose()?,
        None => None,
    };
    let (text, is_deleted_for_me) =
        rendered_text(&msg.text, msg.is_deleted, &msg.deleted_for, viewer);
    Ok(ChatroomMessageView {
        id: msg.id,
        chatroom_id: msg.chatroom_id,
        sender,
        text,
        reply_to,
        attachment: msg.attachment.as_ref().map(attachment_view),
        is_deleted: msg.is_deleted,
        is_deleted_for_me,
        is_system: msg.is_system,
        created_at: msg.created_at,
    })
}

fn sender_role(conversation: &Conversation, sender_id: Uuid) -> SenderRole {
    if sender_id == conversation.user_id {
        SenderRole::User
    } else {
        SenderRole::Admin
    }
}

pub(crate) fn conversation_view(
    db: &Database,
    conversation: &Conversation,
) -> Result<ConversationView, CoreError> {
    let user = summary_for(db, conversation.user_id)?.ok_or_else(|| {
        anyhow::anyhow!("conversation {} owner missing from users", conversation.id)
    })?;
    let admin = match conversation.admin_id {
        Some(id) => summary_for(db, id)?,
        None => None,
    };
    Ok(ConversationView {
        id: conversation.id,
        user,
        admin,
        pet_kind: conversation.pet_kind,
        pet_unique_id: conversation.pet_unique_id.clone(),
        pet_name: conversation.pet_name.clone(),
        reason: conversation.reason.clone(),
        status: conversation.status,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
    })
}

pub(crate) fn participant_view(
    participant: &reunite_types::models::ChatroomParticipant,
    user: &User,
) -> ParticipantView {
    ParticipantView {
        id: participant.id,
        chatroom_id: participant.chatroom_id,
        user: summary(user),
        role: participant.role,
        joined_at: participant.joined_at,
        is_active: participant.is_active,
    }
}

pub(crate) fn notification_view(
    notification: &Notification,
    from_user: Option<UserSummary>,
) -> NotificationView {
    NotificationView {
        id: notification.id,
        kind: notification.kind,
        title: notification.title.clone(),
        message: notification.message.clone(),
        from_user,
        conversation_id: notification.conversation_id,
        access_request_id: notification.access_request_id,
        is_read: notification.is_read,
        created_at: notification.created_at,
    }
}
