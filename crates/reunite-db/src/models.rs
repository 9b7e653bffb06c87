//! Database row types, distinct from the API models in reunite-types.
//! Both message tables share one row shape; `parent_id` is the owning
//! conversation or chatroom depending on the table queried.

use anyhow::Result;
use uuid::Uuid;

use reunite_types::models::{
    Attachment, AttachmentKind, ChatMessage, Chatroom, ChatroomAccessRequest, ChatroomMessage,
    ChatroomParticipant, Conversation, ConversationStatus, Notification, NotificationKind,
    ParticipantRole, PetKind, RequestStatus, RequestType, User,
};

use crate::{parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub is_staff: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn into_model(self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            username: self.username,
            display_name: self.display_name,
            is_staff: self.is_staff,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub admin_id: Option<String>,
    pub pet_kind: Option<String>,
    pub pet_unique_id: Option<String>,
    pub pet_name: Option<String>,
    pub reason: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRow {
    pub fn into_model(self) -> Result<Conversation> {
        Ok(Conversation {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            admin_id: parse_opt_uuid(self.admin_id.as_deref())?,
            pet_kind: parse_pet_kind(self.pet_kind.as_deref())?,
            pet_unique_id: self.pet_unique_id,
            pet_name: self.pet_name,
            reason: self.reason,
            status: ConversationStatus::from_str(&self.status)
                .ok_or_else(|| anyhow::anyhow!("unknown conversation status '{}'", self.status))?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub parent_id: String,
    pub sender_id: String,
    pub text: String,
    pub reply_to: Option<String>,
    pub attachment_kind: Option<String>,
    pub attachment_name: Option<String>,
    pub attachment_size: Option<i64>,
    pub attachment_ref: Option<String>,
    pub is_deleted: bool,
    pub deleted_for: String,
    pub is_system: bool,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_chat_message(self) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: parse_uuid(&self.id)?,
            conversation_id: parse_uuid(&self.parent_id)?,
            sender_id: parse_uuid(&self.sender_id)?,
            reply_to: parse_opt_uuid(self.reply_to.as_deref())?,
            attachment: parse_attachment(
                self.attachment_kind.as_deref(),
                self.attachment_name.as_deref(),
                self.attachment_size,
                self.attachment_ref.as_deref(),
            )?,
            is_deleted: self.is_deleted,
            deleted_for: parse_deleted_for(&self.deleted_for)?,
            is_system: self.is_system,
            created_at: parse_ts(&self.created_at)?,
            text: self.text,
        })
    }

    pub fn into_room_message(self) -> Result<ChatroomMessage> {
        Ok(ChatroomMessage {
            id: parse_uuid(&self.id)?,
            chatroom_id: parse_uuid(&self.parent_id)?,
            sender_id: parse_uuid(&self.sender_id)?,
            reply_to: parse_opt_uuid(self.reply_to.as_deref())?,
            attachment: parse_attachment(
                self.attachment_kind.as_deref(),
                self.attachment_name.as_deref(),
                self.attachment_size,
                self.attachment_ref.as_deref(),
            )?,
            is_deleted: self.is_deleted,
            deleted_for: parse_deleted_for(&self.deleted_for)?,
            is_system: self.is_system,
            created_at: parse_ts(&self.created_at)?,
            text: self.text,
        })
    }
}

/// Message plus the joined context needed to render it for a viewer: the
/// sender's names and, when `reply_to` is set, enough of the target to build
/// a preview.
pub struct MessageContextRow {
    pub message: MessageRow,
    pub sender_username: Option<String>,
    pub sender_display_name: Option<String>,
    pub reply_text: Option<String>,
    pub reply_is_deleted: bool,
    pub reply_sender_id: Option<String>,
    pub reply_sender_username: Option<String>,
    pub reply_sender_display_name: Option<String>,
}

pub struct ChatroomRow {
    pub id: String,
    pub name: String,
    pub conversation_id: Option<String>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<String>,
    pub pet_name: Option<String>,
    pub purpose: String,
    pub created_by: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ChatroomRow {
    pub fn into_model(self) -> Result<Chatroom> {
        Ok(Chatroom {
            id: parse_uuid(&self.id)?,
            name: self.name,
            conversation_id: parse_opt_uuid(self.conversation_id.as_deref())?,
            pet_unique_id: self.pet_unique_id,
            pet_kind: parse_pet_kind(self.pet_kind.as_deref())?,
            pet_name: self.pet_name,
            purpose: self.purpose,
            created_by: parse_opt_uuid(self.created_by.as_deref())?,
            is_active: self.is_active,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct ParticipantRow {
    pub id: String,
    pub chatroom_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
    pub is_active: bool,
}

impl ParticipantRow {
    pub fn into_model(self) -> Result<ChatroomParticipant> {
        Ok(ChatroomParticipant {
            id: parse_uuid(&self.id)?,
            chatroom_id: parse_uuid(&self.chatroom_id)?,
            user_id: parse_uuid(&self.user_id)?,
            role: ParticipantRole::from_str(&self.role)
                .ok_or_else(|| anyhow::anyhow!("unknown participant role '{}'", self.role))?,
            joined_at: parse_ts(&self.joined_at)?,
            is_active: self.is_active,
        })
    }
}

pub struct AccessRequestRow {
    pub id: String,
    pub chatroom_id: Option<String>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<String>,
    pub pet_name: Option<String>,
    pub requested_user_id: String,
    pub added_by_id: String,
    pub conversation_id: Option<String>,
    pub role: String,
    pub request_type: String,
    pub status: String,
    pub created_at: String,
    pub responded_at: Option<String>,
}

impl AccessRequestRow {
    pub fn into_model(self) -> Result<ChatroomAccessRequest> {
        Ok(ChatroomAccessRequest {
            id: parse_uuid(&self.id)?,
            chatroom_id: parse_opt_uuid(self.chatroom_id.as_deref())?,
            pet_unique_id: self.pet_unique_id,
            pet_kind: parse_pet_kind(self.pet_kind.as_deref())?,
            pet_name: self.pet_name,
            requested_user_id: parse_uuid(&self.requested_user_id)?,
            added_by_id: parse_uuid(&self.added_by_id)?,
            conversation_id: parse_opt_uuid(self.conversation_id.as_deref())?,
            role: ParticipantRole::from_str(&self.role)
                .ok_or_else(|| anyhow::anyhow!("unknown participant role '{}'", self.role))?,
            request_type: RequestType::from_str(&self.request_type)
                .ok_or_else(|| anyhow::anyhow!("unknown request type '{}'", self.request_type))?,
            status: RequestStatus::from_str(&self.status)
                .ok_or_else(|| anyhow::anyhow!("unknown request status '{}'", self.status))?,
            created_at: parse_ts(&self.created_at)?,
            responded_at: parse_opt_ts(self.responded_at.as_deref())?,
        })
    }
}

pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub from_user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub access_request_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn into_model(self) -> Result<Notification> {
        Ok(Notification {
            id: parse_uuid(&self.id)?,
            recipient_id: parse_uuid(&self.recipient_id)?,
            kind: NotificationKind::from_str(&self.kind)
                .ok_or_else(|| anyhow::anyhow!("unknown notification kind '{}'", self.kind))?,
            title: self.title,
            message: self.message,
            from_user_id: parse_opt_uuid(self.from_user_id.as_deref())?,
            conversation_id: parse_opt_uuid(self.conversation_id.as_deref())?,
            access_request_id: parse_opt_uuid(self.access_request_id.as_deref())?,
            is_read: self.is_read,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

fn parse_pet_kind(s: Option<&str>) -> Result<Option<PetKind>> {
    match s {
        None => Ok(None),
        Some(raw) => PetKind::from_str(raw)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("unknown pet kind '{}'", raw)),
    }
}

fn parse_attachment(
    kind: Option<&str>,
    name: Option<&str>,
    size: Option<i64>,
    storage_ref: Option<&str>,
) -> Result<Option<Attachment>> {
    let Some(kind) = kind else { return Ok(None) };
    let kind = AttachmentKind::from_str(kind)
        .ok_or_else(|| anyhow::anyhow!("unknown attachment kind '{}'", kind))?;
    Ok(Some(Attachment {
        kind,
        name: name.unwrap_or_default().to_string(),
        size: size.unwrap_or(0),
        storage_ref: storage_ref.unwrap_or_default().to_string(),
    }))
}

pub(crate) fn parse_deleted_for(raw: &str) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("corrupt deleted_for '{}': {}", raw, e))?;
    ids.iter().map(|s| parse_uuid(s)).collect()
}

pub(crate) fn encode_deleted_for(ids: &[Uuid]) -> String {
    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
}
