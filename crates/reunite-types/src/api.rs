use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Actor, AttachmentKind, ConversationStatus, NotificationKind, ParticipantRole, PetKind,
    RequestStatus, RequestType,
};

// -- JWT Claims --

/// Claims carried by the caller's token, shared by the REST middleware and
/// the WebSocket upgrade. Issuance happens in the external auth service;
/// this side only validates and converts to an [`Actor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(default)]
    pub is_staff: bool,
    pub exp: usize,
}

impl Claims {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.sub,
            username: self.username.clone(),
            is_staff: self.is_staff,
        }
    }
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub pet_kind: Option<PetKind>,
    pub pet_unique_id: Option<String>,
    pub pet_name: Option<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateConversationStatusRequest {
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub user: UserSummary,
    pub admin: Option<UserSummary>,
    pub pet_kind: Option<PetKind>,
    pub pet_unique_id: Option<String>,
    pub pet_name: Option<String>,
    pub reason: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Messages --

/// Shared create payload for conversation and room messages. The attachment
/// blob is uploaded to the storage collaborator first; only its descriptor
/// arrives here.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    pub reply_to_message_id: Option<Uuid>,
    pub attachment: Option<AttachmentUpload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentUpload {
    pub kind: AttachmentKind,
    pub name: String,
    pub size: i64,
    pub storage_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
}

/// Preview of the replied-to message. Carries the placeholder instead of the
/// original text when the target was deleted for everyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: Uuid,
    pub text: Option<String>,
    pub sender: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentView {
    pub kind: AttachmentKind,
    pub name: String,
    pub size: i64,
    pub storage_ref: String,
}

/// A conversation message as rendered for one specific viewer:
/// `text` is None when the viewer deleted it for themselves, the placeholder
/// when it was deleted for everyone, the original otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Option<UserSummary>,
    pub sender_role: SenderRole,
    pub text: Option<String>,
    pub reply_to: Option<ReplyPreview>,
    pub attachment: Option<AttachmentView>,
    pub is_deleted: bool,
    pub is_deleted_for_me: bool,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

/// Which side of the 1:1 conversation sent a message, for UI alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatroomMessageView {
    pub id: Uuid,
    pub chatroom_id: Uuid,
    pub sender: Option<UserSummary>,
    pub text: Option<String>,
    pub reply_to: Option<ReplyPreview>,
    pub attachment: Option<AttachmentView>,
    pub is_deleted: bool,
    pub is_deleted_for_me: bool,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

// -- Chatrooms --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatroomView {
    pub id: Uuid,
    pub name: String,
    pub conversation_id: Option<Uuid>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<PetKind>,
    pub pet_name: Option<String>,
    pub purpose: String,
    pub created_by: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: Uuid,
    pub chatroom_id: Uuid,
    pub user: UserSummary,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
}

// -- Access requests --

/// Staff invitation payload. With `chatroom_id` set this is a join request
/// for an existing room; without it, a creation request for the pet case.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateInvitationRequest {
    pub user_id: Uuid,
    pub chatroom_id: Option<Uuid>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<PetKind>,
    pub pet_name: Option<String>,
    pub conversation_id: Option<Uuid>,
    #[serde(default = "default_invite_role")]
    pub role: ParticipantRole,
}

fn default_invite_role() -> ParticipantRole {
    ParticipantRole::RequestedUser
}

/// Direct-add fast path: same fields as an invitation, but the participant
/// materializes immediately with no pending round-trip.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectAddRequest {
    pub user_id: Uuid,
    pub chatroom_id: Option<Uuid>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<PetKind>,
    pub pet_name: Option<String>,
    pub conversation_id: Option<Uuid>,
    #[serde(default = "default_invite_role")]
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRequestView {
    pub id: Uuid,
    pub chatroom_id: Option<Uuid>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<PetKind>,
    pub pet_name: Option<String>,
    pub requested_user: UserSummary,
    pub added_by: UserSummary,
    pub conversation_id: Option<Uuid>,
    pub role: ParticipantRole,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub from_user: Option<UserSummary>,
    pub conversation_id: Option<Uuid>,
    pub access_request_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
