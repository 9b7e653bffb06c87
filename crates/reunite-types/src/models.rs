use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder shown to every viewer in place of a globally deleted message.
pub const DELETED_PLACEHOLDER: &str = "Message deleted";

/// The resolved caller identity handed into every engine operation.
/// Staff-ness is decided once by the authorization layer; engines never
/// re-derive it from profile lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
    pub is_staff: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name used in system messages and notification texts.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetKind {
    Lost,
    Found,
    Adoption,
}

impl PetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lost => "lost",
            Self::Found => "found",
            Self::Adoption => "adoption",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "lost" => Some(Self::Lost),
            "found" => Some(Self::Found),
            "adoption" => Some(Self::Adoption),
            _ => None,
        }
    }

    /// Capitalized form used when deriving chatroom names.
    pub fn capitalized(&self) -> &'static str {
        match self {
            Self::Lost => "Lost",
            Self::Found => "Found",
            Self::Adoption => "Adoption",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Requested,
    PendingUser,
    Active,
    ReadOnly,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::PendingUser => "pending_user",
            Self::Active => "active",
            Self::ReadOnly => "read_only",
            Self::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested),
            "pending_user" => Some(Self::PendingUser),
            "active" => Some(Self::Active),
            "read_only" => Some(Self::ReadOnly),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// A gated 1:1 channel between one end user and staff-as-a-role.
/// `user_id` never changes after creation; `admin_id` is claimed by the
/// first staff member to accept (or act on) the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub admin_id: Option<Uuid>,
    pub pet_kind: Option<PetKind>,
    pub pet_unique_id: Option<String>,
    pub pet_name: Option<String>,
    pub reason: String,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// "about {pet}" fragment for notification texts.
    pub fn pet_label(&self) -> &str {
        self.pet_name.as_deref().unwrap_or("a pet")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
    Archive,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Archive => "archive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "document" => Some(Self::Document),
            "archive" => Some(Self::Archive),
            _ => None,
        }
    }
}

/// Descriptor for an uploaded file. The blob itself lives with an external
/// storage collaborator; the core only keeps this metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub name: String,
    pub size: i64,
    pub storage_ref: String,
}

/// A message inside a Conversation.
///
/// `is_deleted` is the global tombstone: the row survives but every viewer
/// sees the placeholder. `deleted_for` hides the text only for the listed
/// viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub reply_to: Option<Uuid>,
    pub attachment: Option<Attachment>,
    pub is_deleted: bool,
    pub deleted_for: Vec<Uuid>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_deleted_for(&self, viewer: Uuid) -> bool {
        self.deleted_for.contains(&viewer)
    }
}

/// A named multi-party room scoped to one pet case, optionally descended
/// from a parent Conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chatroom {
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
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Admin,
    RequestedUser,
    FoundedUser,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::RequestedUser => "requested_user",
            Self::FoundedUser => "founded_user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "requested_user" => Some(Self::RequestedUser),
            "founded_user" => Some(Self::FoundedUser),
            _ => None,
        }
    }
}

/// Membership of a user in a Chatroom. Removal deactivates the row instead
/// of deleting it so message history stays attributable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatroomParticipant {
    pub id: Uuid,
    pub chatroom_id: Uuid,
    pub user_id: Uuid,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Mirrors ChatMessage but scoped to a Chatroom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatroomMessage {
    pub id: Uuid,
    pub chatroom_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub reply_to: Option<Uuid>,
    pub attachment: Option<Attachment>,
    pub is_deleted: bool,
    pub deleted_for: Vec<Uuid>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatroomMessage {
    pub fn is_deleted_for(&self, viewer: Uuid) -> bool {
        self.deleted_for.contains(&viewer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    JoinRequest,
    CreationRequest,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JoinRequest => "join_request",
            Self::CreationRequest => "creation_request",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "join_request" => Some(Self::JoinRequest),
            "creation_request" => Some(Self::CreationRequest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// An invitation awaiting the invitee's decision. A creation request has no
/// chatroom until it is accepted; the room materializes at that point and
/// the request is linked back to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatroomAccessRequest {
    pub id: Uuid,
    pub chatroom_id: Option<Uuid>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<PetKind>,
    pub pet_name: Option<String>,
    pub requested_user_id: Uuid,
    pub added_by_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub role: ParticipantRole,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ChatRequest,
    ChatAccepted,
    ChatRejected,
    ChatStatusChanged,
    ChatMessage,
    ChatroomInvitation,
    ChatroomRequestAccepted,
    ChatroomRequestRejected,
    ChatRoomCreated,
    // Emitted by external collaborators; part of the closed wire enum.
    AdoptionRequest,
    AdoptionStatusChanged,
    ReportStatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatRequest => "chat_request",
            Self::ChatAccepted => "chat_accepted",
            Self::ChatRejected => "chat_rejected",
            Self::ChatStatusChanged => "chat_status_changed",
            Self::ChatMessage => "chat_message",
            Self::ChatroomInvitation => "chatroom_invitation",
            Self::ChatroomRequestAccepted => "chatroom_request_accepted",
            Self::ChatroomRequestRejected => "chatroom_request_rejected",
            Self::ChatRoomCreated => "chat_room_created",
            Self::AdoptionRequest => "adoption_request",
            Self::AdoptionStatusChanged => "adoption_status_changed",
            Self::ReportStatusChanged => "report_status_changed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "chat_request" => Some(Self::ChatRequest),
            "chat_accepted" => Some(Self::ChatAccepted),
            "chat_rejected" => Some(Self::ChatRejected),
            "chat_status_changed" => Some(Self::ChatStatusChanged),
            "chat_message" => Some(Self::ChatMessage),
            "chatroom_invitation" => Some(Self::ChatroomInvitation),
            "chatroom_request_accepted" => Some(Self::ChatroomRequestAccepted),
            "chatroom_request_rejected" => Some(Self::ChatroomRequestRejected),
            "chat_room_created" => Some(Self::ChatRoomCreated),
            "adoption_request" => Some(Self::AdoptionRequest),
            "adoption_status_changed" => Some(Self::AdoptionStatusChanged),
            "report_status_changed" => Some(Self::ReportStatusChanged),
            _ => None,
        }
    }
}

/// A one-way fact delivered to exactly one recipient. Mutated only by the
/// recipient marking it read; the core never deletes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub from_user_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub access_request_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ConversationStatus::Requested,
            ConversationStatus::PendingUser,
            ConversationStatus::Active,
            ConversationStatus::ReadOnly,
            ConversationStatus::Closed,
        ] {
            assert_eq!(ConversationStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ConversationStatus::from_str("waiting"), None);
    }

    #[test]
    fn user_label_prefers_display_name() {
        let mut user = User {
            id: Uuid::new_v4(),
            username: "lohith".into(),
            display_name: Some("Lohith S".into()),
            is_staff: false,
            created_at: Utc::now(),
        };
        assert_eq!(user.label(), "Lohith S");
        user.display_name = None;
        assert_eq!(user.label(), "lohith");
    }
}
