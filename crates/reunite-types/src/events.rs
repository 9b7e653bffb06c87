use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ChatroomMessageView, NotificationView};

/// A logical pub/sub channel. Every connection owns its user channel, staff
/// connections additionally join the well-known staff broadcast channel, and
/// room channels are joined per chatroom after a membership check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelId {
    User(Uuid),
    Staff,
    Room(Uuid),
}

impl ChannelId {
    /// Stable wire name, usable as a key in any external pub/sub broker.
    pub fn name(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Staff => "staff".to_string(),
            Self::Room(id) => format!("room:{id}"),
        }
    }
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Connection is authenticated and subscribed to its base channels.
    Ready {
        user_id: Uuid,
        username: String,
        is_staff: bool,
    },

    /// A notification was persisted for a channel this connection follows.
    Notification { notification: NotificationView },

    /// A new message was posted in a room channel.
    MessageCreate { message: ChatroomMessageView },

    /// A command failed; the connection stays open.
    Error { message: String },
}

/// Commands sent from client to server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Subscribe to a room channel. Refused unless the caller is an active
    /// participant of the room at join time.
    JoinRoom { room_id: Uuid },

    /// Drop a room channel subscription.
    LeaveRoom { room_id: Uuid },

    /// Post a message to a room. Runs the same persistence and fan-out path
    /// as the REST endpoint before broadcasting.
    SendMessage {
        room_id: Uuid,
        text: Option<String>,
        reply_to_message_id: Option<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_are_stable() {
        let id = Uuid::nil();
        assert_eq!(
            ChannelId::User(id).name(),
            "user:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(ChannelId::Staff.name(), "staff");
        assert_eq!(
            ChannelId::Room(id).name(),
            "room:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"send_message","data":{"room_id":"00000000-0000-0000-0000-000000000000","text":"hi","reply_to_message_id":null}}"#,
        )
        .unwrap();
        match cmd {
            GatewayCommand::SendMessage { text, .. } => assert_eq!(text.as_deref(), Some("hi")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
