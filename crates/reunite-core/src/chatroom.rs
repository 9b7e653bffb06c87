//! The chatroom engine: multi-party rooms scoped to a pet case. Message
//! rules mirror the conversation engine but are gated on an active
//! participant row instead of the 1:1 status machine; role only governs
//! administrative capability. There is no room status machine; a room is
//! active until it is destructively deleted.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use reunite_db::Database;
use reunite_types::api::{ChatroomMessageView, ChatroomView, ParticipantView, SendMessageRequest};
use reunite_types::events::{ChannelId, GatewayEvent};
use reunite_types::models::{Actor, Attachment, Chatroom, ChatroomMessage, ParticipantRole};

use crate::render;
use crate::{CoreError, Publisher};

/// Post a human message into a room. Any active participant may post
/// regardless of role. The serialized message is broadcast on the room
/// channel after the insert commits; the WebSocket send path and the REST
/// path both land here.
pub fn post_message(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    chatroom_id: Uuid,
    input: SendMessageRequest,
) -> Result<ChatroomMessageView, CoreError> {
    let room = get_active_room(db, chatroom_id)?;
    require_active_participant(db, &room, actor.id)?;

    let (text, attachment) = validate_draft(&input)?;
    let reply_to = match input.reply_to_message_id {
        Some(reply_id) => {
            if db.get_room_message(chatroom_id, reply_id)?.is_none() {
                return Err(CoreError::validation(
                    "Reply references a message outside this chatroom.",
                ));
            }
            Some(reply_id)
        }
        None => None,
    };

    let message = ChatroomMessage {
        id: Uuid::new_v4(),
        chatroom_id,
        sender_id: actor.id,
        text,
        reply_to,
        attachment,
        is_deleted: false,
        deleted_for: vec![],
        is_system: false,
        created_at: Utc::now(),
    };
    db.insert_room_message(&message)?;
    db.touch_chatroom(chatroom_id, Utc::now())?;

    let view = render::room_message_view(db, &message, actor.id)?;
    broadcast_message(publisher, chatroom_id, &view);
    Ok(view)
}

/// Engine-generated room announcement (creation, membership changes,
/// invitation acceptance). Broadcast like any other room message so open
/// connections see the timeline move.
pub(crate) fn post_system_message(
    db: &Database,
    publisher: &dyn Publisher,
    chatroom_id: Uuid,
    sender_id: Uuid,
    text: &str,
) -> Result<ChatroomMessage, CoreError> {
    let message = ChatroomMessage {
        id: Uuid::new_v4(),
        chatroom_id,
        sender_id,
        text: text.to_string(),
        reply_to: None,
        attachment: None,
        is_deleted: false,
        deleted_for: vec![],
        is_system: true,
        created_at: Utc::now(),
    };
    db.insert_room_message(&message)?;
    let view = render::room_message_view(db, &message, sender_id)?;
    broadcast_message(publisher, chatroom_id, &view);
    Ok(message)
}

fn broadcast_message(publisher: &dyn Publisher, chatroom_id: Uuid, view: &ChatroomMessageView) {
    let event = GatewayEvent::MessageCreate {
        message: view.clone(),
    };
    if let Err(e) = publisher.publish(&ChannelId::Room(chatroom_id), &event) {
        warn!("room broadcast for {chatroom_id} failed: {e:#}");
    }
}

pub fn list_messages(
    db: &Database,
    actor: &Actor,
    chatroom_id: Uuid,
) -> Result<Vec<ChatroomMessageView>, CoreError> {
    let room = get_active_room(db, chatroom_id)?;
    require_active_participant(db, &room, actor.id)?;
    db.list_room_messages(chatroom_id)?
        .into_iter()
        .map(|ctx| render::room_message_view_from_context(ctx, actor.id).map_err(CoreError::from))
        .collect()
}

pub fn delete_message_for_me(
    db: &Database,
    actor: &Actor,
    chatroom_id: Uuid,
    message_id: Uuid,
) -> Result<ChatroomMessageView, CoreError> {
    let room = get_active_room(db, chatroom_id)?;
    require_active_participant(db, &room, actor.id)?;
    if db.get_room_message(chatroom_id, message_id)?.is_none() {
        return Err(CoreError::not_found("Message not found."));
    }
    db.append_room_message_deleted_for(message_id, actor.id)?;
    let message = db
        .get_room_message(chatroom_id, message_id)?
        .ok_or_else(|| CoreError::not_found("Message not found."))?;
    render::room_message_view(db, &message, actor.id)
}

pub fn delete_message_for_everyone(
    db: &Database,
    actor: &Actor,
    chatroom_id: Uuid,
    message_id: Uuid,
) -> Result<ChatroomMessageView, CoreError> {
    let room = get_active_room(db, chatroom_id)?;
    require_active_participant(db, &room, actor.id)?;
    let message = db
        .get_room_message(chatroom_id, message_id)?
        .ok_or_else(|| CoreError::not_found("Message not found."))?;
    if message.is_system {
        return Err(CoreError::validation("Cannot delete system message."));
    }
    if message.sender_id != actor.id {
        return Err(CoreError::permission(
            "You can only delete your own messages for everyone.",
        ));
    }
    db.mark_room_message_deleted(message_id)?;
    let message = db
        .get_room_message(chatroom_id, message_id)?
        .ok_or_else(|| CoreError::not_found("Message not found."))?;
    render::room_message_view(db, &message, actor.id)
}

/// Rooms where the caller holds an active membership. Staff additionally see
/// every active room.
pub fn list_chatrooms(db: &Database, actor: &Actor) -> Result<Vec<ChatroomView>, CoreError> {
    let rooms = if actor.is_staff {
        db.list_chatrooms()?
    } else {
        db.list_chatrooms_for_user(actor.id)?
    };
    Ok(rooms.into_iter().map(chatroom_view).collect())
}

pub fn list_participants(
    db: &Database,
    actor: &Actor,
    chatroom_id: Uuid,
) -> Result<Vec<ParticipantView>, CoreError> {
    let room = get_active_room(db, chatroom_id)?;
    if !actor.is_staff && !db.is_active_participant(room.id, actor.id)? {
        return Err(CoreError::permission(
            "You are not a participant in this chatroom.",
        ));
    }
    Ok(db
        .list_active_participants(chatroom_id)?
        .iter()
        .map(|row| render::participant_view(&row.participant, &row.user))
        .collect())
}

/// Deactivate a membership. Staff or a room admin may remove; the row stays
/// so history remains attributable, but the user loses read and post access.
pub fn remove_participant(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    chatroom_id: Uuid,
    user_id: Uuid,
) -> Result<(), CoreError> {
    let room = get_active_room(db, chatroom_id)?;
    if !actor.is_staff {
        let membership = db.get_participant(room.id, actor.id)?;
        let is_room_admin = membership
            .map(|p| p.is_active && p.role == ParticipantRole::Admin)
            .unwrap_or(false);
        if !is_room_admin {
            return Err(CoreError::permission(
                "Only staff or a room admin can remove participants.",
            ));
        }
    }

    if !db.deactivate_participant(chatroom_id, user_id)? {
        return Err(CoreError::not_found(
            "User is not an active participant of this chatroom.",
        ));
    }

    let name = db
        .get_user(user_id)?
        .map(|u| u.label().to_string())
        .unwrap_or_else(|| user_id.to_string());
    post_system_message(
        db,
        publisher,
        chatroom_id,
        actor.id,
        &format!("{} was removed from the chatroom by {}.", name, actor.username),
    )?;
    Ok(())
}

/// Staff maintenance: drop every message but keep the room and its
/// participants.
pub fn clear_messages(db: &Database, actor: &Actor, chatroom_id: Uuid) -> Result<usize, CoreError> {
    if !actor.is_staff {
        return Err(CoreError::permission("Staff only."));
    }
    get_active_room(db, chatroom_id)?;
    let deleted = db.clear_room_messages(chatroom_id)?;
    info!("cleared {deleted} messages from chatroom {chatroom_id}");
    Ok(deleted)
}

/// Destructive removal, unlike conversations which retain closed history:
/// messages and participants cascade with the room. Staff or any active
/// participant may delete.
pub fn delete_chatroom(db: &Database, actor: &Actor, chatroom_id: Uuid) -> Result<(), CoreError> {
    let room = get_active_room(db, chatroom_id)?;
    if !actor.is_staff && !db.is_active_participant(room.id, actor.id)? {
        return Err(CoreError::permission(
            "You don't have permission to delete this chatroom.",
        ));
    }
    db.delete_chatroom(chatroom_id)?;
    info!("chatroom {} ({}) deleted by {}", room.id, room.name, actor.username);
    Ok(())
}

pub(crate) fn get_active_room(db: &Database, chatroom_id: Uuid) -> Result<Chatroom, CoreError> {
    let room = db
        .get_chatroom(chatroom_id)?
        .ok_or_else(|| CoreError::not_found("Chatroom not found."))?;
    if !room.is_active {
        return Err(CoreError::not_found("Chatroom not found."));
    }
    Ok(room)
}

fn require_active_participant(
    db: &Database,
    room: &Chatroom,
    user_id: Uuid,
) -> Result<(), CoreError> {
    if db.is_active_participant(room.id, user_id)? {
        Ok(())
    } else {
        Err(CoreError::permission(
            "You are not a participant in this chatroom.",
        ))
    }
}

pub fn chatroom_view(room: Chatroom) -> ChatroomView {
    ChatroomView {
        id: room.id,
        name: room.name,
        conversation_id: room.conversation_id,
        pet_unique_id: room.pet_unique_id,
        pet_kind: room.pet_kind,
        pet_name: room.pet_name,
        purpose: room.purpose,
        created_by: room.created_by,
        is_active: room.is_active,
        created_at: room.created_at,
    }
}

fn validate_draft(input: &SendMessageRequest) -> Result<(String, Option<Attachment>), CoreError> {
    let text = input.text.clone().unwrap_or_default();
    let attachment = input.attachment.clone().map(|a| Attachment {
        kind: a.kind,
        name: a.name,
        size: a.size,
        storage_ref: a.storage_ref,
    });
    if text.trim().is_empty() && attachment.is_none() {
        return Err(CoreError::validation(
            "Message requires text or an attachment.",
        ));
    }
    Ok((text, attachment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access;
    use crate::testing::{RecordingPublisher, actor_for, seed_staff, seed_user, test_db};
    use reunite_types::models::PetKind;

    fn draft(text: &str) -> SendMessageRequest {
        SendMessageRequest {
            text: Some(text.to_string()),
            reply_to_message_id: None,
            attachment: None,
        }
    }

    /// Room with the staff creator and one user already granted.
    fn room_with_members(
        db: &Database,
        publisher: &RecordingPublisher,
        staff: &reunite_types::models::User,
        user: &reunite_types::models::User,
    ) -> Chatroom {
        let (room, _) = access::direct_add(
            db,
            publisher,
            &actor_for(staff),
            access::AddParticipant {
                user_id: user.id,
                chatroom_id: None,
                pet_unique_id: Some("LP000042".into()),
                pet_kind: Some(PetKind::Lost),
                pet_name: Some("Bruno".into()),
                conversation_id: None,
                role: ParticipantRole::RequestedUser,
            },
        )
        .unwrap();
        room
    }

    #[test]
    fn any_active_participant_may_post_regardless_of_role() {
        let db = test_db();
        let staff = seed_staff(&db, "admin-a");
        let user = seed_user(&db, "asha");
        let publisher = RecordingPublisher::default();
        let room = room_with_members(&db, &publisher, &staff, &user);

        post_message(&db, &publisher, &actor_for(&user), room.id, draft("hello")).unwrap();
        post_message(&db, &publisher, &actor_for(&staff), room.id, draft("hi")).unwrap();

        let outsider = seed_user(&db, "noor");
        let err = post_message(&db, &publisher, &actor_for(&outsider), room.id, draft("hi"))
            .unwrap_err();
        assert!(matches!(err, CoreError::Permission(_)));
    }

    #[test]
    fn posting_broadcasts_on_the_room_channel() {
        let db = test_db();
        let staff = seed_staff(&db, "admin-a");
        let user = seed_user(&db, "asha");
        let publisher = RecordingPublisher::default();
        let room = room_with_members(&db, &publisher, &staff, &user);

        post_message(&db, &publisher, &actor_for(&user), room.id, draft("hello")).unwrap();
        let channel = format!("room:{}", room.id);
        let events = publisher.events();
        let message_events: Vec<_> = events
            .iter()
            .filter(|(name, event)| {
                name == &channel && matches!(event, GatewayEvent::MessageCreate { .. })
            })
            .collect();
        assert!(!message_events.is_empty());
    }

    #[test]
    fn removed_participant_loses_access_but_history_remains() {
        let db = test_db();
        let staff = seed_staff(&db, "admin-a");
        let user = seed_user(&db, "asha");
        let publisher = RecordingPublisher::default();
        let room = room_with_members(&db, &publisher, &staff, &user);

        post_message(&db, &publisher, &actor_for(&user), room.id, draft("hello")).unwrap();
        remove_participant(&db, &publisher, &actor_for(&staff), room.id, user.id).unwrap();

        let err =
            post_message(&db, &publisher, &actor_for(&user), room.id, draft("hi")).unwrap_err();
        assert!(matches!(err, CoreError::Permission(_)));

        // The deactivated row still exists and the message is still
        // attributable to the removed user.
        let membership = db.get_participant(room.id, user.id).unwrap().unwrap();
        assert!(!membership.is_active);
        let views = list_messages(&db, &actor_for(&staff), room.id).unwrap();
        assert!(
            views
                .iter()
                .any(|v| v.sender.as_ref().map(|s| s.id) == Some(user.id))
        );
    }

    #[test]
    fn room_soft_delete_mirrors_conversation_rules() {
        let db = test_db();
        let staff = seed_staff(&db, "admin-a");
        let user = seed_user(&db, "asha");
        let publisher = RecordingPublisher::default();
        let room = room_with_members(&db, &publisher, &staff, &user);

        let posted =
            post_message(&db, &publisher, &actor_for(&user), room.id, draft("oops")).unwrap();

        delete_message_for_me(&db, &actor_for(&staff), room.id, posted.id).unwrap();
        let user_views = list_messages(&db, &actor_for(&user), room.id).unwrap();
        let user_view = user_views.iter().find(|v| v.id == posted.id).unwrap();
        assert_eq!(user_view.text.as_deref(), Some("oops"));

        let err = delete_message_for_everyone(&db, &actor_for(&staff), room.id, posted.id)
            .unwrap_err();
        assert!(matches!(err, CoreError::Permission(_)));

        delete_message_for_everyone(&db, &actor_for(&user), room.id, posted.id).unwrap();
        let staff_views = list_messages(&db, &actor_for(&staff), room.id).unwrap();
        let staff_view = staff_views.iter().find(|v| v.id == posted.id).unwrap();
        assert_eq!(
            staff_view.text.as_deref(),
            Some(reunite_types::models::DELETED_PLACEHOLDER)
        );
    }

    #[test]
    fn deleting_a_room_cascades_messages_and_participants() {
        let db = test_db();
        let staff = seed_staff(&db, "admin-a");
        let user = seed_user(&db, "asha");
        let publisher = RecordingPublisher::default();
        let room = room_with_members(&db, &publisher, &staff, &user);
        post_message(&db, &publisher, &actor_for(&user), room.id, draft("hello")).unwrap();

        delete_chatroom(&db, &actor_for(&user), room.id).unwrap();
        assert!(db.get_chatroom(room.id).unwrap().is_none());
        assert!(db.list_room_messages(room.id).unwrap().is_empty());
        assert!(db.get_participant(room.id, user.id).unwrap().is_none());
    }

    #[test]
    fn clear_messages_is_staff_only_and_keeps_membership() {
        let db = test_db();
        let staff = seed_staff(&db, "admin-a");
        let user = seed_user(&db, "asha");
        let publisher = RecordingPublisher::default();
        let room = room_with_members(&db, &publisher, &staff, &user);
        post_message(&db, &publisher, &actor_for(&user), room.id, draft("hello")).unwrap();

        let err = clear_messages(&db, &actor_for(&user), room.id).unwrap_err();
        assert!(matches!(err, CoreError::Permission(_)));

        clear_messages(&db, &actor_for(&staff), room.id).unwrap();
        assert!(list_messages(&db, &actor_for(&user), room.id).unwrap().is_empty());
        assert!(db.is_active_participant(room.id, user.id).unwrap());
    }
}
