//! Notification fan-out: derive the recipient set for a domain event,
//! persist one Notification per recipient, then push each one to the
//! recipient's logical channel. Persistence always happens before the push
//! is attempted; a failed push is logged and swallowed, never propagated to
//! the action that triggered it.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use reunite_db::Database;
use reunite_types::api::NotificationView;
use reunite_types::events::{ChannelId, GatewayEvent};
use reunite_types::models::{
    Actor, ChatMessage, Chatroom, ChatroomAccessRequest, Conversation, ConversationStatus,
    Notification, NotificationKind, User,
};

use crate::render;
use crate::{CoreError, Publisher};

const PREVIEW_LEN: usize = 50;

/// A committed state change the fan-out engine reacts to.
pub enum Event<'a> {
    ConversationCreated {
        conversation: &'a Conversation,
    },
    ConversationStatusChanged {
        conversation: &'a Conversation,
        old: ConversationStatus,
        new: ConversationStatus,
    },
    ChatMessagePosted {
        conversation: &'a Conversation,
        message: &'a ChatMessage,
    },
    AccessRequestCreated {
        request: &'a ChatroomAccessRequest,
    },
    AccessRequestResolved {
        request: &'a ChatroomAccessRequest,
        accepted: bool,
    },
    ParticipantAdded {
        chatroom: &'a Chatroom,
        user: &'a User,
    },
}

struct Seed {
    recipient: Uuid,
    recipient_is_staff: bool,
    kind: NotificationKind,
    title: String,
    message: String,
    conversation_id: Option<Uuid>,
    access_request_id: Option<Uuid>,
}

/// Run the fan-out for one committed event. Failures here never unwind the
/// triggering write; they are logged and the caller proceeds.
pub fn fan_out(db: &Database, publisher: &dyn Publisher, actor: &Actor, event: Event<'_>) {
    match seeds_for(db, actor, &event) {
        Ok(seeds) => deliver(db, publisher, actor, seeds),
        Err(e) => warn!("notification fan-out failed: {e:#}"),
    }
}

/// Recipient derivation, pure over the event given the staff directory.
/// The actor is always excluded from the result.
fn seeds_for(db: &Database, actor: &Actor, event: &Event<'_>) -> anyhow::Result<Vec<Seed>> {
    let seeds = match event {
        Event::ConversationCreated { conversation } => {
            let pet = conversation.pet_label().to_string();
            db.staff_users()?
                .into_iter()
                .map(|staff| Seed {
                    recipient: staff.id,
                    recipient_is_staff: true,
                    kind: NotificationKind::ChatRequest,
                    title: "New Chat Request".to_string(),
                    message: format!("{} requested a chat about {}", actor.username, pet),
                    conversation_id: Some(conversation.id),
                    access_request_id: None,
                })
                .collect()
        }

        Event::ConversationStatusChanged {
            conversation,
            old,
            new,
        } => {
            let pet = conversation.pet_label();
            let (kind, title, message) = match (*old, *new) {
                (ConversationStatus::Requested, ConversationStatus::PendingUser) => (
                    NotificationKind::ChatAccepted,
                    "Chat Request Accepted",
                    format!("Admin accepted your chat request about {pet}"),
                ),
                (
                    ConversationStatus::Requested | ConversationStatus::PendingUser,
                    ConversationStatus::Closed,
                ) => (
                    NotificationKind::ChatRejected,
                    "Chat Request Closed",
                    format!("Your chat request about {pet} was closed"),
                ),
                (_, new) => (
                    NotificationKind::ChatStatusChanged,
                    "Chat Status Changed",
                    format!("Your chat status changed to {}", new.as_str()),
                ),
            };
            let recipient_is_staff = is_staff(db, conversation.user_id)?;
            vec![Seed {
                recipient: conversation.user_id,
                recipient_is_staff,
                kind,
                title: title.to_string(),
                message,
                conversation_id: Some(conversation.id),
                access_request_id: None,
            }]
        }

        Event::ChatMessagePosted {
            conversation,
            message,
        } => {
            if message.is_system {
                return Ok(Vec::new());
            }
            let text = format!("{}: {}", actor.username, preview(message));
            if actor.is_staff {
                let recipient_is_staff = is_staff(db, conversation.user_id)?;
                vec![Seed {
                    recipient: conversation.user_id,
                    recipient_is_staff,
                    kind: NotificationKind::ChatMessage,
                    title: "New Chat Message".to_string(),
                    message: text,
                    conversation_id: Some(conversation.id),
                    access_request_id: None,
                }]
            } else {
                db.staff_users()?
                    .into_iter()
                    .map(|staff| Seed {
                        recipient: staff.id,
                        recipient_is_staff: true,
                        kind: NotificationKind::ChatMessage,
                        title: "New Chat Message".to_string(),
                        message: text.clone(),
                        conversation_id: Some(conversation.id),
                        access_request_id: None,
                    })
                    .collect()
            }
        }

        Event::AccessRequestCreated { request } => {
            let pet = request
                .pet_unique_id
                .as_deref()
                .unwrap_or("a pet case")
                .to_string();
            let recipient_is_staff = is_staff(db, request.requested_user_id)?;
            vec![Seed {
                recipient: request.requested_user_id,
                recipient_is_staff,
                kind: NotificationKind::ChatroomInvitation,
                title: "Chatroom Invitation".to_string(),
                message: format!("{} invited you to a chatroom for {}", actor.username, pet),
                conversation_id: request.conversation_id,
                access_request_id: Some(request.id),
            }]
        }

        Event::AccessRequestResolved { request, accepted } => {
            let (kind, title, message) = if *accepted {
                (
                    NotificationKind::ChatroomRequestAccepted,
                    "Chatroom Request Accepted",
                    format!("{} accepted your chatroom invitation.", actor.username),
                )
            } else {
                (
                    NotificationKind::ChatroomRequestRejected,
                    "Chatroom Request Rejected",
                    format!("{} rejected your chatroom invitation.", actor.username),
                )
            };
            let recipient_is_staff = is_staff(db, request.added_by_id)?;
            vec![Seed {
                recipient: request.added_by_id,
                recipient_is_staff,
                kind,
                title: title.to_string(),
                message,
                conversation_id: None,
                access_request_id: Some(request.id),
            }]
        }

        Event::ParticipantAdded { chatroom, user } => {
            vec![Seed {
                recipient: user.id,
                recipient_is_staff: user.is_staff,
                kind: NotificationKind::ChatRoomCreated,
                title: "Added to Chatroom".to_string(),
                message: format!(
                    "You have been added to the chatroom \"{}\" by {}.",
                    chatroom.name, actor.username
                ),
                conversation_id: None,
                access_request_id: None,
            }]
        }
    };

    Ok(seeds
        .into_iter()
        .filter(|seed| seed.recipient != actor.id)
        .collect())
}

fn deliver(db: &Database, publisher: &dyn Publisher, actor: &Actor, seeds: Vec<Seed>) {
    let from_user = reunite_types::api::UserSummary {
        id: actor.id,
        username: actor.username.clone(),
        display_name: None,
    };

    for seed in seeds {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: seed.recipient,
            kind: seed.kind,
            title: seed.title,
            message: seed.message,
            from_user_id: Some(actor.id),
            conversation_id: seed.conversation_id,
            access_request_id: seed.access_request_id,
            is_read: false,
            created_at: Utc::now(),
        };

        // The row is the durable record; only after it exists is the push
        // attempted.
        if let Err(e) = db.insert_notification(&notification) {
            warn!(
                "failed to persist notification for {}: {e:#}",
                seed.recipient
            );
            continue;
        }

        let channel = if seed.recipient_is_staff {
            ChannelId::Staff
        } else {
            ChannelId::User(seed.recipient)
        };
        let event = GatewayEvent::Notification {
            notification: render::notification_view(&notification, Some(from_user.clone())),
        };
        if let Err(e) = publisher.publish(&channel, &event) {
            warn!("notification push to {} failed: {e:#}", channel.name());
        }
    }
}

fn preview(message: &ChatMessage) -> String {
    if message.text.is_empty() {
        if let Some(attachment) = &message.attachment {
            return format!("sent {}", attachment.name);
        }
    }
    let mut out: String = message.text.chars().take(PREVIEW_LEN).collect();
    if message.text.chars().count() > PREVIEW_LEN {
        out.push_str("...");
    }
    out
}

fn is_staff(db: &Database, user_id: Uuid) -> anyhow::Result<bool> {
    Ok(db.get_user(user_id)?.map(|u| u.is_staff).unwrap_or(false))
}

// -- Notification retrieval / read state --

pub fn list_notifications(db: &Database, actor: &Actor) -> Result<Vec<NotificationView>, CoreError> {
    let notifications = db.list_notifications_for_recipient(actor.id)?;
    let mut views = Vec::with_capacity(notifications.len());
    for notification in &notifications {
        let from_user = match notification.from_user_id {
            Some(id) => render::summary_for(db, id)?,
            None => None,
        };
        views.push(render::notification_view(notification, from_user));
    }
    Ok(views)
}

pub fn mark_notification_read(db: &Database, actor: &Actor, id: Uuid) -> Result<(), CoreError> {
    if db.mark_notification_read(id, actor.id)? {
        Ok(())
    } else {
        Err(CoreError::not_found("Notification not found."))
    }
}

pub fn mark_all_notifications_read(db: &Database, actor: &Actor) -> Result<usize, CoreError> {
    Ok(db.mark_all_notifications_read(actor.id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingPublisher, actor_for, seed_staff, seed_user, test_db};
    use reunite_types::models::PetKind;

    fn sample_conversation(user_id: Uuid) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            user_id,
            admin_id: None,
            pet_kind: Some(PetKind::Lost),
            pet_unique_id: Some("LP000042".into()),
            pet_name: Some("Bruno".into()),
            reason: "Saw a similar dog".into(),
            status: ConversationStatus::Requested,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn conversation_created_notifies_every_staff_account() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff_a = seed_staff(&db, "admin-a");
        let staff_b = seed_staff(&db, "admin-b");
        let publisher = RecordingPublisher::default();

        let convo = sample_conversation(user.id);
        db.insert_conversation(&convo).unwrap();

        fan_out(
            &db,
            &publisher,
            &actor_for(&user),
            Event::ConversationCreated {
                conversation: &convo,
            },
        );

        for staff in [&staff_a, &staff_b] {
            let notifications = db.list_notifications_for_recipient(staff.id).unwrap();
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].kind, NotificationKind::ChatRequest);
            assert_eq!(
                notifications[0].message,
                "asha requested a chat about Bruno"
            );
        }
        // Staff recipients share the broadcast channel.
        assert_eq!(publisher.channel_names(), vec!["staff", "staff"]);
    }

    #[test]
    fn actor_is_excluded_from_recipient_set() {
        let db = test_db();
        let staff = seed_staff(&db, "admin-a");
        let other_staff = seed_staff(&db, "admin-b");
        let user = seed_user(&db, "asha");
        let publisher = RecordingPublisher::default();

        let convo = sample_conversation(user.id);
        db.insert_conversation(&convo).unwrap();
        let message = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id: convo.id,
            sender_id: user.id,
            text: "hello".into(),
            reply_to: None,
            attachment: None,
            is_deleted: false,
            deleted_for: vec![],
            is_system: false,
            created_at: Utc::now(),
        };

        // A user message notifies staff, never the sending user.
        fan_out(
            &db,
            &publisher,
            &actor_for(&user),
            Event::ChatMessagePosted {
                conversation: &convo,
                message: &message,
            },
        );
        assert!(db.list_notifications_for_recipient(user.id).unwrap().is_empty());
        assert_eq!(db.list_notifications_for_recipient(staff.id).unwrap().len(), 1);
        assert_eq!(
            db.list_notifications_for_recipient(other_staff.id).unwrap().len(),
            1
        );

        // A staff message notifies only the owning user; the acting staff
        // member is excluded even from the staff set.
        let staff_message = ChatMessage {
            sender_id: staff.id,
            id: Uuid::new_v4(),
            ..message
        };
        fan_out(
            &db,
            &publisher,
            &actor_for(&staff),
            Event::ChatMessagePosted {
                conversation: &convo,
                message: &staff_message,
            },
        );
        assert_eq!(db.list_notifications_for_recipient(user.id).unwrap().len(), 1);
        assert_eq!(db.list_notifications_for_recipient(staff.id).unwrap().len(), 1);
    }

    #[test]
    fn system_messages_do_not_fan_out() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = sample_conversation(user.id);
        db.insert_conversation(&convo).unwrap();
        let message = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id: convo.id,
            sender_id: user.id,
            text: "User joined the chat.".into(),
            reply_to: None,
            attachment: None,
            is_deleted: false,
            deleted_for: vec![],
            is_system: true,
            created_at: Utc::now(),
        };
        fan_out(
            &db,
            &publisher,
            &actor_for(&user),
            Event::ChatMessagePosted {
                conversation: &convo,
                message: &message,
            },
        );
        assert!(publisher.channel_names().is_empty());
    }

    #[test]
    fn status_change_classes_map_old_and_new() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = sample_conversation(user.id);
        db.insert_conversation(&convo).unwrap();

        fan_out(
            &db,
            &publisher,
            &actor_for(&staff),
            Event::ConversationStatusChanged {
                conversation: &convo,
                old: ConversationStatus::Requested,
                new: ConversationStatus::PendingUser,
            },
        );
        fan_out(
            &db,
            &publisher,
            &actor_for(&staff),
            Event::ConversationStatusChanged {
                conversation: &convo,
                old: ConversationStatus::PendingUser,
                new: ConversationStatus::Closed,
            },
        );
        fan_out(
            &db,
            &publisher,
            &actor_for(&staff),
            Event::ConversationStatusChanged {
                conversation: &convo,
                old: ConversationStatus::Active,
                new: ConversationStatus::ReadOnly,
            },
        );

        let kinds: Vec<NotificationKind> = db
            .list_notifications_for_recipient(user.id)
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert!(kinds.contains(&NotificationKind::ChatAccepted));
        assert!(kinds.contains(&NotificationKind::ChatRejected));
        assert!(kinds.contains(&NotificationKind::ChatStatusChanged));
        // Owner is not staff, so pushes went to the personal channel.
        assert!(
            publisher
                .channel_names()
                .iter()
                .all(|name| name == &format!("user:{}", user.id))
        );
    }

    #[test]
    fn push_failure_leaves_the_persisted_row() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        seed_staff(&db, "admin-a");
        let publisher = crate::testing::FailingPublisher;

        let convo = sample_conversation(user.id);
        db.insert_conversation(&convo).unwrap();
        fan_out(
            &db,
            &publisher,
            &actor_for(&user),
            Event::ConversationCreated {
                conversation: &convo,
            },
        );

        let staff_rows: usize = db
            .staff_users()
            .unwrap()
            .iter()
            .map(|s| db.list_notifications_for_recipient(s.id).unwrap().len())
            .sum();
        assert_eq!(staff_rows, 1);
    }

    #[test]
    fn long_message_text_is_truncated_in_preview() {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            text: "x".repeat(80),
            reply_to: None,
            attachment: None,
            is_deleted: false,
            deleted_for: vec![],
            is_system: false,
            created_at: Utc::now(),
        };
        let p = preview(&message);
        assert_eq!(p.chars().count(), PREVIEW_LEN + 3);
        assert!(p.ends_with("..."));
    }
}
