//! The conversation engine: a gated 1:1 channel between one end user and
//! staff-as-a-role, with a small state machine of asymmetric transition
//! rights.
//!
//! States: requested → pending_user → active ⇄ read_only → closed, with
//! closed reachable from any non-closed state. Staff drive every transition
//! except pending_user → active, which only the owning user may take.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use reunite_db::Database;
use reunite_types::api::{ChatMessageView, ConversationView, SendMessageRequest};
use reunite_types::models::{
    Actor, Attachment, ChatMessage, Conversation, ConversationStatus, PetKind,
};

use crate::notify::{self, Event};
use crate::render;
use crate::{CoreError, Publisher};

pub struct NewConversation {
    pub pet_kind: Option<PetKind>,
    pub pet_unique_id: Option<String>,
    pub pet_name: Option<String>,
    pub reason: String,
}

/// A user opens a new conversation; it starts in `requested` and every staff
/// account is notified.
pub fn create_conversation(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    input: NewConversation,
) -> Result<Conversation, CoreError> {
    let now = Utc::now();
    let conversation = Conversation {
        id: Uuid::new_v4(),
        user_id: actor.id,
        admin_id: None,
        pet_kind: input.pet_kind,
        pet_unique_id: input.pet_unique_id,
        pet_name: input.pet_name,
        reason: input.reason,
        status: ConversationStatus::Requested,
        created_at: now,
        updated_at: now,
    };
    db.insert_conversation(&conversation)?;
    info!("conversation {} requested by {}", conversation.id, actor.username);

    notify::fan_out(
        db,
        publisher,
        actor,
        Event::ConversationCreated {
            conversation: &conversation,
        },
    );
    Ok(conversation)
}

/// Staff accept a requested conversation (requested → pending_user) and
/// claim the admin slot if it is still unset.
pub fn accept_conversation(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    id: Uuid,
) -> Result<Conversation, CoreError> {
    require_staff(actor)?;
    let conversation = get_conversation(db, id)?;

    let changed = db.update_conversation_status(
        id,
        &[ConversationStatus::Requested],
        ConversationStatus::PendingUser,
        Some(actor.id),
        Utc::now(),
    )?;
    if !changed {
        return Err(CoreError::conflict(
            "Conversation is not in requested state.",
        ));
    }

    post_system_message(db, id, actor.id, "Admin accepted the chat request.")?;
    let updated = get_conversation(db, id)?;
    notify::fan_out(
        db,
        publisher,
        actor,
        Event::ConversationStatusChanged {
            conversation: &updated,
            old: conversation.status,
            new: ConversationStatus::PendingUser,
        },
    );
    Ok(updated)
}

/// The owning user confirms after staff acceptance (pending_user → active).
pub fn confirm_conversation(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    id: Uuid,
) -> Result<Conversation, CoreError> {
    let conversation = get_conversation(db, id)?;
    if conversation.user_id != actor.id {
        return Err(CoreError::permission(
            "Only the conversation owner can confirm it.",
        ));
    }

    let changed = db.update_conversation_status(
        id,
        &[ConversationStatus::PendingUser],
        ConversationStatus::Active,
        None,
        Utc::now(),
    )?;
    if !changed {
        return Err(CoreError::conflict(
            "Conversation is not awaiting confirmation.",
        ));
    }

    post_system_message(db, id, actor.id, "User joined the chat.")?;
    let updated = get_conversation(db, id)?;
    // The actor is the only would-be recipient here, so this fans out to
    // nobody; it still runs for uniformity.
    notify::fan_out(
        db,
        publisher,
        actor,
        Event::ConversationStatusChanged {
            conversation: &updated,
            old: ConversationStatus::PendingUser,
            new: ConversationStatus::Active,
        },
    );
    Ok(updated)
}

/// Staff toggle active ⇄ read_only or close. Setting the current status
/// again is a no-op success with no system message.
pub fn set_conversation_status(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    id: Uuid,
    target: ConversationStatus,
) -> Result<Conversation, CoreError> {
    require_staff(actor)?;
    if !matches!(
        target,
        ConversationStatus::Active | ConversationStatus::ReadOnly | ConversationStatus::Closed
    ) {
        return Err(CoreError::validation("Invalid status."));
    }

    let conversation = get_conversation(db, id)?;
    if conversation.status == target {
        return Ok(conversation);
    }

    let allowed_from: &[ConversationStatus] = if target == ConversationStatus::Closed {
        &[
            ConversationStatus::Requested,
            ConversationStatus::PendingUser,
            ConversationStatus::Active,
            ConversationStatus::ReadOnly,
        ]
    } else {
        // active ⇄ read_only only; no jump out of requested/pending_user.
        &[ConversationStatus::Active, ConversationStatus::ReadOnly]
    };

    let changed =
        db.update_conversation_status(id, allowed_from, target, Some(actor.id), Utc::now())?;
    if !changed {
        return Err(CoreError::conflict(format!(
            "Cannot move conversation from {} to {}.",
            conversation.status.as_str(),
            target.as_str()
        )));
    }

    let label = match target {
        ConversationStatus::Active => "Active",
        ConversationStatus::ReadOnly => "Waiting",
        _ => "Close",
    };
    post_system_message(db, id, actor.id, &format!("Chat marked as {label}."))?;

    let updated = get_conversation(db, id)?;
    notify::fan_out(
        db,
        publisher,
        actor,
        Event::ConversationStatusChanged {
            conversation: &updated,
            old: conversation.status,
            new: target,
        },
    );
    Ok(updated)
}

/// Staff close from any non-closed state. Closing an already-closed
/// conversation succeeds without posting another system message.
pub fn close_conversation(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    id: Uuid,
) -> Result<Conversation, CoreError> {
    require_staff(actor)?;
    let conversation = get_conversation(db, id)?;
    if conversation.status == ConversationStatus::Closed {
        return Ok(conversation);
    }

    let changed = db.update_conversation_status(
        id,
        &[
            ConversationStatus::Requested,
            ConversationStatus::PendingUser,
            ConversationStatus::Active,
            ConversationStatus::ReadOnly,
        ],
        ConversationStatus::Closed,
        None,
        Utc::now(),
    )?;
    if !changed {
        // Lost a race against another close; same idempotent outcome.
        return get_conversation(db, id);
    }

    post_system_message(db, id, actor.id, "Chat was closed by admin.")?;
    let updated = get_conversation(db, id)?;
    notify::fan_out(
        db,
        publisher,
        actor,
        Event::ConversationStatusChanged {
            conversation: &updated,
            old: conversation.status,
            new: ConversationStatus::Closed,
        },
    );
    Ok(updated)
}

/// Post a human message. The owning user may post only while the
/// conversation is active; staff may also post while it is read_only or
/// still awaiting user confirmation. Posting never changes the status.
pub fn post_message(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    conversation_id: Uuid,
    input: SendMessageRequest,
) -> Result<ChatMessageView, CoreError> {
    let conversation = get_conversation(db, conversation_id)?;
    if !actor.is_staff && conversation.user_id != actor.id {
        return Err(CoreError::permission(
            "You are not a participant in this conversation.",
        ));
    }

    let allowed = if actor.is_staff {
        matches!(
            conversation.status,
            ConversationStatus::Active
                | ConversationStatus::ReadOnly
                | ConversationStatus::PendingUser
        )
    } else {
        conversation.status == ConversationStatus::Active
    };
    if !allowed {
        return Err(CoreError::conflict("Conversation is not active."));
    }

    let (text, attachment) = validate_draft(&input)?;
    let reply_to = match input.reply_to_message_id {
        Some(reply_id) => {
            // The target must live in this conversation.
            if db.get_chat_message(conversation_id, reply_id)?.is_none() {
                return Err(CoreError::validation(
                    "Reply references a message outside this conversation.",
                ));
            }
            Some(reply_id)
        }
        None => None,
    };

    if actor.is_staff && conversation.admin_id.is_none() {
        db.claim_conversation_admin(conversation_id, actor.id, Utc::now())?;
    }

    let message = ChatMessage {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id: actor.id,
        text,
        reply_to,
        attachment,
        is_deleted: false,
        deleted_for: vec![],
        is_system: false,
        created_at: Utc::now(),
    };
    db.insert_chat_message(&message)?;

    notify::fan_out(
        db,
        publisher,
        actor,
        Event::ChatMessagePosted {
            conversation: &conversation,
            message: &message,
        },
    );

    render::chat_message_view(db, &conversation, &message, actor.id)
}

/// Engine-generated transition announcement. Never fans out.
fn post_system_message(
    db: &Database,
    conversation_id: Uuid,
    sender_id: Uuid,
    text: &str,
) -> Result<ChatMessage, CoreError> {
    let message = ChatMessage {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        text: text.to_string(),
        reply_to: None,
        attachment: None,
        is_deleted: false,
        deleted_for: vec![],
        is_system: true,
        created_at: Utc::now(),
    };
    db.insert_chat_message(&message)?;
    Ok(message)
}

pub fn list_messages(
    db: &Database,
    actor: &Actor,
    conversation_id: Uuid,
) -> Result<Vec<ChatMessageView>, CoreError> {
    let conversation = get_conversation(db, conversation_id)?;
    if !actor.is_staff && conversation.user_id != actor.id {
        return Err(CoreError::permission(
            "You are not a participant in this conversation.",
        ));
    }
    db.list_conversation_messages(conversation_id)?
        .into_iter()
        .map(|ctx| {
            render::chat_message_view_from_context(&conversation, ctx, actor.id)
                .map_err(CoreError::from)
        })
        .collect()
}

/// "Delete for me": hides the text for the caller only. Repeat calls are
/// no-ops; the set of hidden viewers never shrinks.
pub fn delete_message_for_me(
    db: &Database,
    actor: &Actor,
    conversation_id: Uuid,
    message_id: Uuid,
) -> Result<ChatMessageView, CoreError> {
    let conversation = get_conversation(db, conversation_id)?;
    if !actor.is_staff && conversation.user_id != actor.id {
        return Err(CoreError::permission(
            "You are not a participant in this conversation.",
        ));
    }
    if db.get_chat_message(conversation_id, message_id)?.is_none() {
        return Err(CoreError::not_found("Message not found."));
    }
    db.append_chat_message_deleted_for(message_id, actor.id)?;
    let message = db
        .get_chat_message(conversation_id, message_id)?
        .ok_or_else(|| CoreError::not_found("Message not found."))?;
    render::chat_message_view(db, &conversation, &message, actor.id)
}

/// "Delete for everyone": global tombstone, restricted to the message's own
/// sender and refused for system messages.
pub fn delete_message_for_everyone(
    db: &Database,
    actor: &Actor,
    conversation_id: Uuid,
    message_id: Uuid,
) -> Result<ChatMessageView, CoreError> {
    let conversation = get_conversation(db, conversation_id)?;
    if !actor.is_staff && conversation.user_id != actor.id {
        return Err(CoreError::permission(
            "You are not a participant in this conversation.",
        ));
    }
    let message = db
        .get_chat_message(conversation_id, message_id)?
        .ok_or_else(|| CoreError::not_found("Message not found."))?;
    if message.is_system {
        return Err(CoreError::validation("Cannot delete system message."));
    }
    if message.sender_id != actor.id {
        return Err(CoreError::permission(
            "Only the sender can delete a message for everyone.",
        ));
    }
    db.mark_chat_message_deleted(message_id)?;
    let message = db
        .get_chat_message(conversation_id, message_id)?
        .ok_or_else(|| CoreError::not_found("Message not found."))?;
    render::chat_message_view(db, &conversation, &message, actor.id)
}

pub fn list_conversations(
    db: &Database,
    actor: &Actor,
    status: Option<ConversationStatus>,
) -> Result<Vec<ConversationView>, CoreError> {
    let conversations = if actor.is_staff {
        db.list_conversations(status)?
    } else {
        db.list_conversations_for_user(actor.id)?
    };
    conversations
        .iter()
        .map(|convo| render::conversation_view(db, convo))
        .collect()
}

pub fn get_conversation_view(
    db: &Database,
    actor: &Actor,
    id: Uuid,
) -> Result<ConversationView, CoreError> {
    let conversation = get_conversation(db, id)?;
    if !actor.is_staff && conversation.user_id != actor.id {
        return Err(CoreError::not_found("Conversation not found."));
    }
    render::conversation_view(db, &conversation)
}

/// Staff maintenance: drop every message but keep the conversation.
pub fn clear_messages(db: &Database, actor: &Actor, id: Uuid) -> Result<usize, CoreError> {
    require_staff(actor)?;
    get_conversation(db, id)?;
    let deleted = db.clear_conversation_messages(id)?;
    info!("cleared {deleted} messages from conversation {id}");
    Ok(deleted)
}

/// Remove a conversation entirely. Staff may remove any; a user only their
/// own. Messages cascade with it; notifications keep orphan-safe references.
pub fn delete_conversation(db: &Database, actor: &Actor, id: Uuid) -> Result<(), CoreError> {
    let conversation = get_conversation(db, id)?;
    if !actor.is_staff && conversation.user_id != actor.id {
        return Err(CoreError::not_found("Conversation not found."));
    }
    if !db.delete_conversation(id)? {
        warn!("conversation {id} vanished during delete");
    }
    Ok(())
}

fn get_conversation(db: &Database, id: Uuid) -> Result<Conversation, CoreError> {
    db.get_conversation(id)?
        .ok_or_else(|| CoreError::not_found("Conversation not found."))
}

fn require_staff(actor: &Actor) -> Result<(), CoreError> {
    if actor.is_staff {
        Ok(())
    } else {
        Err(CoreError::permission("Staff only."))
    }
}

fn validate_draft(
    input: &SendMessageRequest,
) -> Result<(String, Option<Attachment>), CoreError> {
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
    use crate::testing::{RecordingPublisher, actor_for, seed_staff, seed_user, test_db};
    use reunite_types::models::NotificationKind;

    fn draft(text: &str) -> SendMessageRequest {
        SendMessageRequest {
            text: Some(text.to_string()),
            reply_to_message_id: None,
            attachment: None,
        }
    }

    fn new_conversation() -> NewConversation {
        NewConversation {
            pet_kind: Some(PetKind::Lost),
            pet_unique_id: Some("LP000042".into()),
            pet_name: Some("Bruno".into()),
            reason: "I think I saw him".into(),
        }
    }

    #[test]
    fn request_accept_confirm_walk() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        // Scenario 1: creation lands in `requested`, staff get chat_request.
        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        assert_eq!(convo.status, ConversationStatus::Requested);
        let staff_notifs = db.list_notifications_for_recipient(staff.id).unwrap();
        assert_eq!(staff_notifs.len(), 1);
        assert_eq!(staff_notifs[0].kind, NotificationKind::ChatRequest);

        // Scenario 2: staff accept claims the admin slot and posts the
        // system announcement; the owner gets a chat_accepted notification.
        let convo = accept_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        assert_eq!(convo.status, ConversationStatus::PendingUser);
        assert_eq!(convo.admin_id, Some(staff.id));
        let views = list_messages(&db, &actor_for(&staff), convo.id).unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].is_system);
        assert_eq!(views[0].text.as_deref(), Some("Admin accepted the chat request."));
        let user_notifs = db.list_notifications_for_recipient(user.id).unwrap();
        assert_eq!(user_notifs.len(), 1);
        assert_eq!(user_notifs[0].kind, NotificationKind::ChatAccepted);

        // Scenario 3: the owner confirms; both sides may now post.
        let convo = confirm_conversation(&db, &publisher, &actor_for(&user), convo.id).unwrap();
        assert_eq!(convo.status, ConversationStatus::Active);
        post_message(&db, &publisher, &actor_for(&user), convo.id, draft("hi")).unwrap();
        post_message(&db, &publisher, &actor_for(&staff), convo.id, draft("hello")).unwrap();
    }

    #[test]
    fn no_direct_jump_from_requested_to_active() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        let err = set_conversation_status(
            &db,
            &publisher,
            &actor_for(&staff),
            convo.id,
            ConversationStatus::Active,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::StateConflict(_)));
        assert_eq!(
            db.get_conversation(convo.id).unwrap().unwrap().status,
            ConversationStatus::Requested
        );
    }

    #[test]
    fn confirm_requires_pending_user_and_ownership() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let other = seed_user(&db, "noor");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();

        let err = confirm_conversation(&db, &publisher, &actor_for(&other), convo.id).unwrap_err();
        assert!(matches!(err, CoreError::Permission(_)));

        let err = confirm_conversation(&db, &publisher, &actor_for(&user), convo.id).unwrap_err();
        assert!(matches!(err, CoreError::StateConflict(_)));
    }

    #[test]
    fn close_is_idempotent() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        close_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        let count_after_first = list_messages(&db, &actor_for(&staff), convo.id).unwrap().len();

        let again = close_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        assert_eq!(again.status, ConversationStatus::Closed);
        let count_after_second = list_messages(&db, &actor_for(&staff), convo.id).unwrap().len();
        assert_eq!(count_after_first, count_after_second);
    }

    #[test]
    fn closing_a_request_notifies_the_rejected_class() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        close_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();

        let kinds: Vec<NotificationKind> = db
            .list_notifications_for_recipient(user.id)
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert!(kinds.contains(&NotificationKind::ChatRejected));
    }

    #[test]
    fn posting_rules_follow_status_and_role() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();

        // Nobody posts into `requested`.
        assert!(matches!(
            post_message(&db, &publisher, &actor_for(&user), convo.id, draft("hi")),
            Err(CoreError::StateConflict(_))
        ));
        assert!(matches!(
            post_message(&db, &publisher, &actor_for(&staff), convo.id, draft("hi")),
            Err(CoreError::StateConflict(_))
        ));

        // Staff may post while the user confirmation is pending; the user
        // may not.
        accept_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        post_message(&db, &publisher, &actor_for(&staff), convo.id, draft("hello")).unwrap();
        assert!(matches!(
            post_message(&db, &publisher, &actor_for(&user), convo.id, draft("hi")),
            Err(CoreError::StateConflict(_))
        ));

        // Read-only: staff yes, user no.
        confirm_conversation(&db, &publisher, &actor_for(&user), convo.id).unwrap();
        set_conversation_status(
            &db,
            &publisher,
            &actor_for(&staff),
            convo.id,
            ConversationStatus::ReadOnly,
        )
        .unwrap();
        post_message(&db, &publisher, &actor_for(&staff), convo.id, draft("note")).unwrap();
        assert!(matches!(
            post_message(&db, &publisher, &actor_for(&user), convo.id, draft("hi")),
            Err(CoreError::StateConflict(_))
        ));

        // Outsiders are rejected on permission, not state.
        let outsider = seed_user(&db, "noor");
        assert!(matches!(
            post_message(&db, &publisher, &actor_for(&outsider), convo.id, draft("hi")),
            Err(CoreError::Permission(_))
        ));
    }

    #[test]
    fn message_requires_text_or_attachment() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        accept_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        confirm_conversation(&db, &publisher, &actor_for(&user), convo.id).unwrap();

        let err = post_message(
            &db,
            &publisher,
            &actor_for(&user),
            convo.id,
            SendMessageRequest {
                text: Some("   ".into()),
                reply_to_message_id: None,
                attachment: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        // Attachment alone is enough.
        post_message(
            &db,
            &publisher,
            &actor_for(&user),
            convo.id,
            SendMessageRequest {
                text: None,
                reply_to_message_id: None,
                attachment: Some(reunite_types::api::AttachmentUpload {
                    kind: reunite_types::models::AttachmentKind::Image,
                    name: "bruno.jpg".into(),
                    size: 2048,
                    storage_ref: "chat/2025/bruno.jpg".into(),
                }),
            },
        )
        .unwrap();
    }

    #[test]
    fn reply_must_stay_inside_the_conversation() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        let other = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        for c in [&convo, &other] {
            accept_conversation(&db, &publisher, &actor_for(&staff), c.id).unwrap();
            confirm_conversation(&db, &publisher, &actor_for(&user), c.id).unwrap();
        }
        let elsewhere =
            post_message(&db, &publisher, &actor_for(&user), other.id, draft("over here"))
                .unwrap();

        let err = post_message(
            &db,
            &publisher,
            &actor_for(&user),
            convo.id,
            SendMessageRequest {
                text: Some("reply".into()),
                reply_to_message_id: Some(elsewhere.id),
                attachment: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn soft_delete_semantics() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        accept_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        confirm_conversation(&db, &publisher, &actor_for(&user), convo.id).unwrap();

        let posted =
            post_message(&db, &publisher, &actor_for(&user), convo.id, draft("oops")).unwrap();

        // Delete for me hides it for the caller only, idempotently.
        let mine = delete_message_for_me(&db, &actor_for(&user), convo.id, posted.id).unwrap();
        assert!(mine.is_deleted_for_me);
        assert_eq!(mine.text, None);
        delete_message_for_me(&db, &actor_for(&user), convo.id, posted.id).unwrap();
        let stored = db.get_chat_message(convo.id, posted.id).unwrap().unwrap();
        assert_eq!(stored.deleted_for, vec![user.id]);

        // Staff still see the original text.
        let staff_views = list_messages(&db, &actor_for(&staff), convo.id).unwrap();
        let staff_view = staff_views.iter().find(|v| v.id == posted.id).unwrap();
        assert_eq!(staff_view.text.as_deref(), Some("oops"));

        // Only the sender deletes for everyone.
        let err = delete_message_for_everyone(&db, &actor_for(&staff), convo.id, posted.id)
            .unwrap_err();
        assert!(matches!(err, CoreError::Permission(_)));
        let gone = delete_message_for_everyone(&db, &actor_for(&user), convo.id, posted.id)
            .unwrap();
        assert!(gone.is_deleted);

        // Every viewer now sees the placeholder.
        let staff_views = list_messages(&db, &actor_for(&staff), convo.id).unwrap();
        let staff_view = staff_views.iter().find(|v| v.id == posted.id).unwrap();
        assert_eq!(
            staff_view.text.as_deref(),
            Some(reunite_types::models::DELETED_PLACEHOLDER)
        );
    }

    #[test]
    fn system_messages_cannot_be_deleted_for_everyone() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        accept_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        let system = list_messages(&db, &actor_for(&staff), convo.id).unwrap();
        let err = delete_message_for_everyone(&db, &actor_for(&staff), convo.id, system[0].id)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn reply_preview_shows_placeholder_after_global_delete() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        accept_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        confirm_conversation(&db, &publisher, &actor_for(&user), convo.id).unwrap();

        let original =
            post_message(&db, &publisher, &actor_for(&user), convo.id, draft("secret")).unwrap();
        let reply = post_message(
            &db,
            &publisher,
            &actor_for(&staff),
            convo.id,
            SendMessageRequest {
                text: Some("about that".into()),
                reply_to_message_id: Some(original.id),
                attachment: None,
            },
        )
        .unwrap();
        delete_message_for_everyone(&db, &actor_for(&user), convo.id, original.id).unwrap();

        // Scenario 5: the preview never leaks the original text.
        for viewer in [&user, &staff] {
            let views = list_messages(&db, &actor_for(viewer), convo.id).unwrap();
            let view = views.iter().find(|v| v.id == reply.id).unwrap();
            let preview = view.reply_to.as_ref().unwrap();
            assert_eq!(
                preview.text.as_deref(),
                Some(reunite_types::models::DELETED_PLACEHOLDER)
            );
        }
    }

    #[test]
    fn staff_only_transitions_reject_users() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        for result in [
            accept_conversation(&db, &publisher, &actor_for(&user), convo.id),
            close_conversation(&db, &publisher, &actor_for(&user), convo.id),
            set_conversation_status(
                &db,
                &publisher,
                &actor_for(&user),
                convo.id,
                ConversationStatus::ReadOnly,
            ),
        ] {
            assert!(matches!(result.unwrap_err(), CoreError::Permission(_)));
        }
    }

    #[test]
    fn clear_messages_keeps_the_conversation() {
        let db = test_db();
        let user = seed_user(&db, "asha");
        let staff = seed_staff(&db, "admin-a");
        let publisher = RecordingPublisher::default();

        let convo = create_conversation(&db, &publisher, &actor_for(&user), new_conversation())
            .unwrap();
        accept_conversation(&db, &publisher, &actor_for(&staff), convo.id).unwrap();
        confirm_conversation(&db, &publisher, &actor_for(&user), convo.id).unwrap();
        post_message(&db, &publisher, &actor_for(&user), convo.id, draft("hi")).unwrap();

        let deleted = clear_messages(&db, &actor_for(&staff), convo.id).unwrap();
        assert!(deleted >= 3);
        assert!(list_messages(&db, &actor_for(&staff), convo.id).unwrap().is_empty());
        assert!(db.get_conversation(convo.id).unwrap().is_some());
    }
}
