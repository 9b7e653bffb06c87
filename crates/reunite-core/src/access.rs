//! The access-request workflow: staff invitations that the invitee accepts
//! or rejects, and the administrative direct-add fast path. Both paths
//! resolve through the same grant operation so their side effects cannot
//! drift apart, and both reuse the one active chatroom for a pet case
//! instead of materializing duplicates.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use reunite_db::Database;
use reunite_types::api::AccessRequestView;
use reunite_types::models::{
    Actor, Chatroom, ChatroomAccessRequest, ChatroomParticipant, ParticipantRole, PetKind,
    RequestStatus, RequestType, User,
};

use crate::chatroom;
use crate::notify::{self, Event};
use crate::render;
use crate::{CoreError, Publisher};

pub struct NewInvitation {
    pub user_id: Uuid,
    pub chatroom_id: Option<Uuid>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<PetKind>,
    pub pet_name: Option<String>,
    pub conversation_id: Option<Uuid>,
    pub role: ParticipantRole,
}

pub struct AddParticipant {
    pub user_id: Uuid,
    pub chatroom_id: Option<Uuid>,
    pub pet_unique_id: Option<String>,
    pub pet_kind: Option<PetKind>,
    pub pet_name: Option<String>,
    pub conversation_id: Option<Uuid>,
    pub role: ParticipantRole,
}

/// Staff invite a user. With a chatroom this is a join request; without one
/// it is a creation request that materializes the room on acceptance. The
/// invited user is notified; nothing else changes until they respond.
pub fn create_invitation(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    input: NewInvitation,
) -> Result<ChatroomAccessRequest, CoreError> {
    require_staff(actor)?;
    let invited = get_user(db, input.user_id)?;

    let request_type = match input.chatroom_id {
        Some(chatroom_id) => {
            let room = chatroom::get_active_room(db, chatroom_id)?;
            if db.is_active_participant(room.id, invited.id)? {
                return Err(CoreError::conflict(
                    "User is already a member of this chatroom.",
                ));
            }
            RequestType::JoinRequest
        }
        None => {
            if let Some(pet) = input.pet_unique_id.as_deref() {
                if db.has_pending_creation_request(invited.id, pet)? {
                    return Err(CoreError::conflict(
                        "A pending chatroom invitation already exists for this user and pet.",
                    ));
                }
                if let Some(room) = db.find_active_chatroom_by_pet(pet)? {
                    if db.is_active_participant(room.id, invited.id)? {
                        return Err(CoreError::conflict(
                            "User is already a member of this chatroom.",
                        ));
                    }
                }
            }
            RequestType::CreationRequest
        }
    };

    let request = ChatroomAccessRequest {
        id: Uuid::new_v4(),
        chatroom_id: input.chatroom_id,
        pet_unique_id: input.pet_unique_id,
        pet_kind: input.pet_kind,
        pet_name: input.pet_name,
        requested_user_id: invited.id,
        added_by_id: actor.id,
        conversation_id: input.conversation_id,
        role: input.role,
        request_type,
        status: RequestStatus::Pending,
        created_at: Utc::now(),
        responded_at: None,
    };
    db.insert_access_request(&request)?;
    info!(
        "{} invited {} ({:?})",
        actor.username,
        invited.username,
        request.request_type
    );

    notify::fan_out(db, publisher, actor, Event::AccessRequestCreated { request: &request });
    Ok(request)
}

/// The invitee accepts. Join requests grant membership in the existing room;
/// creation requests first materialize the room (or adopt the active room
/// for the same pet), then grant membership for both the invitee and the
/// inviting staff member. Exactly one accept or reject wins per request.
pub fn accept_request(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    request_id: Uuid,
) -> Result<ChatroomAccessRequest, CoreError> {
    let request = get_request_for(db, actor, request_id)?;

    match request.request_type {
        RequestType::JoinRequest => {
            let chatroom_id = request.chatroom_id.ok_or_else(|| {
                CoreError::validation("Chatroom not found for this request.")
            })?;
            let room = chatroom::get_active_room(db, chatroom_id)?;
            if db.is_active_participant(room.id, actor.id)? {
                return Err(CoreError::conflict(
                    "User is already a member of this chatroom.",
                ));
            }

            resolve(db, &request, actor, RequestStatus::Accepted)?;
            ensure_member(db, room.id, actor.id, request.role)?;
            chatroom::post_system_message(
                db,
                publisher,
                room.id,
                actor.id,
                &format!("{} accepted the chat request.", actor.username),
            )?;
        }
        RequestType::CreationRequest => {
            // Adopting an existing room must fail the same way the direct
            // path would when the user is already inside it.
            let existing = match request.pet_unique_id.as_deref() {
                Some(pet) => db.find_active_chatroom_by_pet(pet)?,
                None => None,
            };
            if let Some(room) = &existing {
                if db.is_active_participant(room.id, actor.id)? {
                    return Err(CoreError::conflict(
                        "User is already a member of this chatroom.",
                    ));
                }
            }

            resolve(db, &request, actor, RequestStatus::Accepted)?;

            let inviter = get_user(db, request.added_by_id)?;
            let room = match existing {
                Some(room) => {
                    ensure_member(db, room.id, inviter.id, ParticipantRole::Admin)?;
                    room
                }
                None => create_room(
                    db,
                    publisher,
                    &inviter,
                    NewRoom {
                        pet_unique_id: request.pet_unique_id.clone(),
                        pet_kind: request.pet_kind,
                        pet_name: pet_name_for(db, &request)?,
                        conversation_id: request.conversation_id,
                    },
                )?,
            };
            db.link_access_request_chatroom(request.id, room.id)?;
            ensure_member(db, room.id, actor.id, request.role)?;
            chatroom::post_system_message(
                db,
                publisher,
                room.id,
                actor.id,
                &format!("{} accepted the chatroom invitation.", actor.username),
            )?;
        }
    }

    let updated = db
        .get_access_request(request_id)?
        .ok_or_else(|| CoreError::not_found("Access request not found."))?;
    notify::fan_out(
        db,
        publisher,
        actor,
        Event::AccessRequestResolved {
            request: &updated,
            accepted: true,
        },
    );
    Ok(updated)
}

/// The invitee declines. No room is created, no membership changes; the
/// inviting staff member is notified.
pub fn reject_request(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    request_id: Uuid,
) -> Result<ChatroomAccessRequest, CoreError> {
    let request = get_request_for(db, actor, request_id)?;
    resolve(db, &request, actor, RequestStatus::Rejected)?;

    let updated = db
        .get_access_request(request_id)?
        .ok_or_else(|| CoreError::not_found("Access request not found."))?;
    notify::fan_out(
        db,
        publisher,
        actor,
        Event::AccessRequestResolved {
            request: &updated,
            accepted: false,
        },
    );
    Ok(updated)
}

/// Administrative fast path: staff add a user to a room (creating the room
/// for the pet case if needed) with no approval round-trip. Side effects
/// are identical to an accepted join request.
pub fn direct_add(
    db: &Database,
    publisher: &dyn Publisher,
    actor: &Actor,
    input: AddParticipant,
) -> Result<(Chatroom, ChatroomParticipant), CoreError> {
    require_staff(actor)?;
    let user = get_user(db, input.user_id)?;

    let room = match input.chatroom_id {
        Some(chatroom_id) => chatroom::get_active_room(db, chatroom_id)?,
        None => {
            let existing = match input.pet_unique_id.as_deref() {
                Some(pet) => db.find_active_chatroom_by_pet(pet)?,
                None => None,
            };
            match existing {
                Some(room) => room,
                None => {
                    let inviter = get_user(db, actor.id)?;
                    create_room(
                        db,
                        publisher,
                        &inviter,
                        NewRoom {
                            pet_unique_id: input.pet_unique_id.clone(),
                            pet_kind: input.pet_kind,
                            pet_name: input.pet_name.clone(),
                            conversation_id: input.conversation_id,
                        },
                    )?
                }
            }
        }
    };

    let participant = grant_participation(db, room.id, user.id, input.role)?;
    chatroom::post_system_message(
        db,
        publisher,
        room.id,
        actor.id,
        &format!(
            "{} was added to the chatroom by {}.",
            user.label(),
            actor.username
        ),
    )?;
    notify::fan_out(
        db,
        publisher,
        actor,
        Event::ParticipantAdded {
            chatroom: &room,
            user: &user,
        },
    );
    Ok((room, participant))
}

pub fn list_my_requests(db: &Database, actor: &Actor) -> Result<Vec<AccessRequestView>, CoreError> {
    db.list_access_requests_for_user(actor.id)?
        .iter()
        .map(|request| request_view(db, request))
        .collect()
}

pub fn list_requests_for_conversation(
    db: &Database,
    actor: &Actor,
    conversation_id: Uuid,
) -> Result<Vec<AccessRequestView>, CoreError> {
    require_staff(actor)?;
    db.list_access_requests_for_conversation(conversation_id)?
        .iter()
        .map(|request| request_view(db, request))
        .collect()
}

pub fn list_requests_for_chatroom(
    db: &Database,
    actor: &Actor,
    chatroom_id: Uuid,
) -> Result<Vec<AccessRequestView>, CoreError> {
    require_staff(actor)?;
    db.list_access_requests_for_chatroom(chatroom_id)?
        .iter()
        .map(|request| request_view(db, request))
        .collect()
}

pub fn request_view(
    db: &Database,
    request: &ChatroomAccessRequest,
) -> Result<AccessRequestView, CoreError> {
    let requested_user = render::summary_for(db, request.requested_user_id)?
        .ok_or_else(|| anyhow::anyhow!("request {} user missing", request.id))?;
    let added_by = render::summary_for(db, request.added_by_id)?
        .ok_or_else(|| anyhow::anyhow!("request {} inviter missing", request.id))?;
    Ok(AccessRequestView {
        id: request.id,
        chatroom_id: request.chatroom_id,
        pet_unique_id: request.pet_unique_id.clone(),
        pet_kind: request.pet_kind,
        pet_name: request.pet_name.clone(),
        requested_user,
        added_by,
        conversation_id: request.conversation_id,
        role: request.role,
        request_type: request.request_type,
        status: request.status,
        created_at: request.created_at,
        responded_at: request.responded_at,
    })
}

// -- Shared internals --

struct NewRoom {
    pet_unique_id: Option<String>,
    pet_kind: Option<PetKind>,
    pet_name: Option<String>,
    conversation_id: Option<Uuid>,
}

/// Visible only to the invitee, and only while pending. A resolved request
/// reads as a conflict, a foreign one as not found.
fn get_request_for(
    db: &Database,
    actor: &Actor,
    request_id: Uuid,
) -> Result<ChatroomAccessRequest, CoreError> {
    let request = db
        .get_access_request(request_id)?
        .ok_or_else(|| CoreError::not_found("Access request not found or already processed."))?;
    if request.requested_user_id != actor.id {
        return Err(CoreError::not_found(
            "Access request not found or already processed.",
        ));
    }
    if request.status != RequestStatus::Pending {
        return Err(CoreError::conflict(
            "Access request not found or already processed.",
        ));
    }
    Ok(request)
}

/// Conditional flip out of `pending`; the loser of a race observes the
/// conflict rather than double-applying side effects.
fn resolve(
    db: &Database,
    request: &ChatroomAccessRequest,
    actor: &Actor,
    outcome: RequestStatus,
) -> Result<(), CoreError> {
    let changed = db.resolve_access_request(request.id, actor.id, outcome, None, Utc::now())?;
    if changed {
        Ok(())
    } else {
        Err(CoreError::conflict(
            "Access request not found or already processed.",
        ))
    }
}

fn create_room(
    db: &Database,
    publisher: &dyn Publisher,
    creator: &User,
    input: NewRoom,
) -> Result<Chatroom, CoreError> {
    let now = Utc::now();
    let room = Chatroom {
        id: Uuid::new_v4(),
        name: derive_room_name(input.pet_name.as_deref(), input.pet_kind),
        conversation_id: input.conversation_id,
        pet_unique_id: input.pet_unique_id,
        pet_kind: input.pet_kind,
        pet_name: input.pet_name,
        purpose: derive_purpose(input.pet_kind),
        created_by: Some(creator.id),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    db.insert_chatroom(&room)?;
    ensure_member(db, room.id, creator.id, ParticipantRole::Admin)?;
    chatroom::post_system_message(
        db,
        publisher,
        room.id,
        creator.id,
        &format!("Chatroom created by {}.", creator.label()),
    )?;
    info!("chatroom {} ({}) created", room.id, room.name);
    Ok(room)
}

/// Strict grant used for the person being invited or added: an active
/// membership is a conflict, a deactivated one is revived with the new role.
fn grant_participation(
    db: &Database,
    chatroom_id: Uuid,
    user_id: Uuid,
    role: ParticipantRole,
) -> Result<ChatroomParticipant, CoreError> {
    match db.get_participant(chatroom_id, user_id)? {
        Some(existing) if existing.is_active => Err(CoreError::conflict(
            "User is already a member of this chatroom.",
        )),
        Some(existing) => {
            db.reactivate_participant(existing.id, role)?;
            Ok(ChatroomParticipant {
                role,
                is_active: true,
                ..existing
            })
        }
        None => insert_participant(db, chatroom_id, user_id, role),
    }
}

/// Lenient grant used for the inviter/creator side, where already being a
/// member is fine.
fn ensure_member(
    db: &Database,
    chatroom_id: Uuid,
    user_id: Uuid,
    role: ParticipantRole,
) -> Result<ChatroomParticipant, CoreError> {
    match db.get_participant(chatroom_id, user_id)? {
        Some(existing) if existing.is_active => Ok(existing),
        Some(existing) => {
            db.reactivate_participant(existing.id, role)?;
            Ok(ChatroomParticipant {
                role,
                is_active: true,
                ..existing
            })
        }
        None => insert_participant(db, chatroom_id, user_id, role),
    }
}

fn insert_participant(
    db: &Database,
    chatroom_id: Uuid,
    user_id: Uuid,
    role: ParticipantRole,
) -> Result<ChatroomParticipant, CoreError> {
    let participant = ChatroomParticipant {
        id: Uuid::new_v4(),
        chatroom_id,
        user_id,
        role,
        joined_at: Utc::now(),
        is_active: true,
    };
    db.insert_participant(&participant)?;
    Ok(participant)
}

fn pet_name_for(
    db: &Database,
    request: &ChatroomAccessRequest,
) -> Result<Option<String>, CoreError> {
    if request.pet_name.is_some() {
        return Ok(request.pet_name.clone());
    }
    // Fall back to the parent conversation's pet context when the invitation
    // came out of one.
    match request.conversation_id {
        Some(conversation_id) => Ok(db
            .get_conversation(conversation_id)?
            .and_then(|c| c.pet_name)),
        None => Ok(None),
    }
}

fn derive_room_name(pet_name: Option<&str>, kind: Option<PetKind>) -> String {
    let name = pet_name.unwrap_or("Pet");
    match kind {
        Some(kind) => format!("{} - {} Case", name, kind.capitalized()),
        None => format!("{name} - Case"),
    }
}

fn derive_purpose(kind: Option<PetKind>) -> String {
    match kind {
        Some(kind) => format!("{} Pet Case", kind.capitalized()),
        None => "Pet Case".to_string(),
    }
}

fn require_staff(actor: &Actor) -> Result<(), CoreError> {
    if actor.is_staff {
        Ok(())
    } else {
        Err(CoreError::permission("Staff only."))
    }
}

fn get_user(db: &Database, id: Uuid) -> Result<User, CoreError> {
    db.get_user(id)?
        .ok_or_else(|| CoreError::not_found("User not found."))
}
