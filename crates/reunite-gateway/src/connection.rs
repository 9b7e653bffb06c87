use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use reunite_core::CoreError;
use reunite_db::Database;
use reunite_types::api::{Claims, SendMessageRequest};
use reunite_types::events::{ChannelId, GatewayCommand, GatewayEvent};
use reunite_types::models::Actor;

use crate::dispatcher::Dispatcher;

/// Handle a pre-authenticated WebSocket connection. The JWT was validated at
/// the HTTP upgrade, so the session starts with a Ready frame and is
/// subscribed to its personal channel (plus the staff broadcast channel for
/// staff) immediately. Room channels are joined on request, with membership
/// re-checked against the store at join time.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    claims: Claims,
) {
    let actor = claims.actor();
    info!("{} ({}) connected to gateway", actor.username, actor.id);

    let (sink, stream) = socket.split();
    // Everything outbound funnels through one queue so the socket writer has
    // a single owner.
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    let ready = GatewayEvent::Ready {
        user_id: actor.id,
        username: actor.username.clone(),
        is_staff: actor.is_staff,
    };
    let _ = tx.send(serde_json::to_string(&ready).unwrap());

    let mut forwarders = vec![spawn_forwarder(
        dispatcher.subscribe(&ChannelId::User(actor.id)),
        tx.clone(),
    )];
    if actor.is_staff {
        forwarders.push(spawn_forwarder(
            dispatcher.subscribe(&ChannelId::Staff),
            tx.clone(),
        ));
    }

    let mut send_task = tokio::spawn(run_send_loop(sink, rx));
    let recv_actor = actor.clone();
    let recv_dispatcher = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        run_recv_loop(stream, recv_dispatcher, db, recv_actor, tx).await;
    });

    // A connection closing never affects in-flight state mutations; those
    // run to completion inside spawn_blocking.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    for handle in forwarders {
        handle.abort();
    }
    info!("{} ({}) disconnected from gateway", actor.username, actor.id);
}

/// Pipe one subscribed channel into the connection's outbound queue. A
/// lagged receiver skips ahead: push is best-effort, REST retrieval is the
/// durability guarantee.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<String>,
    tx: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(text) => {
                    if tx.send(text).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("gateway subscriber lagged by {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn run_send_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = rx.recv().await {
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

async fn run_recv_loop(
    mut stream: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    actor: Actor,
    tx: mpsc::UnboundedSender<String>,
) {
    // room_id -> forwarder piping that room channel into this connection.
    let mut rooms: HashMap<Uuid, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                Ok(cmd) => {
                    handle_command(&dispatcher, &db, &actor, &tx, &mut rooms, cmd).await;
                }
                Err(e) => {
                    warn!(
                        "{} ({}) bad command: {} -- raw: {}",
                        actor.username,
                        actor.id,
                        e,
                        &text[..text.len().min(200)]
                    );
                    send_event(
                        &tx,
                        &GatewayEvent::Error {
                            message: "Unrecognized command.".into(),
                        },
                    );
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    for (_, handle) in rooms {
        handle.abort();
    }
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    actor: &Actor,
    tx: &mpsc::UnboundedSender<String>,
    rooms: &mut HashMap<Uuid, JoinHandle<()>>,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::JoinRoom { room_id } => {
            if rooms.contains_key(&room_id) {
                return;
            }
            // Membership is re-checked at join time, never cached from an
            // earlier grant.
            match check_membership(db.clone(), room_id, actor.id).await {
                Ok(true) => {
                    info!("{} ({}) joined room {}", actor.username, actor.id, room_id);
                    rooms.insert(
                        room_id,
                        spawn_forwarder(
                            dispatcher.subscribe(&ChannelId::Room(room_id)),
                            tx.clone(),
                        ),
                    );
                }
                Ok(false) => send_event(
                    tx,
                    &GatewayEvent::Error {
                        message: "You are not a participant in this chatroom.".into(),
                    },
                ),
                Err(e) => {
                    warn!("membership check for room {room_id} failed: {e:#}");
                    send_event(
                        tx,
                        &GatewayEvent::Error {
                            message: "Internal error.".into(),
                        },
                    );
                }
            }
        }

        GatewayCommand::LeaveRoom { room_id } => {
            if let Some(handle) = rooms.remove(&room_id) {
                handle.abort();
            }
        }

        GatewayCommand::SendMessage {
            room_id,
            text,
            reply_to_message_id,
        } => {
            // Same persistence + fan-out path as the REST endpoint; the
            // broadcast onto the room channel happens inside the engine.
            let db = db.clone();
            let publisher = dispatcher.clone();
            let actor = actor.clone();
            let input = SendMessageRequest {
                text,
                reply_to_message_id,
                attachment: None,
            };
            let result = tokio::task::spawn_blocking(move || {
                reunite_core::chatroom::post_message(&db, &publisher, &actor, room_id, input)
            })
            .await;

            match result {
                Ok(Ok(view)) => {
                    // A sender who never joined the room channel still gets
                    // their own message echoed back.
                    if !rooms.contains_key(&room_id) {
                        send_event(tx, &GatewayEvent::MessageCreate { message: view });
                    }
                }
                Ok(Err(e)) => send_event(
                    tx,
                    &GatewayEvent::Error {
                        message: user_facing(&e),
                    },
                ),
                Err(e) => {
                    warn!("send_message join error: {e}");
                    send_event(
                        tx,
                        &GatewayEvent::Error {
                            message: "Internal error.".into(),
                        },
                    );
                }
            }
        }
    }
}

async fn check_membership(db: Arc<Database>, room_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || {
        let Some(room) = db.get_chatroom(room_id)? else {
            return Ok(false);
        };
        if !room.is_active {
            return Ok(false);
        }
        db.is_active_participant(room_id, user_id)
    })
    .await?
}

fn send_event(tx: &mpsc::UnboundedSender<String>, event: &GatewayEvent) {
    let _ = tx.send(serde_json::to_string(event).unwrap());
}

/// Structured reason only; raw internal errors never reach the wire.
fn user_facing(e: &CoreError) -> String {
    match e {
        CoreError::Internal(_) => "Internal error.".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reunite_core::Publisher;
    use reunite_types::models::{
        Chatroom, ChatroomParticipant, ParticipantRole, PetKind, User,
    };

    fn seed_user(db: &Database, username: &str, is_staff: bool) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.into(),
            display_name: None,
            is_staff,
            created_at: Utc::now(),
        };
        db.insert_user(&user).unwrap();
        user
    }

    fn seed_room(db: &Database, creator: &User) -> Chatroom {
        let now = Utc::now();
        let room = Chatroom {
            id: Uuid::new_v4(),
            name: "Bruno - Lost Case".into(),
            conversation_id: None,
            pet_unique_id: Some("LP000042".into()),
            pet_kind: Some(PetKind::Lost),
            pet_name: Some("Bruno".into()),
            purpose: "Lost Pet Case".into(),
            created_by: Some(creator.id),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.insert_chatroom(&room).unwrap();
        room
    }

    fn join_room(db: &Database, room: &Chatroom, user: &User) {
        db.insert_participant(&ChatroomParticipant {
            id: Uuid::new_v4(),
            chatroom_id: room.id,
            user_id: user.id,
            role: ParticipantRole::RequestedUser,
            joined_at: Utc::now(),
            is_active: true,
        })
        .unwrap();
    }

    #[tokio::test]
    async fn join_room_requires_active_membership() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let staff = seed_user(&db, "admin-a", true);
        let outsider = seed_user(&db, "noor", false);
        let room = seed_room(&db, &staff);

        let actor = Actor {
            id: outsider.id,
            username: outsider.username.clone(),
            is_staff: false,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut rooms = HashMap::new();

        handle_command(
            &dispatcher,
            &db,
            &actor,
            &tx,
            &mut rooms,
            GatewayCommand::JoinRoom { room_id: room.id },
        )
        .await;

        assert!(rooms.is_empty());
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("not a participant"));
    }

    #[tokio::test]
    async fn membership_is_rechecked_not_cached() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let staff = seed_user(&db, "admin-a", true);
        let user = seed_user(&db, "asha", false);
        let room = seed_room(&db, &staff);
        join_room(&db, &room, &user);

        let actor = Actor {
            id: user.id,
            username: user.username.clone(),
            is_staff: false,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut rooms = HashMap::new();

        handle_command(
            &dispatcher,
            &db,
            &actor,
            &tx,
            &mut rooms,
            GatewayCommand::JoinRoom { room_id: room.id },
        )
        .await;
        assert!(rooms.contains_key(&room.id));

        // Revoke, leave, and try again: the fresh check refuses the rejoin.
        db.deactivate_participant(room.id, user.id).unwrap();
        handle_command(
            &dispatcher,
            &db,
            &actor,
            &tx,
            &mut rooms,
            GatewayCommand::LeaveRoom { room_id: room.id },
        )
        .await;
        handle_command(
            &dispatcher,
            &db,
            &actor,
            &tx,
            &mut rooms,
            GatewayCommand::JoinRoom { room_id: room.id },
        )
        .await;
        assert!(!rooms.contains_key(&room.id));
    }

    #[tokio::test]
    async fn inbound_send_persists_and_broadcasts() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let staff = seed_user(&db, "admin-a", true);
        let user = seed_user(&db, "asha", false);
        let room = seed_room(&db, &staff);
        join_room(&db, &room, &user);

        let mut room_rx = dispatcher.subscribe(&ChannelId::Room(room.id));
        let actor = Actor {
            id: user.id,
            username: user.username.clone(),
            is_staff: false,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut rooms = HashMap::new();
        handle_command(
            &dispatcher,
            &db,
            &actor,
            &tx,
            &mut rooms,
            GatewayCommand::JoinRoom { room_id: room.id },
        )
        .await;

        handle_command(
            &dispatcher,
            &db,
            &actor,
            &tx,
            &mut rooms,
            GatewayCommand::SendMessage {
                room_id: room.id,
                text: Some("hello from the socket".into()),
                reply_to_message_id: None,
            },
        )
        .await;

        // Persisted...
        let stored = db.list_room_messages(room.id).unwrap();
        assert_eq!(stored.len(), 1);
        // ...and broadcast to the room channel.
        let frame = room_rx.recv().await.unwrap();
        assert!(frame.contains("hello from the socket"));
    }

    #[tokio::test]
    async fn failed_send_returns_an_error_frame() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let staff = seed_user(&db, "admin-a", true);
        let user = seed_user(&db, "asha", false);
        let room = seed_room(&db, &staff);
        join_room(&db, &room, &user);

        let actor = Actor {
            id: user.id,
            username: user.username.clone(),
            is_staff: false,
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut rooms = HashMap::new();

        handle_command(
            &dispatcher,
            &db,
            &actor,
            &tx,
            &mut rooms,
            GatewayCommand::SendMessage {
                room_id: room.id,
                text: Some("   ".into()),
                reply_to_message_id: None,
            },
        )
        .await;

        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("\"error\""));
        assert!(db.list_room_messages(room.id).unwrap().is_empty());
    }

    #[test]
    fn internal_errors_are_not_leaked() {
        let err = CoreError::Internal(anyhow::anyhow!("UNIQUE constraint failed: users.id"));
        assert_eq!(user_facing(&err), "Internal error.");
        let err = CoreError::Validation("Message requires text or an attachment.".into());
        assert_eq!(user_facing(&err), "Message requires text or an attachment.");
    }

    #[tokio::test]
    async fn engine_publish_reaches_a_dispatcher_subscriber() {
        // End-to-end: REST-side engine call, gateway-side subscriber.
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let staff = seed_user(&db, "admin-a", true);
        let user = seed_user(&db, "asha", false);
        let room = seed_room(&db, &staff);
        join_room(&db, &room, &user);

        let mut rx = dispatcher.subscribe(&ChannelId::Room(room.id));
        let actor = Actor {
            id: user.id,
            username: user.username.clone(),
            is_staff: false,
        };
        reunite_core::chatroom::post_message(
            &db,
            &dispatcher,
            &actor,
            room.id,
            SendMessageRequest {
                text: Some("over REST".into()),
                reply_to_message_id: None,
                attachment: None,
            },
        )
        .unwrap();
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("over REST"));
        let _ = dispatcher.publish(&ChannelId::Staff, &GatewayEvent::Error { message: "x".into() });
    }
}
