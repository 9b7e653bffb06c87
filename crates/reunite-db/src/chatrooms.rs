use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use reunite_types::models::{Chatroom, ChatroomParticipant, ParticipantRole, User};

use crate::models::{ChatroomRow, ParticipantRow, UserRow};
use crate::{Database, ts};

const CHATROOM_COLUMNS: &str = "id, name, conversation_id, pet_unique_id, pet_kind, pet_name, \
                                purpose, created_by, is_active, created_at, updated_at";

/// An active participant row joined with its user, for listings.
pub struct ParticipantWithUser {
    pub participant: ChatroomParticipant,
    pub user: User,
}

impl Database {
    pub fn insert_chatroom(&self, room: &Chatroom) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chatrooms
                     (id, name, conversation_id, pet_unique_id, pet_kind, pet_name, purpose,
                      created_by, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    room.id.to_string(),
                    room.name,
                    room.conversation_id.map(|id| id.to_string()),
                    room.pet_unique_id,
                    room.pet_kind.map(|k| k.as_str()),
                    room.pet_name,
                    room.purpose,
                    room.created_by.map(|id| id.to_string()),
                    room.is_active,
                    ts(room.created_at),
                    ts(room.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_chatroom(&self, id: Uuid) -> Result<Option<Chatroom>> {
        self.with_conn(|conn| {
            query_chatroom(conn, id)?
                .map(ChatroomRow::into_model)
                .transpose()
        })
    }

    /// The one active room for a pet case, if any. Both invitation paths use
    /// this to avoid materializing duplicate rooms.
    pub fn find_active_chatroom_by_pet(&self, pet_unique_id: &str) -> Result<Option<Chatroom>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHATROOM_COLUMNS} FROM chatrooms
                 WHERE pet_unique_id = ?1 AND is_active = 1
                 ORDER BY created_at LIMIT 1"
            ))?;
            let row = stmt
                .query_row([pet_unique_id], map_chatroom_row)
                .optional()?;
            row.map(ChatroomRow::into_model).transpose()
        })
    }

    pub fn list_chatrooms_for_user(&self, user_id: Uuid) -> Result<Vec<Chatroom>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM chatrooms c
                 JOIN chatroom_participants p ON p.chatroom_id = c.id
                 WHERE p.user_id = ?1 AND p.is_active = 1 AND c.is_active = 1
                 ORDER BY c.created_at DESC",
                CHATROOM_COLUMNS
                    .split(", ")
                    .map(|col| format!("c.{col}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], map_chatroom_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ChatroomRow::into_model).collect()
        })
    }

    pub fn list_chatrooms(&self) -> Result<Vec<Chatroom>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHATROOM_COLUMNS} FROM chatrooms
                 WHERE is_active = 1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], map_chatroom_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ChatroomRow::into_model).collect()
        })
    }

    /// Destructive removal: messages and participants go with the room.
    pub fn delete_chatroom(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM chatrooms WHERE id = ?1", [id.to_string()])?;
            Ok(changed > 0)
        })
    }

    pub fn clear_room_messages(&self, chatroom_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM chatroom_messages WHERE chatroom_id = ?1",
                [chatroom_id.to_string()],
            )?;
            Ok(deleted)
        })
    }

    // -- Participants --

    pub fn insert_participant(&self, participant: &ChatroomParticipant) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chatroom_participants
                     (id, chatroom_id, user_id, role, joined_at, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    participant.id.to_string(),
                    participant.chatroom_id.to_string(),
                    participant.user_id.to_string(),
                    participant.role.as_str(),
                    ts(participant.joined_at),
                    participant.is_active,
                ],
            )?;
            Ok(())
        })
    }

    /// Any membership row for (room, user), active or deactivated.
    pub fn get_participant(
        &self,
        chatroom_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ChatroomParticipant>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chatroom_id, user_id, role, joined_at, is_active
                 FROM chatroom_participants WHERE chatroom_id = ?1 AND user_id = ?2",
            )?;
            let row = stmt
                .query_row(
                    rusqlite::params![chatroom_id.to_string(), user_id.to_string()],
                    map_participant_row,
                )
                .optional()?;
            row.map(ParticipantRow::into_model).transpose()
        })
    }

    pub fn is_active_participant(&self, chatroom_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chatroom_participants
                     WHERE chatroom_id = ?1 AND user_id = ?2 AND is_active = 1",
                    rusqlite::params![chatroom_id.to_string(), user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(exists.is_some())
        })
    }

    pub fn reactivate_participant(&self, id: Uuid, role: ParticipantRole) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chatroom_participants SET is_active = 1, role = ?1 WHERE id = ?2",
                rusqlite::params![role.as_str(), id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn deactivate_participant(&self, chatroom_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE chatroom_participants SET is_active = 0
                 WHERE chatroom_id = ?1 AND user_id = ?2 AND is_active = 1",
                rusqlite::params![chatroom_id.to_string(), user_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_active_participants(&self, chatroom_id: Uuid) -> Result<Vec<ParticipantWithUser>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.chatroom_id, p.user_id, p.role, p.joined_at, p.is_active,
                        u.id, u.username, u.display_name, u.is_staff, u.created_at
                 FROM chatroom_participants p
                 JOIN users u ON p.user_id = u.id
                 WHERE p.chatroom_id = ?1 AND p.is_active = 1
                 ORDER BY p.role, p.joined_at",
            )?;
            let rows = stmt
                .query_map([chatroom_id.to_string()], |row| {
                    Ok((
                        map_participant_row(row)?,
                        UserRow {
                            id: row.get(6)?,
                            username: row.get(7)?,
                            display_name: row.get(8)?,
                            is_staff: row.get(9)?,
                            created_at: row.get(10)?,
                        },
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|(p, u)| {
                    Ok(ParticipantWithUser {
                        participant: p.into_model()?,
                        user: u.into_model()?,
                    })
                })
                .collect()
        })
    }

    pub fn touch_chatroom(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chatrooms SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![ts(now), id.to_string()],
            )?;
            Ok(())
        })
    }
}

fn query_chatroom(conn: &Connection, id: Uuid) -> Result<Option<ChatroomRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHATROOM_COLUMNS} FROM chatrooms WHERE id = ?1"
    ))?;
    let row = stmt
        .query_row([id.to_string()], map_chatroom_row)
        .optional()?;
    Ok(row)
}

fn map_chatroom_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatroomRow> {
    Ok(ChatroomRow {
        id: row.get(0)?,
        name: row.get(1)?,
        conversation_id: row.get(2)?,
        pet_unique_id: row.get(3)?,
        pet_kind: row.get(4)?,
        pet_name: row.get(5)?,
        purpose: row.get(6)?,
        created_by: row.get(7)?,
        is_active: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_participant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipantRow> {
    Ok(ParticipantRow {
        id: row.get(0)?,
        chatroom_id: row.get(1)?,
        user_id: row.get(2)?,
        role: row.get(3)?,
        joined_at: row.get(4)?,
        is_active: row.get(5)?,
    })
}
