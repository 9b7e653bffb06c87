use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use reunite_types::models::{Attachment, ChatMessage, ChatroomMessage};

use crate::models::{MessageContextRow, MessageRow, encode_deleted_for, parse_deleted_for};
use crate::{Database, ts};

/// Which message table an operation targets. Conversation and chatroom
/// messages share a schema; only the owning column differs.
#[derive(Clone, Copy)]
enum Scope {
    Conversation,
    Chatroom,
}

impl Scope {
    fn table(self) -> &'static str {
        match self {
            Self::Conversation => "chat_messages",
            Self::Chatroom => "chatroom_messages",
        }
    }

    fn parent_column(self) -> &'static str {
        match self {
            Self::Conversation => "conversation_id",
            Self::Chatroom => "chatroom_id",
        }
    }
}

impl Database {
    pub fn insert_chat_message(&self, msg: &ChatMessage) -> Result<()> {
        self.with_conn(|conn| {
            insert_message(
                conn,
                Scope::Conversation,
                &msg.id,
                &msg.conversation_id,
                &msg.sender_id,
                &msg.text,
                msg.reply_to,
                msg.attachment.as_ref(),
                msg.is_system,
                &ts(msg.created_at),
            )
        })
    }

    pub fn insert_room_message(&self, msg: &ChatroomMessage) -> Result<()> {
        self.with_conn(|conn| {
            insert_message(
                conn,
                Scope::Chatroom,
                &msg.id,
                &msg.chatroom_id,
                &msg.sender_id,
                &msg.text,
                msg.reply_to,
                msg.attachment.as_ref(),
                msg.is_system,
                &ts(msg.created_at),
            )
        })
    }

    pub fn get_chat_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<ChatMessage>> {
        self.with_conn(|conn| {
            query_message(conn, Scope::Conversation, conversation_id, message_id)?
                .map(MessageRow::into_chat_message)
                .transpose()
        })
    }

    pub fn get_room_message(
        &self,
        chatroom_id: Uuid,
        message_id: Uuid,
    ) -> Result<Option<ChatroomMessage>> {
        self.with_conn(|conn| {
            query_message(conn, Scope::Chatroom, chatroom_id, message_id)?
                .map(MessageRow::into_room_message)
                .transpose()
        })
    }

    pub fn list_conversation_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageContextRow>> {
        self.with_conn(|conn| query_messages(conn, Scope::Conversation, conversation_id))
    }

    pub fn list_room_messages(&self, chatroom_id: Uuid) -> Result<Vec<MessageContextRow>> {
        self.with_conn(|conn| query_messages(conn, Scope::Chatroom, chatroom_id))
    }

    /// Append the viewer to `deleted_for`. The read-modify-write runs inside
    /// one connection lock, so concurrent appends cannot drop each other.
    /// Returns the resulting set.
    pub fn append_chat_message_deleted_for(
        &self,
        message_id: Uuid,
        viewer: Uuid,
    ) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| append_deleted_for(conn, Scope::Conversation, message_id, viewer))
    }

    pub fn append_room_message_deleted_for(
        &self,
        message_id: Uuid,
        viewer: Uuid,
    ) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| append_deleted_for(conn, Scope::Chatroom, message_id, viewer))
    }

    /// Global tombstone. The row and attachment metadata stay; rendering
    /// substitutes the placeholder for every viewer.
    pub fn mark_chat_message_deleted(&self, message_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| mark_deleted(conn, Scope::Conversation, message_id))
    }

    pub fn mark_room_message_deleted(&self, message_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| mark_deleted(conn, Scope::Chatroom, message_id))
    }
}

#[allow(clippy::too_many_arguments)]
fn insert_message(
    conn: &Connection,
    scope: Scope,
    id: &Uuid,
    parent_id: &Uuid,
    sender_id: &Uuid,
    text: &str,
    reply_to: Option<Uuid>,
    attachment: Option<&Attachment>,
    is_system: bool,
    created_at: &str,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {} (id, {}, sender_id, text, reply_to, attachment_kind, attachment_name,
                         attachment_size, attachment_ref, is_deleted, deleted_for, is_system,
                         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, '[]', ?10, ?11)",
        scope.table(),
        scope.parent_column(),
    );
    conn.execute(
        &sql,
        rusqlite::params![
            id.to_string(),
            parent_id.to_string(),
            sender_id.to_string(),
            text,
            reply_to.map(|r| r.to_string()),
            attachment.map(|a| a.kind.as_str()),
            attachment.map(|a| a.name.as_str()),
            attachment.map(|a| a.size),
            attachment.map(|a| a.storage_ref.as_str()),
            is_system,
            created_at,
        ],
    )?;
    Ok(())
}

fn query_message(
    conn: &Connection,
    scope: Scope,
    parent_id: Uuid,
    message_id: Uuid,
) -> Result<Option<MessageRow>> {
    let sql = format!(
        "SELECT id, {}, sender_id, text, reply_to, attachment_kind, attachment_name,
                attachment_size, attachment_ref, is_deleted, deleted_for, is_system, created_at
         FROM {} WHERE id = ?1 AND {} = ?2",
        scope.parent_column(),
        scope.table(),
        scope.parent_column(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row(
            rusqlite::params![message_id.to_string(), parent_id.to_string()],
            map_message_row,
        )
        .optional()?;
    Ok(row)
}

fn query_messages(conn: &Connection, scope: Scope, parent_id: Uuid) -> Result<Vec<MessageContextRow>> {
    // Sender and reply-target context come back in one query; rendering
    // happens in the core against the viewer identity.
    let sql = format!(
        "SELECT m.id, m.{parent}, m.sender_id, m.text, m.reply_to,
                m.attachment_kind, m.attachment_name, m.attachment_size, m.attachment_ref,
                m.is_deleted, m.deleted_for, m.is_system, m.created_at,
                u.username, u.display_name,
                r.text, r.is_deleted, r.sender_id, ru.username, ru.display_name
         FROM {table} m
         LEFT JOIN users u ON m.sender_id = u.id
         LEFT JOIN {table} r ON m.reply_to = r.id
         LEFT JOIN users ru ON r.sender_id = ru.id
         WHERE m.{parent} = ?1
         ORDER BY m.created_at, m.id",
        table = scope.table(),
        parent = scope.parent_column(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([parent_id.to_string()], |row| {
            Ok(MessageContextRow {
                message: map_message_row(row)?,
                sender_username: row.get(13)?,
                sender_display_name: row.get(14)?,
                reply_text: row.get(15)?,
                reply_is_deleted: row.get::<_, Option<bool>>(16)?.unwrap_or(false),
                reply_sender_id: row.get(17)?,
                reply_sender_username: row.get(18)?,
                reply_sender_display_name: row.get(19)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn append_deleted_for(
    conn: &Connection,
    scope: Scope,
    message_id: Uuid,
    viewer: Uuid,
) -> Result<Vec<Uuid>> {
    let select = format!("SELECT deleted_for FROM {} WHERE id = ?1", scope.table());
    let raw: Option<String> = conn
        .query_row(&select, [message_id.to_string()], |row| row.get(0))
        .optional()?;
    let raw = raw.ok_or_else(|| anyhow::anyhow!("message {} not found", message_id))?;

    let mut ids = parse_deleted_for(&raw)?;
    if !ids.contains(&viewer) {
        ids.push(viewer);
        let update = format!("UPDATE {} SET deleted_for = ?1 WHERE id = ?2", scope.table());
        conn.execute(
            &update,
            rusqlite::params![encode_deleted_for(&ids), message_id.to_string()],
        )?;
    }
    Ok(ids)
}

fn mark_deleted(conn: &Connection, scope: Scope, message_id: Uuid) -> Result<bool> {
    let sql = format!("UPDATE {} SET is_deleted = 1 WHERE id = ?1", scope.table());
    let changed = conn.execute(&sql, [message_id.to_string()])?;
    Ok(changed > 0)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        sender_id: row.get(2)?,
        text: row.get(3)?,
        reply_to: row.get(4)?,
        attachment_kind: row.get(5)?,
        attachment_name: row.get(6)?,
        attachment_size: row.get(7)?,
        attachment_ref: row.get(8)?,
        is_deleted: row.get(9)?,
        deleted_for: row.get(10)?,
        is_system: row.get(11)?,
        created_at: row.get(12)?,
    })
}
