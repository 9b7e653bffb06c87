use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use reunite_types::models::{Conversation, ConversationStatus};

use crate::models::ConversationRow;
use crate::{Database, ts};

const CONVERSATION_COLUMNS: &str = "id, user_id, admin_id, pet_kind, pet_unique_id, pet_name, \
                                    reason, status, created_at, updated_at";

impl Database {
    pub fn insert_conversation(&self, convo: &Conversation) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations
                     (id, user_id, admin_id, pet_kind, pet_unique_id, pet_name, reason, status,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    convo.id.to_string(),
                    convo.user_id.to_string(),
                    convo.admin_id.map(|id| id.to_string()),
                    convo.pet_kind.map(|k| k.as_str()),
                    convo.pet_unique_id,
                    convo.pet_name,
                    convo.reason,
                    convo.status.as_str(),
                    ts(convo.created_at),
                    ts(convo.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| {
            query_conversation(conn, id)?
                .map(ConversationRow::into_model)
                .transpose()
        })
    }

    pub fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE user_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], map_conversation_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ConversationRow::into_model).collect()
        })
    }

    pub fn list_conversations(
        &self,
        status: Option<ConversationStatus>,
    ) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let rows = match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CONVERSATION_COLUMNS} FROM conversations
                         WHERE status = ?1 ORDER BY created_at DESC"
                    ))?;
                    let rows = stmt
                        .query_map([status.as_str()], map_conversation_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CONVERSATION_COLUMNS} FROM conversations
                         ORDER BY created_at DESC"
                    ))?;
                    let rows = stmt
                        .query_map([], map_conversation_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    rows
                }
            };
            rows.into_iter().map(ConversationRow::into_model).collect()
        })
    }

    /// Atomic precondition-checked transition. The row is updated only while
    /// its status is still one of `from`; the affected-row count tells a
    /// racing caller it lost. `claim_admin` fills `admin_id` only when unset.
    pub fn update_conversation_status(
        &self,
        id: Uuid,
        from: &[ConversationStatus],
        to: ConversationStatus,
        claim_admin: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let placeholders: Vec<String> = (0..from.len()).map(|i| format!("?{}", i + 5)).collect();
        let sql = format!(
            "UPDATE conversations
             SET status = ?1, updated_at = ?2, admin_id = COALESCE(admin_id, ?3)
             WHERE id = ?4 AND status IN ({})",
            placeholders.join(", ")
        );
        self.with_conn(|conn| {
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
                Box::new(to.as_str()),
                Box::new(ts(now)),
                Box::new(claim_admin.map(|id| id.to_string())),
                Box::new(id.to_string()),
            ];
            for status in from {
                params.push(Box::new(status.as_str()));
            }
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let changed = conn.execute(&sql, refs.as_slice())?;
            Ok(changed > 0)
        })
    }

    /// First staff touch on an active conversation claims the admin slot.
    pub fn claim_conversation_admin(
        &self,
        id: Uuid,
        admin_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations SET admin_id = ?1, updated_at = ?2
                 WHERE id = ?3 AND admin_id IS NULL",
                rusqlite::params![admin_id.to_string(), ts(now), id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn delete_conversation(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM conversations WHERE id = ?1",
                [id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn clear_conversation_messages(&self, id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM chat_messages WHERE conversation_id = ?1",
                [id.to_string()],
            )?;
            Ok(deleted)
        })
    }
}

fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
    ))?;
    let row = stmt
        .query_row([id.to_string()], map_conversation_row)
        .optional()?;
    Ok(row)
}

fn map_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        admin_id: row.get(2)?,
        pet_kind: row.get(3)?,
        pet_unique_id: row.get(4)?,
        pet_name: row.get(5)?,
        reason: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
