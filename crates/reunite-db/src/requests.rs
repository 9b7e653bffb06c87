use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use reunite_types::models::{ChatroomAccessRequest, RequestStatus};

use crate::models::AccessRequestRow;
use crate::{Database, ts};

const REQUEST_COLUMNS: &str = "id, chatroom_id, pet_unique_id, pet_kind, pet_name, \
                               requested_user_id, added_by_id, conversation_id, role, \
                               request_type, status, created_at, responded_at";

impl Database {
    pub fn insert_access_request(&self, request: &ChatroomAccessRequest) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chatroom_access_requests
                     (id, chatroom_id, pet_unique_id, pet_kind, pet_name, requested_user_id,
                      added_by_id, conversation_id, role, request_type, status, created_at,
                      responded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    request.id.to_string(),
                    request.chatroom_id.map(|id| id.to_string()),
                    request.pet_unique_id,
                    request.pet_kind.map(|k| k.as_str()),
                    request.pet_name,
                    request.requested_user_id.to_string(),
                    request.added_by_id.to_string(),
                    request.conversation_id.map(|id| id.to_string()),
                    request.role.as_str(),
                    request.request_type.as_str(),
                    request.status.as_str(),
                    ts(request.created_at),
                    request.responded_at.map(ts),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_access_request(&self, id: Uuid) -> Result<Option<ChatroomAccessRequest>> {
        self.with_conn(|conn| {
            query_request(conn, id)?
                .map(AccessRequestRow::into_model)
                .transpose()
        })
    }

    pub fn list_access_requests_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ChatroomAccessRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM chatroom_access_requests
                 WHERE requested_user_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], map_request_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(AccessRequestRow::into_model).collect()
        })
    }

    pub fn list_access_requests_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ChatroomAccessRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM chatroom_access_requests
                 WHERE conversation_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([conversation_id.to_string()], map_request_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(AccessRequestRow::into_model).collect()
        })
    }

    pub fn list_access_requests_for_chatroom(
        &self,
        chatroom_id: Uuid,
    ) -> Result<Vec<ChatroomAccessRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM chatroom_access_requests
                 WHERE chatroom_id = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([chatroom_id.to_string()], map_request_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(AccessRequestRow::into_model).collect()
        })
    }

    /// Guard for the one-pending-creation-request-per-(user, pet) rule.
    pub fn has_pending_creation_request(
        &self,
        requested_user_id: Uuid,
        pet_unique_id: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chatroom_access_requests
                     WHERE requested_user_id = ?1 AND pet_unique_id = ?2
                       AND status = 'pending' AND request_type = 'creation_request'",
                    rusqlite::params![requested_user_id.to_string(), pet_unique_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(exists.is_some())
        })
    }

    /// Move a request out of `pending` exactly once. The WHERE clause is the
    /// atomicity guarantee: of two racing accepts, exactly one sees a changed
    /// row. `link_chatroom` attaches the materialized room on creation
    /// requests.
    pub fn resolve_access_request(
        &self,
        id: Uuid,
        requested_user_id: Uuid,
        outcome: RequestStatus,
        link_chatroom: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE chatroom_access_requests
                 SET status = ?1, responded_at = ?2,
                     chatroom_id = COALESCE(?3, chatroom_id)
                 WHERE id = ?4 AND requested_user_id = ?5 AND status = 'pending'",
                rusqlite::params![
                    outcome.as_str(),
                    ts(now),
                    link_chatroom.map(|id| id.to_string()),
                    id.to_string(),
                    requested_user_id.to_string(),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Attach the chatroom a creation request materialized into.
    pub fn link_access_request_chatroom(&self, id: Uuid, chatroom_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chatroom_access_requests SET chatroom_id = ?1 WHERE id = ?2",
                rusqlite::params![chatroom_id.to_string(), id.to_string()],
            )?;
            Ok(())
        })
    }
}

fn query_request(conn: &Connection, id: Uuid) -> Result<Option<AccessRequestRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM chatroom_access_requests WHERE id = ?1"
    ))?;
    let row = stmt
        .query_row([id.to_string()], map_request_row)
        .optional()?;
    Ok(row)
}

fn map_request_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessRequestRow> {
    Ok(AccessRequestRow {
        id: row.get(0)?,
        chatroom_id: row.get(1)?,
        pet_unique_id: row.get(2)?,
        pet_kind: row.get(3)?,
        pet_name: row.get(4)?,
        requested_user_id: row.get(5)?,
        added_by_id: row.get(6)?,
        conversation_id: row.get(7)?,
        role: row.get(8)?,
        request_type: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
        responded_at: row.get(12)?,
    })
}
