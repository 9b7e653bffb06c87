use anyhow::Result;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use reunite_types::models::Notification;

use crate::models::NotificationRow;
use crate::{Database, ts};

impl Database {
    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                     (id, recipient_id, kind, title, message, from_user_id, conversation_id,
                      access_request_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    notification.id.to_string(),
                    notification.recipient_id.to_string(),
                    notification.kind.as_str(),
                    notification.title,
                    notification.message,
                    notification.from_user_id.map(|id| id.to_string()),
                    notification.conversation_id.map(|id| id.to_string()),
                    notification.access_request_id.map(|id| id.to_string()),
                    notification.is_read,
                    ts(notification.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_notifications_for_recipient(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, kind, title, message, from_user_id, conversation_id,
                        access_request_id, is_read, created_at
                 FROM notifications WHERE recipient_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([recipient_id.to_string()], map_notification_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(NotificationRow::into_model).collect()
        })
    }

    /// Recipient-scoped: marking someone else's notification changes nothing.
    pub fn mark_notification_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
                rusqlite::params![id.to_string(), recipient_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1
                 WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id.to_string()],
            )?;
            Ok(changed)
        })
    }

    pub fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, kind, title, message, from_user_id, conversation_id,
                        access_request_id, is_read, created_at
                 FROM notifications WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id.to_string()], map_notification_row)
                .optional()?;
            row.map(NotificationRow::into_model).transpose()
        })
    }
}

fn map_notification_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        from_user_id: row.get(5)?,
        conversation_id: row.get(6)?,
        access_request_id: row.get(7)?,
        is_read: row.get(8)?,
        created_at: row.get(9)?,
    })
}
