use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use reunite_types::models::User;

use crate::models::UserRow;
use crate::{Database, ts};

impl Database {
    /// Users are owned by the auth collaborator; this exists for seeding,
    /// tests, and keeping the directory in sync.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, is_staff, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    user.id.to_string(),
                    user.username,
                    user.display_name,
                    user.is_staff,
                    ts(user.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            query_user(conn, id)?
                .map(UserRow::into_model)
                .transpose()
        })
    }

    /// Every staff account, for admin-broadcast fan-out.
    pub fn staff_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, display_name, is_staff, created_at
                 FROM users WHERE is_staff = 1 ORDER BY username",
            )?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(UserRow::into_model).collect()
        })
    }
}

fn query_user(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, display_name, is_staff, created_at FROM users WHERE id = ?1",
    )?;
    let row = stmt
        .query_row([id.to_string()], map_user_row)
        .optional()?;
    Ok(row)
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        is_staff: row.get(3)?,
        created_at: row.get(4)?,
    })
}
