use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            display_name    TEXT,
            is_staff        INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id),
            admin_id        TEXT REFERENCES users(id),
            pet_kind        TEXT,
            pet_unique_id   TEXT,
            pet_name        TEXT,
            reason          TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL DEFAULT 'requested',
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chat_messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            text            TEXT NOT NULL DEFAULT '',
            reply_to        TEXT REFERENCES chat_messages(id) ON DELETE SET NULL,
            attachment_kind TEXT,
            attachment_name TEXT,
            attachment_size INTEGER,
            attachment_ref  TEXT,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            deleted_for     TEXT NOT NULL DEFAULT '[]',
            is_system       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation
            ON chat_messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS chatrooms (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            conversation_id TEXT REFERENCES conversations(id) ON DELETE SET NULL,
            pet_unique_id   TEXT,
            pet_kind        TEXT,
            pet_name        TEXT,
            purpose         TEXT NOT NULL DEFAULT '',
            created_by      TEXT REFERENCES users(id),
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_chatrooms_pet
            ON chatrooms(pet_unique_id) WHERE is_active = 1;

        CREATE TABLE IF NOT EXISTS chatroom_participants (
            id              TEXT PRIMARY KEY,
            chatroom_id     TEXT NOT NULL REFERENCES chatrooms(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id),
            role            TEXT NOT NULL DEFAULT 'requested_user',
            joined_at       TEXT NOT NULL DEFAULT (datetime('now')),
            is_active       INTEGER NOT NULL DEFAULT 1,
            UNIQUE(chatroom_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS chatroom_messages (
            id              TEXT PRIMARY KEY,
            chatroom_id     TEXT NOT NULL REFERENCES chatrooms(id) ON DELETE CASCADE,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            text            TEXT NOT NULL DEFAULT '',
            reply_to        TEXT REFERENCES chatroom_messages(id) ON DELETE SET NULL,
            attachment_kind TEXT,
            attachment_name TEXT,
            attachment_size INTEGER,
            attachment_ref  TEXT,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            deleted_for     TEXT NOT NULL DEFAULT '[]',
            is_system       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_chatroom_messages_room
            ON chatroom_messages(chatroom_id, created_at);

        CREATE TABLE IF NOT EXISTS chatroom_access_requests (
            id                TEXT PRIMARY KEY,
            chatroom_id       TEXT REFERENCES chatrooms(id) ON DELETE SET NULL,
            pet_unique_id     TEXT,
            pet_kind          TEXT,
            pet_name          TEXT,
            requested_user_id TEXT NOT NULL REFERENCES users(id),
            added_by_id       TEXT NOT NULL REFERENCES users(id),
            conversation_id   TEXT REFERENCES conversations(id) ON DELETE SET NULL,
            role              TEXT NOT NULL DEFAULT 'requested_user',
            request_type      TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'pending',
            created_at        TEXT NOT NULL DEFAULT (datetime('now')),
            responded_at      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_access_requests_user
            ON chatroom_access_requests(requested_user_id, status);

        -- One pending creation request per (user, pet); the workflow checks
        -- this too, the index is the backstop under concurrent inserts.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_access_requests_pending_creation
            ON chatroom_access_requests(requested_user_id, pet_unique_id)
            WHERE status = 'pending' AND request_type = 'creation_request';

        CREATE TABLE IF NOT EXISTS notifications (
            id                TEXT PRIMARY KEY,
            recipient_id      TEXT NOT NULL REFERENCES users(id),
            kind              TEXT NOT NULL,
            title             TEXT NOT NULL,
            message           TEXT NOT NULL,
            from_user_id      TEXT REFERENCES users(id) ON DELETE SET NULL,
            conversation_id   TEXT REFERENCES conversations(id) ON DELETE SET NULL,
            access_request_id TEXT REFERENCES chatroom_access_requests(id) ON DELETE SET NULL,
            is_read           INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
