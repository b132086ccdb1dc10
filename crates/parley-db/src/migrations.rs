use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            full_name   TEXT,
            avatar_url  TEXT,
            -- Lowercased copies for search; LIKE only folds ASCII.
            username_folded   TEXT NOT NULL,
            full_name_folded  TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Direct chats are keyed by the sorted pair of participant ids,
        -- so the primary key is what stops duplicate chats between two users.
        CREATE TABLE IF NOT EXISTS chats (
            id          TEXT PRIMARY KEY,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chat_participants (
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_chat_participants_user
            ON chat_participants(user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
