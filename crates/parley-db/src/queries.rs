use crate::models::{ChatRow, ChatSummaryRow, ProfileRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, ErrorCode};
use tracing::debug;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        full_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, full_name, avatar_url, username_folded, full_name_folded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    username,
                    password_hash,
                    full_name,
                    avatar_url,
                    username.to_lowercase(),
                    full_name.map(str::to_lowercase),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Case-insensitive substring search over username and full name, using
    /// Unicode lowercasing on both sides. Username-prefix matches rank first.
    /// `exclude_id` never appears in the result.
    pub fn search_users(&self, text: &str, exclude_id: &str, limit: u32) -> Result<Vec<ProfileRow>> {
        let escaped = escape_like(&text.to_lowercase());
        let contains = format!("%{}%", escaped);
        let prefix = format!("{}%", escaped);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"SELECT id, username, full_name, avatar_url
                  FROM users
                  WHERE id != ?1
                    AND (username_folded LIKE ?2 ESCAPE '\' OR full_name_folded LIKE ?2 ESCAPE '\')
                  ORDER BY (username_folded LIKE ?3 ESCAPE '\') DESC, username_folded, username
                  LIMIT ?4",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![exclude_id, contains, prefix, limit], profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Chats --

    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id, created_at FROM chats WHERE id = ?1", [id], |row| {
                Ok(ChatRow {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                })
            })
            .optional()
        })
    }

    /// Plain insert. A second insert of the same id fails with a constraint
    /// violation, see [`is_constraint_violation`].
    pub fn create_chat(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO chats (id) VALUES (?1)", [id])?;
            Ok(())
        })
    }

    /// Insert one membership per user, all or nothing.
    pub fn add_participants(&self, chat_id: &str, user_ids: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)")?;
                for user_id in user_ids {
                    stmt.execute([chat_id, user_id.as_str()])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Get-or-create a direct chat and both of its memberships in one transaction.
    /// Returns true if the chat row was created by this call.
    ///
    /// Missing memberships of an already existing chat are filled in as well,
    /// which repairs chats left half-written by a client-side create.
    pub fn ensure_direct_chat(&self, chat_id: &str, a: &str, b: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let created = tx.execute("INSERT OR IGNORE INTO chats (id) VALUES (?1)", [chat_id])? == 1;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                )?;
                for user_id in [a, b] {
                    stmt.execute([chat_id, user_id])?;
                }
            }
            tx.commit()?;

            debug!("ensure_direct_chat {} created={}", chat_id, created);
            Ok(created)
        })
    }

    /// Every chat `user_id` takes part in, with the other participant's profile.
    pub fn list_chats_for_user(&self, user_id: &str) -> Result<Vec<ChatSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.created_at, u.id, u.username, u.full_name, u.avatar_url
                 FROM chat_participants me
                 JOIN chats c ON c.id = me.chat_id
                 JOIN chat_participants other ON other.chat_id = c.id AND other.user_id != me.user_id
                 JOIN users u ON u.id = other.user_id
                 WHERE me.user_id = ?1
                 ORDER BY c.created_at DESC, c.id",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ChatSummaryRow {
                        chat_id: row.get(0)?,
                        created_at: row.get(1)?,
                        counterpart: ProfileRow {
                            id: row.get(2)?,
                            username: row.get(3)?,
                            full_name: row.get(4)?,
                            avatar_url: row.get(5)?,
                        },
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

/// True if `err` is a SQLite UNIQUE / PRIMARY KEY / FOREIGN KEY violation.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
    )
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is only ever one of our own literals.
    let sql = format!(
        "SELECT id, username, password, full_name, avatar_url, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                full_name: row.get(3)?,
                avatar_url: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        avatar_url: row.get(3)?,
    })
}

/// Escape LIKE wildcards so user input only ever matches literally.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
