/// Database row types. These map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

/// A user without credentials, as returned by search and chat listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRow {
    pub id: String,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    pub id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ChatSummaryRow {
    pub chat_id: String,
    pub created_at: String,
    pub counterpart: ProfileRow,
}
