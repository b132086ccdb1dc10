pub mod auth;
pub mod chats;
pub mod error;
pub mod middleware;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tracing::{error, warn};

use parley_db::Database;
use parley_db::models::ProfileRow;
use parley_types::{User, UserId};

pub use error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

/// All routes. Layers such as CORS and tracing are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/users/search", get(users::search_users))
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/chats/direct", post(chats::ensure_direct_chat))
        .route("/chats/{chat_id}", get(chats::get_chat))
        .route("/chats/{chat_id}/participants", post(chats::add_participants))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Run a blocking DB call off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::from_db)
}

pub(crate) fn parse_timestamp(raw: &str) -> chrono::DateTime<chrono::Utc> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            chrono::DateTime::default()
        })
}

/// Convert a profile row, skipping rows whose id no longer parses.
pub(crate) fn user_from_row(row: ProfileRow) -> Option<User> {
    let id = match UserId::parse(row.id.as_str()) {
        Ok(id) => id,
        Err(e) => {
            warn!("Corrupt user id '{}': {}", row.id, e);
            return None;
        }
    };
    Some(User {
        id,
        username: row.username,
        full_name: row.full_name,
        avatar_url: row.avatar_url,
    })
}
