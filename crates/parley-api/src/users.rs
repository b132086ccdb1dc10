use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::debug;

use parley_types::api::Claims;
use parley_types::{User, UserId};

use crate::{ApiResult, AppState, run_db, user_from_row};

/// Queries shorter than this return nothing without touching the DB.
pub const MIN_QUERY_CHARS: usize = 2;
pub const DEFAULT_SEARCH_LIMIT: u32 = 5;
const MAX_SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

/// GET /users/search?q=&limit=: users whose username or full name contains
/// `q`, never including the caller.
pub async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<User>>> {
    if query.q.chars().count() < MIN_QUERY_CHARS {
        return Ok(Json(vec![]));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let caller = UserId::from(claims.sub);

    let exclude = caller.to_string();
    let text = query.q.clone();
    let rows = run_db(&state, move |db| db.search_users(&text, &exclude, limit)).await?;

    let users: Vec<User> = rows
        .into_iter()
        .filter_map(user_from_row)
        .filter(|u| u.id != caller)
        .collect();

    debug!("search '{}' by {} -> {} users", query.q, claims.username, users.len());
    Ok(Json(users))
}
