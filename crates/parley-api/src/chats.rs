use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use parley_types::api::{
    AddParticipantsRequest, Claims, CreateChatRequest, EnsureDirectChatRequest,
    EnsureDirectChatResponse,
};
use parley_types::{Conversation, ConversationId, ConversationSummary, UserId};

use crate::{ApiError, ApiResult, AppState, parse_timestamp, run_db, user_from_row};

/// GET /chats: the caller's conversations, newest first.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let uid = claims.sub.to_string();
    let rows = run_db(&state, move |db| db.list_chats_for_user(&uid)).await?;

    let chats = rows
        .into_iter()
        .filter_map(|row| {
            let id = match ConversationId::parse(&row.chat_id) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Corrupt chat id '{}': {}", row.chat_id, e);
                    return None;
                }
            };
            Some(ConversationSummary {
                id,
                counterpart: user_from_row(row.counterpart)?,
                created_at: parse_timestamp(&row.created_at),
            })
        })
        .collect();

    Ok(Json(chats))
}

/// GET /chats/{chat_id}: existence check. Any signed-in user may ask, since
/// the client looks a chat up before its memberships exist.
pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<Json<Conversation>> {
    let id = ConversationId::parse(&chat_id)?;

    let row = run_db(&state, move |db| db.get_chat(&chat_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(Conversation {
        id,
        created_at: parse_timestamp(&row.created_at),
    }))
}

/// POST /chats: create the chat record only. Fails with 409 if it exists.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = UserId::from(claims.sub);
    if req.id.counterpart(&caller).is_none() {
        return Err(ApiError::Forbidden);
    }

    let cid = req.id.to_string();
    run_db(&state, move |db| db.create_chat(&cid)).await?;

    let created_id = req.id.to_string();
    let row = run_db(&state, move |db| db.get_chat(&created_id))
        .await?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("chat {} vanished after insert", req.id)))?;

    info!("{} created chat {}", claims.username, req.id);

    Ok((
        StatusCode::CREATED,
        Json(Conversation {
            id: req.id,
            created_at: parse_timestamp(&row.created_at),
        }),
    ))
}

/// POST /chats/{chat_id}/participants: add memberships, all or nothing.
/// Only the two users named by the chat id can be members.
pub async fn add_participants(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddParticipantsRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = ConversationId::parse(&chat_id)?;
    let caller = UserId::from(claims.sub);
    if id.counterpart(&caller).is_none() {
        return Err(ApiError::Forbidden);
    }

    let (a, b) = id.participants();
    if req.user_ids.is_empty() || req.user_ids.iter().any(|u| *u != a && *u != b) {
        return Err(ApiError::BadRequest(format!(
            "participants of {} must be {} or {}",
            id, a, b
        )));
    }

    let lookup = chat_id.clone();
    if run_db(&state, move |db| db.get_chat(&lookup)).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let user_ids: Vec<String> = req.user_ids.iter().map(UserId::to_string).collect();
    let count = user_ids.len();
    run_db(&state, move |db| db.add_participants(&chat_id, &user_ids)).await?;

    info!("{} added {} participants to {}", claims.username, count, id);
    Ok(StatusCode::CREATED)
}

/// POST /chats/direct: get-or-create the chat between the caller and
/// `user_id`, memberships included, in one transaction.
pub async fn ensure_direct_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EnsureDirectChatRequest>,
) -> ApiResult<Json<EnsureDirectChatResponse>> {
    let caller = UserId::from(claims.sub);
    let chat_id = ConversationId::for_pair(&caller, &req.user_id)?;

    // A valid token can outlive its user row.
    let me = caller.to_string();
    if run_db(&state, move |db| db.get_user_by_id(&me)).await?.is_none() {
        warn!("Token for unknown user {}", caller);
        return Err(ApiError::Unauthorized);
    }

    let target = req.user_id.to_string();
    if run_db(&state, move |db| db.get_user_by_id(&target)).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let cid = chat_id.to_string();
    let (a, b) = (caller.to_string(), req.user_id.to_string());
    let created = run_db(&state, move |db| db.ensure_direct_chat(&cid, &a, &b)).await?;

    if created {
        info!("{} started chat {}", claims.username, chat_id);
    }

    Ok(Json(EnsureDirectChatResponse { chat_id, created }))
}
