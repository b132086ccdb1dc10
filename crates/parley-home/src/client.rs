use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use parley_types::api::{
    AddParticipantsRequest, CreateChatRequest, EnsureDirectChatRequest, EnsureDirectChatResponse,
    LoginRequest, LoginResponse, RegisterRequest, RegisterResponse,
};
use parley_types::{Conversation, ConversationId, ConversationSummary, Membership, User, UserId};

use crate::identity::{IdentityProvider, Session};
use crate::store::{RecordStore, StoreError};

#[derive(Clone)]
struct SignedIn {
    user_id: UserId,
    token: String,
}

/// HTTP client for parley-server. Acts as both identity provider (the
/// signed-in user) and record store.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: RwLock<Option<SignedIn>>,
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: RwLock::new(None),
        }
    }

    /// Create an account and sign in as it.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<UserId, StoreError> {
        let body = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            full_name: full_name.map(str::to_string),
            avatar_url: None,
        };
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let resp: RegisterResponse = decode(check(resp, Access::Write).await?).await?;

        let user_id = UserId::from(resp.user_id);
        self.sign_in(user_id.clone(), resp.token);
        info!("Registered and signed in as {}", username);
        Ok(user_id)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserId, StoreError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let resp: LoginResponse = decode(check(resp, Access::Read).await?).await?;

        let user_id = UserId::from(resp.user_id);
        self.sign_in(user_id.clone(), resp.token);
        info!("Signed in as {}", resp.username);
        Ok(user_id)
    }

    /// Sign in with a token saved from an earlier login. The token is not
    /// checked here; the first request the server rejects signs out again.
    pub fn restore_session(&self, user_id: UserId, token: impl Into<String>) {
        self.sign_in(user_id, token.into());
    }

    pub fn logout(&self) {
        *self.auth_mut() = None;
    }

    fn sign_in(&self, user_id: UserId, token: String) {
        *self.auth_mut() = Some(SignedIn { user_id, token });
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authenticated request builder. Fails fast when signed out.
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, StoreError> {
        let token = self
            .auth()
            .as_ref()
            .map(|a| a.token.clone())
            .ok_or(StoreError::Unauthenticated)?;
        Ok(self.http.request(method, self.url(path)).bearer_auth(token))
    }

    async fn send(&self, req: RequestBuilder, access: Access) -> Result<Response, StoreError> {
        let resp = req.send().await.map_err(transport)?;
        self.checked(resp, access).await
    }

    async fn checked(&self, resp: Response, access: Access) -> Result<Response, StoreError> {
        let result = check(resp, access).await;
        if matches!(result, Err(StoreError::Unauthenticated)) {
            warn!("Server rejected our token, signing out");
            self.logout();
        }
        result
    }

    fn auth(&self) -> RwLockReadGuard<'_, Option<SignedIn>> {
        self.auth.read().unwrap_or_else(|e| e.into_inner())
    }

    fn auth_mut(&self) -> RwLockWriteGuard<'_, Option<SignedIn>> {
        self.auth.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl IdentityProvider for ApiClient {
    async fn current_session(&self) -> Option<Session> {
        self.auth().as_ref().map(|a| Session::new(a.user_id.clone()))
    }
}

impl RecordStore for ApiClient {
    /// The server excludes the token's user, which is `exclude` for every
    /// caller of this client.
    async fn find_users(
        &self,
        text: &str,
        exclude: &UserId,
        limit: usize,
    ) -> Result<Vec<User>, StoreError> {
        let req = self
            .request(Method::GET, "/users/search")?
            .query(&[("q", text.to_string()), ("limit", limit.to_string())]);
        let users: Vec<User> = decode(self.send(req, Access::Read).await?).await?;
        Ok(users.into_iter().filter(|u| &u.id != exclude).collect())
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let req = self.request(Method::GET, &format!("/chats/{}", id))?;
        let resp = req.send().await.map_err(transport)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(decode(self.checked(resp, Access::Read).await?).await?))
    }

    async fn create_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        let req = self
            .request(Method::POST, "/chats")?
            .json(&CreateChatRequest { id: id.clone() });
        self.send(req, Access::Write).await?;
        Ok(())
    }

    /// One request per conversation, each all-or-nothing on the server.
    async fn create_memberships(&self, memberships: &[Membership]) -> Result<(), StoreError> {
        let mut groups: Vec<(&ConversationId, Vec<UserId>)> = Vec::new();
        for m in memberships {
            match groups.iter_mut().find(|(id, _)| *id == &m.conversation_id) {
                Some((_, users)) => users.push(m.user_id.clone()),
                None => groups.push((&m.conversation_id, vec![m.user_id.clone()])),
            }
        }

        for (id, user_ids) in groups {
            let req = self
                .request(Method::POST, &format!("/chats/{}/participants", id))?
                .json(&AddParticipantsRequest { user_ids });
            self.send(req, Access::Write).await?;
        }
        Ok(())
    }

    /// The server always lists the token's user, which is `user` here.
    async fn list_conversations(
        &self,
        user: &UserId,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        debug!("Listing conversations for {}", user);
        let req = self.request(Method::GET, "/chats")?;
        decode(self.send(req, Access::Read).await?).await
    }

    /// Single server-side transaction instead of lookup + two writes.
    async fn ensure_conversation(
        &self,
        id: &ConversationId,
        _caller: &UserId,
        target: &UserId,
    ) -> Result<bool, StoreError> {
        let req = self
            .request(Method::POST, "/chats/direct")?
            .json(&EnsureDirectChatRequest {
                user_id: target.clone(),
            });
        let resp: EnsureDirectChatResponse = decode(self.send(req, Access::Write).await?).await?;

        if &resp.chat_id != id {
            return Err(StoreError::Write(format!(
                "server resolved {} instead of {}",
                resp.chat_id, id
            )));
        }
        Ok(resp.created)
    }
}

/// Map a non-success status to the matching `StoreError`.
async fn check(resp: Response, access: Access) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let detail = format!("{} {}", status.as_u16(), body);
    Err(match status {
        StatusCode::UNAUTHORIZED => StoreError::Unauthenticated,
        StatusCode::CONFLICT => StoreError::Conflict(detail),
        _ => match access {
            Access::Read => StoreError::Query(detail),
            Access::Write => StoreError::Write(detail),
        },
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    resp.json::<T>()
        .await
        .map_err(|e| StoreError::Transport(format!("malformed response: {}", e)))
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}
