//! In-memory collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Barrier, Notify};

use parley_types::{Conversation, ConversationId, ConversationSummary, Membership, User, UserId};

use crate::identity::{IdentityProvider, Session};
use crate::store::{RecordStore, StoreError};
use crate::ui::{Navigator, Notifier};

pub fn uid(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

pub fn session(id: &str) -> Session {
    Session::new(uid(id))
}

pub fn user(id: &str, username: &str, full_name: Option<&str>) -> User {
    User {
        id: uid(id),
        username: username.to_string(),
        full_name: full_name.map(str::to_string),
        avatar_url: None,
    }
}

#[derive(Default)]
struct StoreData {
    users: Vec<User>,
    conversations: Vec<Conversation>,
    memberships: Vec<Membership>,
    find_calls: usize,
    get_calls: usize,
    list_calls: usize,
    conversation_writes: usize,
    membership_writes: usize,
    fail_queries: bool,
    fail_conversation_writes: bool,
    fail_membership_writes: bool,
}

/// Record store over plain vectors, counting every call.
/// Uses the provided non-atomic `ensure_conversation`.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
    gates: Vec<(String, Arc<Notify>)>,
    lookup_barrier: Option<Arc<Barrier>>,
    ignore_exclude: bool,
    ignore_limit: bool,
}

impl MemoryStore {
    pub fn with_users(users: Vec<User>) -> Self {
        let store = Self::default();
        store.lock().users = users;
        store
    }

    /// `find_users(text)` waits for `gate` before answering.
    pub fn gated_on(mut self, text: &str, gate: Arc<Notify>) -> Self {
        self.gates.push((text.to_string(), gate));
        self
    }

    /// Every `get_conversation` reads, then waits at `barrier` before
    /// answering, so concurrent lookups all see the same snapshot.
    pub fn lookups_meet_at(mut self, barrier: Arc<Barrier>) -> Self {
        self.lookup_barrier = Some(barrier);
        self
    }

    /// Behave like a backend that forgets to exclude the caller.
    pub fn ignoring_exclude(mut self) -> Self {
        self.ignore_exclude = true;
        self
    }

    pub fn ignoring_limit(mut self) -> Self {
        self.ignore_limit = true;
        self
    }

    pub fn fail_queries(&self, fail: bool) {
        self.lock().fail_queries = fail;
    }

    pub fn fail_conversation_writes(&self, fail: bool) {
        self.lock().fail_conversation_writes = fail;
    }

    pub fn fail_membership_writes(&self, fail: bool) {
        self.lock().fail_membership_writes = fail;
    }

    pub fn insert_conversation(&self, id: &ConversationId) {
        self.lock().conversations.push(Conversation {
            id: id.clone(),
            created_at: Default::default(),
        });
    }

    pub fn has_conversation(&self, id: &ConversationId) -> bool {
        self.lock().conversations.iter().any(|c| &c.id == id)
    }

    pub fn memberships(&self) -> Vec<Membership> {
        self.lock().memberships.clone()
    }

    pub fn find_calls(&self) -> usize {
        self.lock().find_calls
    }

    pub fn conversation_writes(&self) -> usize {
        self.lock().conversation_writes
    }

    pub fn membership_writes(&self) -> usize {
        self.lock().membership_writes
    }

    pub fn total_calls(&self) -> usize {
        let data = self.lock();
        data.find_calls
            + data.get_calls
            + data.list_calls
            + data.conversation_writes
            + data.membership_writes
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap()
    }
}

impl RecordStore for MemoryStore {
    async fn find_users(
        &self,
        text: &str,
        exclude: &UserId,
        limit: usize,
    ) -> Result<Vec<User>, StoreError> {
        self.lock().find_calls += 1;

        let gate = self.gates.iter().find(|(t, _)| t == text).map(|(_, g)| g.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let data = self.lock();
        if data.fail_queries {
            return Err(StoreError::Query("search unavailable".into()));
        }

        let needle = text.to_lowercase();
        let limit = if self.ignore_limit { usize::MAX } else { limit };
        Ok(data
            .users
            .iter()
            .filter(|u| self.ignore_exclude || &u.id != exclude)
            .filter(|u| {
                u.username.to_lowercase().contains(&needle)
                    || u.full_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let found = {
            let mut data = self.lock();
            data.get_calls += 1;
            if data.fail_queries {
                return Err(StoreError::Query("lookup unavailable".into()));
            }
            data.conversations.iter().find(|c| &c.id == id).cloned()
        };

        if let Some(barrier) = &self.lookup_barrier {
            barrier.wait().await;
        }
        Ok(found)
    }

    async fn create_conversation(&self, id: &ConversationId) -> Result<(), StoreError> {
        let mut data = self.lock();
        data.conversation_writes += 1;
        if data.fail_conversation_writes {
            return Err(StoreError::Write("insert rejected".into()));
        }
        if data.conversations.iter().any(|c| &c.id == id) {
            return Err(StoreError::Conflict(id.to_string()));
        }
        data.conversations.push(Conversation {
            id: id.clone(),
            created_at: Default::default(),
        });
        Ok(())
    }

    async fn create_memberships(&self, memberships: &[Membership]) -> Result<(), StoreError> {
        let mut data = self.lock();
        data.membership_writes += 1;
        if data.fail_membership_writes {
            return Err(StoreError::Write("insert rejected".into()));
        }
        data.memberships.extend_from_slice(memberships);
        Ok(())
    }

    async fn list_conversations(&self, user: &UserId) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut data = self.lock();
        data.list_calls += 1;
        if data.fail_queries {
            return Err(StoreError::Query("list unavailable".into()));
        }
        Ok(data
            .memberships
            .iter()
            .filter(|m| &m.user_id == user)
            .filter_map(|m| {
                let other = m.conversation_id.counterpart(user)?;
                let counterpart = data.users.iter().find(|u| u.id == other)?.clone();
                Some(ConversationSummary {
                    id: m.conversation_id.clone(),
                    counterpart,
                    created_at: Default::default(),
                })
            })
            .collect())
    }
}

/// Identity provider with a fixed answer, counting lookups.
pub struct FixedIdentity {
    session: Option<Session>,
    calls: AtomicUsize,
}

impl FixedIdentity {
    pub fn signed_in(id: &str) -> Self {
        Self {
            session: Some(session(id)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            session: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for FixedIdentity {
    async fn current_session(&self) -> Option<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.session.clone()
    }
}

#[derive(Default)]
pub struct RecordingNavigator(Mutex<Vec<String>>);

impl RecordingNavigator {
    pub fn paths(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn go_to(&self, path: &str) {
        self.0.lock().unwrap().push(path.to_string());
    }
}

#[derive(Default)]
pub struct RecordingNotifier(Mutex<Vec<String>>);

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}
