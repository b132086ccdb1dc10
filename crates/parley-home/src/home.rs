use std::sync::Mutex;

use tracing::{debug, error, info};

use parley_types::{ConversationId, ConversationSummary, User, UserId};

use crate::finder::{SearchOutcome, UserFinder};
use crate::identity::{IdentityProvider, Session};
use crate::resolver::{ConversationResolver, Resolution, ResolveStep};
use crate::store::{RecordStore, StoreError};
use crate::ui::{Navigator, Notifier, routes};

pub const LOAD_CONVERSATIONS_FAILED: &str = "Could not load conversations";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome {
    Loaded(usize),
    Aborted,
    /// The user was notified; the previous list is kept.
    Failed(StoreError),
}

/// The chat home screen: a search box over users and the list of the
/// signed-in user's conversations.
///
/// Each interaction looks the session up once and passes it down
/// explicitly. Without a session the screen redirects to the login view and
/// touches nothing else.
pub struct ChatHome<I, S, V, N> {
    identity: I,
    store: S,
    navigator: V,
    notifier: N,
    finder: UserFinder,
    conversations: Mutex<Vec<ConversationSummary>>,
}

impl<I, S, V, N> ChatHome<I, S, V, N>
where
    I: IdentityProvider,
    S: RecordStore,
    V: Navigator,
    N: Notifier,
{
    pub fn new(identity: I, store: S, navigator: V, notifier: N) -> Self {
        Self {
            identity,
            store,
            navigator,
            notifier,
            finder: UserFinder::new(),
            conversations: Mutex::new(Vec::new()),
        }
    }

    pub fn search_results(&self) -> Vec<User> {
        self.finder.results()
    }

    pub fn is_searching(&self) -> bool {
        self.finder.is_searching()
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.conversations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The search box changed.
    pub async fn on_query_changed(&self, query: &str) -> SearchOutcome {
        // Short queries never need a session.
        if !UserFinder::is_searchable(query) {
            self.finder.clear();
            return SearchOutcome::Cleared;
        }

        let Some(session) = self.session().await else {
            return SearchOutcome::Aborted;
        };

        self.finder
            .search(&self.store, &self.notifier, &session, query)
            .await
    }

    /// A search result was picked: open the conversation with that user.
    pub async fn on_user_selected(&self, target: &UserId) -> Resolution {
        let Some(session) = self.session().await else {
            debug!("{}: {:?}", target, ResolveStep::Aborted);
            return Resolution::Aborted;
        };

        ConversationResolver::new(&self.store, &self.navigator, &self.notifier)
            .resolve(&session, target)
            .await
    }

    /// Refresh the conversation list.
    pub async fn load_conversations(&self) -> ListOutcome {
        let Some(session) = self.session().await else {
            return ListOutcome::Aborted;
        };

        match self.store.list_conversations(&session.user_id).await {
            Ok(list) => {
                let count = list.len();
                *self.conversations.lock().unwrap_or_else(|e| e.into_inner()) = list;
                ListOutcome::Loaded(count)
            }
            Err(e) => {
                error!("Loading conversations for {} failed: {}", session.user_id, e);
                self.notifier.notify_error(LOAD_CONVERSATIONS_FAILED);
                ListOutcome::Failed(e)
            }
        }
    }

    /// An entry of the conversation list was picked.
    pub fn on_conversation_selected(&self, conversation: &ConversationSummary) {
        self.navigator.go_to(&routes::chat(&conversation.counterpart.id));
    }

    /// The id of the conversation with `target`, as the chat view derives it.
    pub async fn conversation_for(&self, target: &UserId) -> Option<ConversationId> {
        let session = self.identity.current_session().await?;
        ConversationId::for_pair(&session.user_id, target).ok()
    }

    async fn session(&self) -> Option<Session> {
        let session = self.identity.current_session().await;
        if session.is_none() {
            info!("No active session, redirecting to {}", routes::LOGIN);
            self.navigator.go_to(routes::LOGIN);
        }
        session
    }
}
