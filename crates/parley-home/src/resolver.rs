use thiserror::Error;
use tracing::{debug, error, info};

use parley_types::{ConversationId, IdError, UserId};

use crate::identity::Session;
use crate::store::{RecordStore, StoreError};
use crate::ui::{Navigator, Notifier, routes};

pub const START_CHAT_FAILED: &str = "Could not start the chat";

/// Steps of one resolve, in order. `Create` and `PopulateMembers` only run
/// when the conversation does not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStep {
    Idle,
    AuthChecked,
    IdentityComputed,
    Lookup,
    Create,
    PopulateMembers,
    Navigate,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid participants: {0}")]
    Identity(#[from] IdError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Navigated to the chat view. `created` is false if the conversation
    /// already existed and nothing was written.
    Navigated {
        conversation_id: ConversationId,
        created: bool,
    },
    /// No session; redirected to the login view.
    Aborted,
    /// Nothing navigated; the user was notified. Writes that succeeded
    /// before the failure are not rolled back.
    Failed(ResolveError),
}

/// Opens the direct conversation between the signed-in user and someone
/// else, creating it on first contact.
pub struct ConversationResolver<'a, S, V, N> {
    store: &'a S,
    navigator: &'a V,
    notifier: &'a N,
}

impl<'a, S, V, N> ConversationResolver<'a, S, V, N>
where
    S: RecordStore,
    V: Navigator,
    N: Notifier,
{
    pub fn new(store: &'a S, navigator: &'a V, notifier: &'a N) -> Self {
        Self {
            store,
            navigator,
            notifier,
        }
    }

    pub async fn resolve(&self, session: &Session, target: &UserId) -> Resolution {
        let me = &session.user_id;
        debug!("{} -> {}: {:?}", me, target, ResolveStep::AuthChecked);

        let id = match ConversationId::for_pair(me, target) {
            Ok(id) => id,
            Err(e) => return self.fail(format!("{} -> {}", me, target), e.into()),
        };
        debug!("{}: {:?}", id, ResolveStep::IdentityComputed);

        match self.store.ensure_conversation(&id, me, target).await {
            Ok(created) => {
                if created {
                    info!("Started conversation {}", id);
                }
                debug!("{}: {:?}", id, ResolveStep::Navigate);
                self.navigator.go_to(&routes::chat(target));
                Resolution::Navigated {
                    conversation_id: id,
                    created,
                }
            }
            Err(e) => self.fail(id.to_string(), e.into()),
        }
    }

    fn fail(&self, what: String, err: ResolveError) -> Resolution {
        error!("Could not open conversation {}: {}", what, err);
        debug!("{}: {:?}", what, ResolveStep::Failed);
        self.notifier.notify_error(START_CHAT_FAILED);
        Resolution::Failed(err)
    }
}
