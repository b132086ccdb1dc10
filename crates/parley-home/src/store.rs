use std::future::Future;

use thiserror::Error;
use tracing::debug;

use parley_types::{Conversation, ConversationId, ConversationSummary, Membership, User, UserId};

use crate::resolver::ResolveStep;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("record conflict: {0}")]
    Conflict(String),

    #[error("not signed in")]
    Unauthenticated,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Query and write access to users, conversations and memberships.
pub trait RecordStore: Send + Sync {
    /// Up to `limit` users whose username or full name contains `text`,
    /// case-insensitively, never including `exclude`.
    fn find_users(
        &self,
        text: &str,
        exclude: &UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send;

    fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<Option<Conversation>, StoreError>> + Send;

    /// Fails with `Conflict` if the id already exists.
    fn create_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn create_memberships(
        &self,
        memberships: &[Membership],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn list_conversations(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<ConversationSummary>, StoreError>> + Send;

    /// Make sure conversation `id` exists with `caller` and `target` as its
    /// members. Returns true if this call created it.
    ///
    /// The provided version looks the conversation up and, when missing,
    /// writes the record and then both memberships. Those are separate
    /// writes: a failure in between leaves a conversation without members,
    /// and two users starting the chat at once can both see it missing.
    /// Stores that can do this atomically should override it.
    fn ensure_conversation(
        &self,
        id: &ConversationId,
        caller: &UserId,
        target: &UserId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async move {
            debug!("{}: {:?}", id, ResolveStep::Lookup);
            if self.get_conversation(id).await?.is_some() {
                return Ok(false);
            }

            debug!("{}: {:?}", id, ResolveStep::Create);
            self.create_conversation(id).await?;

            debug!("{}: {:?}", id, ResolveStep::PopulateMembers);
            let memberships = [caller, target].map(|user_id| Membership {
                conversation_id: id.clone(),
                user_id: user_id.clone(),
            });
            self.create_memberships(&memberships).await?;

            Ok(true)
        }
    }
}

/// Shares one store between several owners, keeping its overrides.
impl<T: RecordStore> RecordStore for std::sync::Arc<T> {
    fn find_users(
        &self,
        text: &str,
        exclude: &UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send {
        (**self).find_users(text, exclude, limit)
    }

    fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<Option<Conversation>, StoreError>> + Send {
        (**self).get_conversation(id)
    }

    fn create_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).create_conversation(id)
    }

    fn create_memberships(
        &self,
        memberships: &[Membership],
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).create_memberships(memberships)
    }

    fn list_conversations(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<ConversationSummary>, StoreError>> + Send {
        (**self).list_conversations(user)
    }

    fn ensure_conversation(
        &self,
        id: &ConversationId,
        caller: &UserId,
        target: &UserId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        (**self).ensure_conversation(id, caller, target)
    }
}
