use std::future::Future;

use parley_types::UserId;

/// The signed-in user, threaded explicitly into every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
}

impl Session {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Source of the current session. `None` means nobody is signed in.
pub trait IdentityProvider: Send + Sync {
    fn current_session(&self) -> impl Future<Output = Option<Session>> + Send;
}

impl<T: IdentityProvider> IdentityProvider for std::sync::Arc<T> {
    fn current_session(&self) -> impl Future<Output = Option<Session>> + Send {
        (**self).current_session()
    }
}
