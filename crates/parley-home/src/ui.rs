/// Moves the app to another view. Fire-and-forget.
pub trait Navigator: Send + Sync {
    fn go_to(&self, path: &str);
}

/// Shows a non-blocking error notice to the user. Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

pub mod routes {
    use parley_types::UserId;

    pub const LOGIN: &str = "/login";

    /// The chat view is keyed by the other user, not by the conversation id;
    /// the view re-derives the id from its own session.
    pub fn chat(target: &UserId) -> String {
        format!("/chat/{}", target)
    }
}

impl<T: Navigator> Navigator for std::sync::Arc<T> {
    fn go_to(&self, path: &str) {
        (**self).go_to(path)
    }
}

impl<T: Notifier> Notifier for std::sync::Arc<T> {
    fn notify_error(&self, message: &str) {
        (**self).notify_error(message)
    }
}
