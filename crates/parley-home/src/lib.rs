//! Logic behind the chat home screen: find users by name and open (or start)
//! the direct conversation with one of them.
//!
//! Everything outside this crate is reached through four seams:
//! [`IdentityProvider`] for the signed-in user, [`RecordStore`] for
//! persistence, [`Navigator`] and [`Notifier`] for the UI. [`ChatHome`] wires
//! them to the [`UserFinder`] and the [`ConversationResolver`].

pub mod client;
pub mod finder;
pub mod home;
pub mod identity;
pub mod resolver;
pub mod store;
pub mod ui;

#[cfg(test)]
mod testing;

pub use client::ApiClient;
pub use finder::{SearchOutcome, UserFinder};
pub use home::{ChatHome, ListOutcome};
pub use identity::{IdentityProvider, Session};
pub use resolver::{ConversationResolver, Resolution, ResolveError, ResolveStep};
pub use store::{RecordStore, StoreError};
pub use ui::{Navigator, Notifier, routes};
