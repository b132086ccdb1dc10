pub mod api;
pub mod ids;
pub mod models;

pub use ids::{ConversationId, IdError, UserId, PAIR_SEPARATOR};
pub use models::{Conversation, ConversationSummary, Membership, User};
