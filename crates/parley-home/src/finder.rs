use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error};

use parley_types::User;

use crate::identity::Session;
use crate::store::{RecordStore, StoreError};
use crate::ui::Notifier;

/// Shorter queries clear the results instead of hitting the store.
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_RESULTS: usize = 5;

pub const SEARCH_FAILED: &str = "Could not search users";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Query too short: results cleared, store not queried.
    Cleared,
    /// Results replaced with this many users.
    Applied(usize),
    /// A newer search was issued while this one was in flight; its
    /// response was dropped.
    Stale,
    /// No session; redirected to the login view.
    Aborted,
    /// Store error. The previous results are kept.
    Failed(StoreError),
}

#[derive(Default)]
struct FinderState {
    results: Vec<User>,
    /// Sequence number of the latest search or clear.
    issued: u64,
    /// Sequence number of the latest search still waiting on the store.
    pending: Option<u64>,
}

impl FinderState {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }
}

/// Search box state. Every search takes a sequence number when issued and
/// only the latest issued search may write the results, so responses that
/// arrive out of order never overwrite newer ones. The counter lives under
/// the same lock as `pending`, so a superseded search can never mark itself
/// pending after a newer one finished.
#[derive(Default)]
pub struct UserFinder {
    state: Mutex<FinderState>,
}

impl UserFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_searchable(query: &str) -> bool {
        query.chars().count() >= MIN_QUERY_CHARS
    }

    /// Current results, in store ranking order.
    pub fn results(&self) -> Vec<User> {
        self.lock().results.clone()
    }

    /// True while the latest issued search is waiting on the store.
    pub fn is_searching(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Drop the results and invalidate any search still in flight.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.issue();
        state.results.clear();
        state.pending = None;
    }

    pub async fn search<S, N>(
        &self,
        store: &S,
        notifier: &N,
        session: &Session,
        query: &str,
    ) -> SearchOutcome
    where
        S: RecordStore,
        N: Notifier,
    {
        if !Self::is_searchable(query) {
            self.clear();
            return SearchOutcome::Cleared;
        }

        let seq = {
            let mut state = self.lock();
            let seq = state.issue();
            state.pending = Some(seq);
            seq
        };

        let response = store.find_users(query, &session.user_id, MAX_RESULTS).await;

        let mut state = self.lock();
        if state.issued != seq {
            debug!("Dropping stale results for '{}' (search #{})", query, seq);
            return SearchOutcome::Stale;
        }
        state.pending = None;

        match response {
            Ok(users) => {
                let mut users: Vec<User> = users
                    .into_iter()
                    .filter(|u| u.id != session.user_id)
                    .collect();
                users.truncate(MAX_RESULTS);
                debug!("Search '{}' returned {} users", query, users.len());

                let count = users.len();
                state.results = users;
                SearchOutcome::Applied(count)
            }
            Err(e) => {
                drop(state);
                error!("User search for '{}' failed: {}", query, e);
                notifier.notify_error(SEARCH_FAILED);
                SearchOutcome::Failed(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, FinderState> {
        // State is plain data, a panic elsewhere cannot leave it half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;

    use super::*;
    use crate::testing::{MemoryStore, RecordingNotifier, session, user};

    fn store() -> MemoryStore {
        MemoryStore::with_users(vec![
            user("u1", "annie", Some("Annie Caller")),
            user("u2", "anna", None),
            user("u3", "joe", Some("Joanne")),
            user("u4", "bob", None),
        ])
    }

    #[tokio::test]
    async fn short_query_clears_without_querying() {
        let store = store();
        let notifier = RecordingNotifier::default();
        let finder = UserFinder::new();
        let me = session("u1");

        assert_eq!(finder.search(&store, &notifier, &me, "ann").await, SearchOutcome::Applied(2));
        assert_eq!(store.find_calls(), 1);

        assert_eq!(finder.search(&store, &notifier, &me, "a").await, SearchOutcome::Cleared);
        assert_eq!(finder.search(&store, &notifier, &me, "").await, SearchOutcome::Cleared);
        assert_eq!(store.find_calls(), 1);
        assert!(finder.results().is_empty());
    }

    #[tokio::test]
    async fn two_chars_are_enough() {
        let store = store();
        let finder = UserFinder::new();
        let outcome = finder
            .search(&store, &RecordingNotifier::default(), &session("u4"), "jo")
            .await;
        assert_eq!(outcome, SearchOutcome::Applied(1));
    }

    #[tokio::test]
    async fn caller_never_in_results() {
        // The caller's own name matches; a store that forgets to exclude
        // them is still filtered here.
        let store = store().ignoring_exclude();
        let finder = UserFinder::new();
        finder
            .search(&store, &RecordingNotifier::default(), &session("u1"), "anni")
            .await;
        assert!(finder.results().is_empty());

        finder
            .search(&store, &RecordingNotifier::default(), &session("u1"), "ann")
            .await;
        let ids: Vec<_> = finder.results().into_iter().map(|u| u.id.to_string()).collect();
        assert_eq!(ids, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn results_are_capped() {
        let users = (0..8)
            .map(|i| user(&format!("x{}", i), &format!("sam{}", i), None))
            .collect();
        let store = MemoryStore::with_users(users).ignoring_limit();
        let finder = UserFinder::new();
        let outcome = finder
            .search(&store, &RecordingNotifier::default(), &session("u1"), "sam")
            .await;
        assert_eq!(outcome, SearchOutcome::Applied(MAX_RESULTS));
    }

    #[tokio::test]
    async fn failure_notifies_and_keeps_previous_results() {
        let store = store();
        let notifier = RecordingNotifier::default();
        let finder = UserFinder::new();
        let me = session("u4");

        finder.search(&store, &notifier, &me, "anna").await;
        assert_eq!(finder.results().len(), 1);

        store.fail_queries(true);
        let outcome = finder.search(&store, &notifier, &me, "joe").await;
        assert!(matches!(outcome, SearchOutcome::Failed(StoreError::Query(_))));
        assert_eq!(notifier.messages(), vec![SEARCH_FAILED.to_string()]);
        assert_eq!(finder.results()[0].username, "anna");
        assert!(!finder.is_searching());
    }

    #[tokio::test]
    async fn out_of_order_response_is_dropped() {
        let gate = Arc::new(Notify::new());
        let store = store().gated_on("ann", gate.clone());
        let notifier = RecordingNotifier::default();
        let finder = UserFinder::new();
        let me = session("u4");

        let older = finder.search(&store, &notifier, &me, "ann");
        let newer = async {
            let outcome = finder.search(&store, &notifier, &me, "joe").await;
            gate.notify_one();
            outcome
        };
        let (older, newer) = tokio::join!(older, newer);

        assert_eq!(older, SearchOutcome::Stale);
        assert_eq!(newer, SearchOutcome::Applied(1));
        assert_eq!(finder.results()[0].username, "joe");
        assert!(!finder.is_searching());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_searches_settle_idle() {
        let store = Arc::new(store());
        let notifier = Arc::new(RecordingNotifier::default());
        let finder = Arc::new(UserFinder::new());

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let (store, notifier, finder) = (store.clone(), notifier.clone(), finder.clone());
                let query = if i % 2 == 0 { "ann" } else { "joe" };
                tokio::spawn(async move {
                    finder.search(&store, &notifier, &session("u4"), query).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(!finder.is_searching());
        assert!(!finder.results().is_empty());
    }

    #[tokio::test]
    async fn clearing_discards_in_flight_search() {
        let gate = Arc::new(Notify::new());
        let store = store().gated_on("ann", gate.clone());
        let notifier = RecordingNotifier::default();
        let finder = UserFinder::new();
        let me = session("u4");

        let pending = finder.search(&store, &notifier, &me, "ann");
        let erase = async {
            assert!(finder.is_searching());
            let outcome = finder.search(&store, &notifier, &me, "a").await;
            gate.notify_one();
            outcome
        };
        let (pending, erase) = tokio::join!(pending, erase);

        assert_eq!(pending, SearchOutcome::Stale);
        assert_eq!(erase, SearchOutcome::Cleared);
        assert!(finder.results().is_empty());
    }
}
