//! Synchronized data store.
//!
//! `SyncStore` owns the signed-in user's places and tags in memory and
//! mediates every read and write to the remote document store and the local
//! cache. It is an explicit context object: build one per application, share
//! it by reference, and feed it auth changes.
//!
//! # Session
//!
//! The store is either signed out or signed in as one user. Each transition
//! bumps a session epoch. Async operations capture a `SessionTicket` before
//! their first await and re-check it before writing results back, so a
//! response that arrives after a sign-out (or a switch to another user) is
//! dropped instead of leaking into the new session.
//!
//! # Error contract
//!
//! Place operations run as `StoreResult` internally and are mapped to their
//! public shape by `settle`:
//! - not signed in: no result, `last_error` set, never an `Err`
//! - stale session: no result, silently
//! - anything else: `last_error` set and the error returned
//!
//! `delete_place` reports every failure as `false` instead of an `Err`.

mod error;
mod places;
mod tags;
mod views;

pub use error::{StoreError, StoreResult};

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::auth::AuthSnapshot;
use crate::cache::LocalCache;
use crate::models::{Place, Tag};
use crate::remote::DocumentStore;

/// In-memory state guarded by the store's mutex. Never held across an await.
#[derive(Debug, Default)]
struct StoreState {
    user_id: Option<String>,
    epoch: u64,
    places: Vec<Place>,
    tags: Vec<Tag>,
    last_error: Option<String>,
    in_flight: usize,
}

/// The session an operation started in.
#[derive(Debug, Clone, PartialEq)]
struct SessionTicket {
    user_id: String,
    epoch: u64,
}

impl StoreState {
    fn ticket(&self) -> Option<SessionTicket> {
        self.user_id.as_ref().map(|user_id| SessionTicket {
            user_id: user_id.clone(),
            epoch: self.epoch,
        })
    }

    fn is_current(&self, ticket: &SessionTicket) -> bool {
        self.epoch == ticket.epoch && self.user_id.as_deref() == Some(ticket.user_id.as_str())
    }

    fn reset(&mut self, user_id: Option<String>) {
        self.epoch += 1;
        self.user_id = user_id;
        self.places.clear();
        self.tags.clear();
    }
}

/// Marks an operation in flight for `is_loading`.
struct InFlight<'a> {
    store: &'a SyncStore,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.store.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// The signed-in user's places and tags, synchronized with a remote store.
pub struct SyncStore {
    remote: Arc<dyn DocumentStore>,
    cache: Arc<dyn LocalCache>,
    state: Mutex<StoreState>,
}

impl SyncStore {
    pub fn new(remote: Arc<dyn DocumentStore>, cache: Arc<dyn LocalCache>) -> Self {
        Self {
            remote,
            cache,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ticket(&self) -> Option<SessionTicket> {
        self.lock().ticket()
    }

    /// Start an operation: clears the last error and counts it as in flight.
    fn begin(&self) -> InFlight<'_> {
        self.clear_error();
        self.track()
    }

    /// Count an operation as in flight without touching `last_error`.
    fn track(&self) -> InFlight<'_> {
        self.lock().in_flight += 1;
        InFlight { store: self }
    }

    fn set_error(&self, message: impl Into<String>) {
        self.lock().last_error = Some(message.into());
    }

    /// Map an internal result to the public contract (see module docs).
    fn settle<T>(&self, action: &str, result: StoreResult<T>) -> StoreResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotAuthenticated) => {
                tracing::warn!("Cannot {}: not signed in", action);
                self.set_error(StoreError::NotAuthenticated.to_string());
                Ok(None)
            }
            Err(StoreError::SessionChanged) => {
                tracing::debug!("Dropping {} result from a previous session", action);
                Ok(None)
            }
            Err(err) => {
                tracing::error!("Failed to {}: {}", action, err);
                self.set_error(err.to_string());
                Err(err)
            }
        }
    }

    pub fn current_user(&self) -> Option<String> {
        self.lock().user_id.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().user_id.is_some()
    }

    /// Message of the most recent failure, overwritten by each operation.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    pub fn is_loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    // ==================== Session ====================

    /// Enter the signed-in state and load the user's data.
    ///
    /// Switching to a different user discards all in-memory state first.
    /// Signing in again as the current user only reloads.
    pub async fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        {
            let mut state = self.lock();
            if state.user_id.as_deref() != Some(user_id.as_str()) {
                state.reset(Some(user_id.clone()));
                tracing::info!("Signed in as {}", user_id);
            }
        }
        self.load_all().await;
    }

    /// Leave the signed-in state. Clears places and tags; no network call.
    pub fn sign_out(&self) {
        self.lock().reset(None);
        tracing::info!("Signed out");
    }

    pub async fn handle_auth_change(&self, user: AuthSnapshot) {
        match user {
            Some(user_id) => self.sign_in(user_id).await,
            None => self.sign_out(),
        }
    }

    /// Apply auth changes until the publisher goes away.
    pub async fn follow_auth(&self, mut rx: watch::Receiver<AuthSnapshot>) {
        loop {
            let user = rx.borrow_and_update().clone();
            self.handle_auth_change(user).await;
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Load places and tags concurrently.
    pub async fn load_all(&self) {
        futures::join!(self.load_places(), self.load_tags());
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{gated_harness, harness, signed_in};
    use super::*;
    use crate::auth::AuthState;
    use crate::models::{PlaceDraft, PlaceUpdate};
    use crate::remote::{Operation, PLACES_COLLECTION, TAGS_COLLECTION};
    use serde_json::json;

    #[tokio::test]
    async fn test_initial_state_is_signed_out() {
        let h = harness();
        assert_eq!(h.store.current_user(), None);
        assert!(!h.store.is_authenticated());
        assert!(!h.store.is_loading());
        assert_eq!(h.store.place_count(), 0);
    }

    #[tokio::test]
    async fn test_sign_in_loads_places_and_tags() {
        let h = harness();
        h.remote.seed(PLACES_COLLECTION, json!({ "nom": "A", "userId": "u1" }));
        h.remote.seed(PLACES_COLLECTION, json!({ "nom": "B", "userId": "u2" }));
        h.remote.seed(TAGS_COLLECTION, json!({ "name": "t", "color": "#111", "userId": "u1" }));

        h.store.sign_in("u1").await;

        assert_eq!(h.store.current_user().as_deref(), Some("u1"));
        assert_eq!(h.store.place_count(), 1);
        assert_eq!(h.store.tag_count(), 1);
        let queries = h
            .remote
            .calls()
            .into_iter()
            .filter(|c| c.operation == Operation::Query)
            .count();
        assert_eq!(queries, 2);
    }

    #[tokio::test]
    async fn test_sign_out_clears_state_without_network() {
        let h = signed_in("u1").await;
        h.store
            .add_place(PlaceDraft::new("A", 1.0, 2.0))
            .await
            .unwrap();
        h.store.add_tag("t", "#000").await;
        h.remote.clear_calls();

        h.store.sign_out();

        assert_eq!(h.store.place_count(), 0);
        assert_eq!(h.store.tag_count(), 0);
        assert_eq!(h.store.current_user(), None);
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_switching_user_replaces_state() {
        let h = harness();
        h.remote.seed(PLACES_COLLECTION, json!({ "nom": "Mine", "userId": "u1" }));
        h.remote.seed(PLACES_COLLECTION, json!({ "nom": "Theirs", "userId": "u2" }));

        h.store.sign_in("u1").await;
        assert_eq!(h.store.places()[0].name, "Mine");

        h.store.sign_in("u2").await;
        let places = h.store.places();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Theirs");
    }

    #[tokio::test]
    async fn test_follow_auth_applies_changes() {
        let h = harness();
        h.remote.seed(PLACES_COLLECTION, json!({ "nom": "A", "userId": "u1" }));
        let auth = AuthState::new();
        let rx = auth.subscribe();

        auth.sign_in("u1");
        let follow = h.store.follow_auth(rx);
        let drive = async {
            tokio::task::yield_now().await;
            auth.sign_out();
            drop(auth);
        };
        futures::join!(follow, drive);

        assert_eq!(h.store.current_user(), None);
        assert_eq!(h.store.place_count(), 0);
    }

    #[tokio::test]
    async fn test_add_place_response_after_user_switch_is_dropped() {
        let h = gated_harness();
        h.store.sign_in("u1").await;
        h.remote.hold(Operation::Insert);

        let (result, ()) = futures::join!(
            h.store.add_place(PlaceDraft::new("A", 1.0, 2.0)),
            h.switch_user_while_parked("u2"),
        );

        assert_eq!(result, Ok(None));
        assert_eq!(h.store.current_user().as_deref(), Some("u2"));
        assert_eq!(h.store.place_count(), 0);
        assert_eq!(h.store.last_error(), None);
    }

    #[tokio::test]
    async fn test_update_place_response_after_user_switch_is_dropped() {
        let h = gated_harness();
        h.remote
            .inner
            .seed(PLACES_COLLECTION, json!({ "nom": "Shared", "userId": "u2" }));
        h.store.sign_in("u1").await;
        let mine = h
            .store
            .add_place(PlaceDraft::new("Mine", 1.0, 2.0))
            .await
            .unwrap()
            .unwrap();
        h.remote.hold(Operation::Update);

        let update = PlaceUpdate {
            name: Some("Renamed".into()),
            ..PlaceUpdate::default()
        };
        let (result, ()) = futures::join!(
            h.store.update_place(&mine.id, update),
            h.switch_user_while_parked("u2"),
        );

        assert_eq!(result, Ok(None));
        let names: Vec<_> = h.store.places().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Shared"]);
    }

    #[tokio::test]
    async fn test_load_places_response_after_user_switch_is_dropped() {
        let h = gated_harness();
        h.remote
            .inner
            .seed(PLACES_COLLECTION, json!({ "nom": "Mine", "userId": "u1" }));
        h.remote
            .inner
            .seed(PLACES_COLLECTION, json!({ "nom": "Theirs", "userId": "u2" }));
        h.store.sign_in("u1").await;
        h.remote.hold(Operation::Query);

        futures::join!(h.store.load_places(), h.switch_user_while_parked("u2"));

        let names: Vec<_> = h.store.places().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Theirs"]);
    }

    #[tokio::test]
    async fn test_tag_confirmation_after_user_switch_is_dropped() {
        let h = gated_harness();
        h.store.sign_in("u1").await;
        h.remote.hold(Operation::Insert);

        let (tag, ()) = futures::join!(
            h.store.add_tag("Beach", "#ff0000"),
            h.switch_user_while_parked("u2"),
        );

        let tag = tag.unwrap();
        assert!(tag.is_temporary());
        assert_eq!(h.store.current_user().as_deref(), Some("u2"));
        assert!(h.store.tags().is_empty());
    }

    #[tokio::test]
    async fn test_clear_error() {
        let h = harness();
        let result = h.store.add_place(PlaceDraft::new("A", 0.0, 0.0)).await;
        assert_eq!(result, Ok(None));
        assert_eq!(h.store.last_error().as_deref(), Some("Not signed in"));

        h.store.clear_error();
        assert_eq!(h.store.last_error(), None);
    }
}
