use chrono::Utc;
use std::collections::HashMap;

use super::{StoreError, StoreResult, SyncStore};
use crate::models::{Place, PlaceDraft, PlaceUpdate};
use crate::remote::{Filter, PLACES_COLLECTION};

/// Collapse places sharing (name, lat, lng). The later entry wins but takes
/// the position of the first one.
pub(crate) fn dedup_places(places: Vec<Place>) -> Vec<Place> {
    let mut positions = HashMap::with_capacity(places.len());
    let mut out: Vec<Place> = Vec::with_capacity(places.len());
    for place in places {
        match positions.get(&place.key()) {
            Some(&idx) => out[idx] = place,
            None => {
                positions.insert(place.key(), out.len());
                out.push(place);
            }
        }
    }
    out
}

impl SyncStore {
    /// Replace the in-memory places with the signed-in user's stored places.
    ///
    /// This is a full refresh: unsaved local edits are discarded. Read
    /// failures leave an empty collection; permission errors only warn.
    pub async fn load_places(&self) {
        let Some(ticket) = self.ticket() else {
            tracing::warn!("Not loading places: no signed-in user");
            return;
        };
        let _in_flight = self.begin();

        let filters = [Filter::eq("userId", ticket.user_id.as_str())];
        let result = self.remote.query(PLACES_COLLECTION, &filters).await;

        let now = Utc::now();
        let (places, error) = match result {
            Ok(docs) => {
                let places = docs
                    .iter()
                    .filter_map(|doc| match Place::from_document(doc, &ticket.user_id, now) {
                        Ok(place) => Some(place),
                        Err(e) => {
                            tracing::warn!("Skipping unreadable place {}: {}", doc.id, e);
                            None
                        }
                    })
                    .collect();
                (places, None)
            }
            Err(e) if e.is_permission_denied() => {
                tracing::warn!("Permission denied loading places, continuing offline: {}", e);
                (Vec::new(), None)
            }
            Err(e) => {
                tracing::error!("Failed to load places: {}", e);
                (Vec::new(), Some(e.to_string()))
            }
        };

        let mut state = self.lock();
        if !state.is_current(&ticket) {
            tracing::debug!("Dropping places loaded for a previous session");
            return;
        }
        tracing::info!("Loaded {} place(s) for {}", places.len(), ticket.user_id);
        state.places = places;
        if error.is_some() {
            state.last_error = error;
        }
    }

    /// Save a new place for the signed-in user.
    ///
    /// Returns `Ok(None)` when signed out or when a place with the same
    /// name and coordinates already exists. The remote write happens first;
    /// memory is only touched once it succeeds.
    pub async fn add_place(&self, draft: PlaceDraft) -> StoreResult<Option<Place>> {
        let _in_flight = self.begin();
        let result = self.try_add_place(draft).await;
        self.settle("add place", result).map(Option::flatten)
    }

    async fn try_add_place(&self, draft: PlaceDraft) -> StoreResult<Option<Place>> {
        let ticket = self.ticket().ok_or(StoreError::NotAuthenticated)?;

        let key = draft.key();
        let exists = self.lock().places.iter().any(|p| p.key() == key);
        if exists {
            tracing::warn!("Place already exists, not adding: {}", draft.name);
            return Ok(None);
        }

        let mut place = draft.into_place(&ticket.user_id, Utc::now());
        let id = self
            .remote
            .insert(PLACES_COLLECTION, place.to_fields()?)
            .await?;
        place.id = id;

        {
            let mut state = self.lock();
            if !state.is_current(&ticket) {
                return Err(StoreError::SessionChanged);
            }
            state.places.push(place.clone());
            let places = std::mem::take(&mut state.places);
            state.places = dedup_places(places);
        }

        tracing::info!("Added place {} ({})", place.name, place.id);
        Ok(Some(place))
    }

    /// Apply a partial update to one of the user's places.
    ///
    /// Fails with `PlaceNotFound` or `NotAuthorized` before any network
    /// call. Returns `Ok(None)` when signed out.
    pub async fn update_place(&self, id: &str, update: PlaceUpdate) -> StoreResult<Option<Place>> {
        let _in_flight = self.begin();
        let result = self.try_update_place(id, update).await;
        self.settle("update place", result)
    }

    async fn try_update_place(&self, id: &str, update: PlaceUpdate) -> StoreResult<Place> {
        let ticket = self.ticket().ok_or(StoreError::NotAuthenticated)?;

        let mut merged = self.owned_place(id, &ticket.user_id)?;
        update.apply_to(&mut merged);

        self.remote
            .update(PLACES_COLLECTION, id, merged.to_fields()?)
            .await?;

        {
            let mut state = self.lock();
            if !state.is_current(&ticket) {
                return Err(StoreError::SessionChanged);
            }
            if let Some(slot) = state.places.iter_mut().find(|p| p.id == id) {
                *slot = merged.clone();
            }
        }

        tracing::info!("Updated place {}", id);
        Ok(merged)
    }

    /// Delete one of the user's places. Every failure, including signed-out,
    /// unknown id and foreign owner, is reported as `false`.
    pub async fn delete_place(&self, id: &str) -> bool {
        let _in_flight = self.begin();
        let result = self.try_delete_place(id).await;
        matches!(self.settle("delete place", result), Ok(Some(())))
    }

    async fn try_delete_place(&self, id: &str) -> StoreResult<()> {
        let ticket = self.ticket().ok_or(StoreError::NotAuthenticated)?;

        self.owned_place(id, &ticket.user_id)?;

        self.remote.delete(PLACES_COLLECTION, id).await?;

        {
            let mut state = self.lock();
            if !state.is_current(&ticket) {
                return Err(StoreError::SessionChanged);
            }
            state.places.retain(|p| p.id != id);
        }

        tracing::info!("Deleted place {}", id);
        Ok(())
    }

    /// Copy of an in-memory place, checked for ownership.
    fn owned_place(&self, id: &str, user_id: &str) -> StoreResult<Place> {
        let state = self.lock();
        let place = state
            .places
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::PlaceNotFound(id.to_string()))?;
        if place.user_id != user_id {
            return Err(StoreError::NotAuthorized(id.to_string()));
        }
        Ok(place.clone())
    }
}
