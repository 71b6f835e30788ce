//! Read-only views over the in-memory collections, recomputed on each call.

use std::collections::BTreeSet;

use super::SyncStore;
use crate::models::{Place, Tag, DEFAULT_TAG_COLOR};

impl SyncStore {
    pub fn places(&self) -> Vec<Place> {
        self.lock().places.clone()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.lock().tags.clone()
    }

    pub fn place_count(&self) -> usize {
        self.lock().places.len()
    }

    pub fn tag_count(&self) -> usize {
        self.lock().tags.len()
    }

    /// Places by registration time, newest first. Ties keep load order.
    pub fn places_by_date(&self) -> Vec<Place> {
        let mut places = self.places();
        places.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        places
    }

    pub fn place_by_id(&self, id: &str) -> Option<Place> {
        self.lock().places.iter().find(|p| p.id == id).cloned()
    }

    /// Display color for a tag name, falling back to the default gray.
    pub fn tag_color(&self, name: &str) -> String {
        self.lock()
            .tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.color.clone())
            .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string())
    }

    /// Distinct tag names referenced by any place, sorted.
    pub fn used_tags(&self) -> Vec<String> {
        let state = self.lock();
        let names: BTreeSet<&str> = state
            .places
            .iter()
            .flat_map(|p| p.tags.iter().map(String::as_str))
            .collect();
        names.into_iter().map(str::to_string).collect()
    }
}
