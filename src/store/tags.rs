use std::collections::HashSet;

use super::{SessionTicket, SyncStore};
use crate::cache::TAGS_CACHE_KEY;
use crate::models::{PlaceUpdate, Tag};
use crate::remote::{Filter, TAGS_COLLECTION};

/// Merge remote tags with local ones.
///
/// Remote wins for a name present on both sides and only the first tag per
/// name is kept. Local tags whose name is absent remotely stay, flagged
/// `local_only`.
pub(crate) fn merge_tags(remote: Vec<Tag>, local: &[Tag]) -> Vec<Tag> {
    let mut names = HashSet::new();
    let mut merged: Vec<Tag> = remote
        .into_iter()
        .filter(|tag| names.insert(tag.name.clone()))
        .collect();

    for tag in local {
        if names.insert(tag.name.clone()) {
            merged.push(Tag {
                local_only: true,
                ..tag.clone()
            });
        }
    }
    merged
}

/// True if the tag belongs to a user other than `user_id`.
fn owned_by_other(tag: &Tag, user_id: &str) -> bool {
    tag.user_id.as_deref().is_some_and(|owner| owner != user_id)
}

impl SyncStore {
    /// Load tags from the local cache, then merge in the user's remote tags.
    ///
    /// The cached list is used on its own when signed out or when the
    /// remote query fails.
    pub async fn load_tags(&self) {
        let _in_flight = self.track();
        let ticket = self.ticket();

        let mut cached = self.read_cached_tags();
        if let Some(ticket) = &ticket {
            cached.retain(|tag| !owned_by_other(tag, &ticket.user_id));
        }
        self.lock().tags = cached;

        let Some(ticket) = ticket else {
            return;
        };

        let filters = [Filter::eq("userId", ticket.user_id.as_str())];
        let docs = match self.remote.query(TAGS_COLLECTION, &filters).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!("Failed to load remote tags, using cache: {}", e);
                return;
            }
        };

        let remote: Vec<Tag> = docs
            .iter()
            .filter_map(|doc| match Tag::from_document(doc) {
                Ok(tag) => Some(tag),
                Err(e) => {
                    tracing::warn!("Skipping unreadable tag {}: {}", doc.id, e);
                    None
                }
            })
            .collect();

        let merged = {
            let mut state = self.lock();
            if !state.is_current(&ticket) {
                tracing::debug!("Dropping tags loaded for a previous session");
                return;
            }
            let merged = merge_tags(remote, &state.tags);
            state.tags = merged.clone();
            merged
        };

        tracing::info!("Loaded {} tag(s) for {}", merged.len(), ticket.user_id);
        self.write_cached_tags(&merged);
    }

    /// Create a tag. The name is trimmed; an empty or already used name
    /// yields `None`.
    ///
    /// The tag is kept locally under a temporary id first. When signed in it
    /// is then saved remotely and the confirmed copy is returned; if that
    /// fails the local-only tag is returned.
    pub async fn add_tag(&self, name: &str, color: &str) -> Option<Tag> {
        let name = name.trim();
        if name.is_empty() {
            tracing::warn!("Not adding tag with an empty name");
            return None;
        }

        let _in_flight = self.begin();
        let ticket = self.ticket();
        let tag = Tag::local(name, color, ticket.as_ref().map(|t| t.user_id.clone()));

        let snapshot = {
            let mut state = self.lock();
            if state.tags.iter().any(|t| t.name == name) {
                tracing::warn!("Tag already exists: {}", name);
                return None;
            }
            state.tags.push(tag.clone());
            state.tags.clone()
        };
        self.write_cached_tags(&snapshot);

        let Some(ticket) = ticket else {
            tracing::info!("Added local tag {}", name);
            return Some(tag);
        };

        match self
            .remote
            .insert(TAGS_COLLECTION, tag.remote_fields(&ticket.user_id))
            .await
        {
            Ok(id) => Some(self.confirm_tag(&ticket, &tag, id).unwrap_or(tag)),
            Err(e) => {
                tracing::warn!("Failed to save tag {} remotely, keeping it local: {}", name, e);
                Some(tag)
            }
        }
    }

    /// Delete a tag by name and strip it from every place.
    ///
    /// Remote failures are logged and do not stop the local removal.
    pub async fn delete_tag(&self, name: &str) -> bool {
        let name = name.trim();
        let _in_flight = self.begin();
        let ticket = self.ticket();

        let tag = self.lock().tags.iter().find(|t| t.name == name).cloned();
        let Some(tag) = tag else {
            tracing::warn!("No tag named {}", name);
            return false;
        };

        if let Some(ticket) = &ticket {
            self.delete_remote_tag(ticket, &tag).await;
            if !self.lock().is_current(ticket) {
                tracing::debug!("Session changed while deleting tag {}", name);
                return true;
            }
        }

        let (snapshot, affected) = {
            let mut state = self.lock();
            state.tags.retain(|t| t.name != name);
            let affected: Vec<(String, Vec<String>)> = state
                .places
                .iter_mut()
                .filter_map(|place| {
                    place
                        .remove_tag(name)
                        .then(|| (place.id.clone(), place.tags.clone()))
                })
                .collect();
            (state.tags.clone(), affected)
        };
        self.write_cached_tags(&snapshot);

        if ticket.is_some() {
            for (id, tags) in affected {
                if let Err(e) = self.update_place(&id, PlaceUpdate::tags(tags)).await {
                    tracing::warn!("Failed to remove tag {} from place {}: {}", name, id, e);
                }
            }
        }

        tracing::info!("Deleted tag {}", name);
        true
    }

    /// Save every local-only tag remotely. Returns how many were confirmed.
    pub async fn push_local_tags(&self) -> usize {
        let Some(ticket) = self.ticket() else {
            tracing::warn!("Not pushing tags: no signed-in user");
            return 0;
        };
        let _in_flight = self.begin();

        let pending: Vec<Tag> = self
            .lock()
            .tags
            .iter()
            .filter(|t| t.local_only)
            .cloned()
            .collect();

        let mut confirmed = 0;
        for tag in pending {
            match self
                .remote
                .insert(TAGS_COLLECTION, tag.remote_fields(&ticket.user_id))
                .await
            {
                Ok(id) => {
                    if self.confirm_tag(&ticket, &tag, id).is_some() {
                        confirmed += 1;
                    }
                }
                Err(e) => tracing::warn!("Failed to push tag {}: {}", tag.name, e),
            }
        }

        tracing::info!("Pushed {} local tag(s)", confirmed);
        confirmed
    }

    /// Swap a temporary tag for its confirmed copy. `None` if the session
    /// changed or the tag is gone.
    fn confirm_tag(&self, ticket: &SessionTicket, temp: &Tag, id: String) -> Option<Tag> {
        let (confirmed, snapshot) = {
            let mut state = self.lock();
            if !state.is_current(ticket) {
                tracing::debug!("Dropping tag confirmation from a previous session");
                return None;
            }
            let slot = state
                .tags
                .iter_mut()
                .find(|t| t.id == temp.id && t.name == temp.name)?;
            *slot = slot.confirmed(id, &ticket.user_id);
            (slot.clone(), state.tags.clone())
        };
        self.write_cached_tags(&snapshot);
        Some(confirmed)
    }

    async fn delete_remote_tag(&self, ticket: &SessionTicket, tag: &Tag) {
        let Some(id) = tag.remote_id() else {
            return;
        };
        match self.remote.delete(TAGS_COLLECTION, id).await {
            Ok(()) => return,
            Err(e) => tracing::warn!("Failed to delete tag {} by id, retrying by name: {}", id, e),
        }

        let filters = [
            Filter::eq("name", tag.name.as_str()),
            Filter::eq("userId", ticket.user_id.as_str()),
        ];
        let docs = match self.remote.query(TAGS_COLLECTION, &filters).await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!("Failed to look up tag {}: {}", tag.name, e);
                return;
            }
        };
        match docs.first() {
            Some(doc) => {
                if let Err(e) = self.remote.delete(TAGS_COLLECTION, &doc.id).await {
                    tracing::warn!("Failed to delete tag {}: {}", tag.name, e);
                }
            }
            None => tracing::debug!("No remote tag named {}", tag.name),
        }
    }

    /// Cached tag list. Unreadable data is removed and treated as empty.
    fn read_cached_tags(&self) -> Vec<Tag> {
        let Some(raw) = self.cache.get(TAGS_CACHE_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!("Discarding unreadable tag cache: {}", e);
                self.cache.remove(TAGS_CACHE_KEY);
                Vec::new()
            }
        }
    }

    /// Persist `tags`. While signed in, cached tags of other users are
    /// hidden from memory but must survive in the cache.
    fn write_cached_tags(&self, tags: &[Tag]) {
        let mut entries = tags.to_vec();
        if let Some(user_id) = self.current_user() {
            entries.extend(
                self.read_cached_tags()
                    .into_iter()
                    .filter(|tag| owned_by_other(tag, &user_id)),
            );
        }
        let result = serde_json::to_string(&entries)
            .map_err(crate::cache::CacheError::from)
            .and_then(|raw| self.cache.set(TAGS_CACHE_KEY, &raw));
        if let Err(e) = result {
            tracing::warn!("Failed to write tag cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::models::PlaceDraft;
    use crate::remote::{Operation, RemoteError, PLACES_COLLECTION};
    use crate::store::testing::{harness, signed_in};
    use serde_json::json;

    fn remote_tag(id: &str, name: &str, color: &str) -> Tag {
        Tag {
            id: Some(id.into()),
            name: name.into(),
            color: color.into(),
            user_id: Some("u1".into()),
            local_only: false,
        }
    }

    fn cached_tags(cache: &dyn LocalCache) -> Vec<Tag> {
        serde_json::from_str(&cache.get(TAGS_CACHE_KEY).unwrap()).unwrap()
    }

    #[test]
    fn test_merge_prefers_remote_and_keeps_local_extras() {
        let remote = vec![
            remote_tag("r1", "Beach", "#111111"),
            remote_tag("r2", "Beach", "#222222"),
            remote_tag("r3", "Sun", "#333333"),
        ];
        let local = vec![
            Tag::local("Beach", "#999999", None),
            Tag::local("Food", "#444444", None),
        ];

        let merged = merge_tags(remote, &local);

        let names: Vec<_> = merged.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Beach", "Sun", "Food"]);
        assert_eq!(merged[0].color, "#111111");
        assert!(!merged[0].local_only);
        assert!(merged[2].local_only);
    }

    #[tokio::test]
    async fn test_add_tag_trims_and_rejects_duplicates() {
        let h = signed_in("u1").await;

        let tag = h.store.add_tag("  Beach  ", "#ff0000").await.unwrap();
        assert_eq!(tag.name, "Beach");
        assert!(!tag.is_temporary());
        assert_eq!(tag.user_id.as_deref(), Some("u1"));

        assert_eq!(h.store.add_tag("Beach", "#00ff00").await, None);
        assert_eq!(h.store.tag_count(), 1);
        assert_eq!(h.store.tag_color("Beach"), "#ff0000");
        assert_eq!(h.remote.documents(TAGS_COLLECTION).len(), 1);
        assert_eq!(cached_tags(h.cache.as_ref()), h.store.tags());
    }

    #[tokio::test]
    async fn test_add_tag_empty_name() {
        let h = signed_in("u1").await;
        assert_eq!(h.store.add_tag("   ", "#000").await, None);
        assert_eq!(h.store.tag_count(), 0);
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_add_tag_remote_failure_keeps_local_tag() {
        let h = signed_in("u1").await;
        h.remote
            .fail_next(Operation::Insert, RemoteError::Unavailable("offline".into()));

        let tag = h.store.add_tag("Beach", "#ff0000").await.unwrap();

        assert!(tag.local_only);
        assert!(tag.is_temporary());
        assert_eq!(h.store.tags(), vec![tag.clone()]);
        assert_eq!(cached_tags(h.cache.as_ref()), vec![tag]);
    }

    #[tokio::test]
    async fn test_delete_tag_strips_places() {
        let h = signed_in("u1").await;
        h.store.add_tag("Beach", "#ff0000").await.unwrap();
        let tags = vec!["Beach".to_string(), "Sun".to_string()];
        let a = h
            .store
            .add_place(PlaceDraft::new("A", 1.0, 1.0).with_tags(tags))
            .await
            .unwrap()
            .unwrap();
        let b = h
            .store
            .add_place(PlaceDraft::new("B", 2.0, 2.0).with_tags(vec!["Beach".into()]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.store.used_tags(), vec!["Beach", "Sun"]);

        assert!(h.store.delete_tag("Beach").await);

        assert_eq!(h.store.tag_count(), 0);
        assert_eq!(h.store.used_tags(), vec!["Sun"]);
        assert!(h.remote.documents(TAGS_COLLECTION).is_empty());
        assert_eq!(
            h.remote.get(PLACES_COLLECTION, &a.id).unwrap().fields["tags"],
            json!(["Sun"])
        );
        assert_eq!(
            h.remote.get(PLACES_COLLECTION, &b.id).unwrap().fields["tags"],
            json!([])
        );
        assert!(cached_tags(h.cache.as_ref()).is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_tag() {
        let h = signed_in("u1").await;
        assert!(!h.store.delete_tag("Nope").await);
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_fallback_matches_name_and_owner() {
        let h = harness();
        let theirs = h
            .remote
            .seed(TAGS_COLLECTION, json!({ "name": "Beach", "color": "#000", "userId": "u2" }));
        h.remote
            .seed(TAGS_COLLECTION, json!({ "name": "Beach", "color": "#fff", "userId": "u1" }));
        h.store.sign_in("u1").await;
        assert_eq!(h.store.tag_count(), 1);

        h.remote
            .fail_next(Operation::Delete, RemoteError::Unavailable("flaky".into()));
        assert!(h.store.delete_tag("Beach").await);

        let remaining = h.remote.documents(TAGS_COLLECTION);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, theirs);
        assert_eq!(h.store.tag_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_tag_converges_after_sign_in() {
        let h = harness();
        let offline = h.store.add_tag("Beach", "#ff0000").await.unwrap();
        assert!(offline.local_only);
        assert_eq!(h.remote.call_count(), 0);

        h.store.sign_in("u1").await;
        assert_eq!(h.store.tags().len(), 1);
        assert!(h.store.tags()[0].local_only);

        assert_eq!(h.store.push_local_tags().await, 1);
        h.store.load_tags().await;

        let tags = h.store.tags();
        assert_eq!(tags.len(), 1);
        assert!(!tags[0].local_only);
        assert_eq!(tags[0].color, "#ff0000");
        assert_eq!(h.remote.documents(TAGS_COLLECTION).len(), 1);
    }

    #[tokio::test]
    async fn test_push_local_tags_signed_out() {
        let h = harness();
        h.store.add_tag("Beach", "#ff0000").await;
        assert_eq!(h.store.push_local_tags().await, 0);
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_removed() {
        let h = harness();
        h.cache.set(TAGS_CACHE_KEY, "not json").unwrap();

        h.store.sign_in("u1").await;

        assert_eq!(h.store.tag_count(), 0);
        assert_eq!(h.cache.get(TAGS_CACHE_KEY).as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_cached_tags_of_other_user_are_dropped() {
        let h = harness();
        let mut foreign = Tag::local("Theirs", "#000", Some("u2".into()));
        foreign.local_only = false;
        let anonymous = Tag::local("Mine", "#fff", None);
        let raw = serde_json::to_string(&vec![foreign, anonymous]).unwrap();
        h.cache.set(TAGS_CACHE_KEY, &raw).unwrap();

        h.store.sign_in("u1").await;

        let names: Vec<_> = h.store.tags().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Mine"]);
    }

    #[tokio::test]
    async fn test_other_users_offline_tags_survive_sign_in() {
        let h = signed_in("u2").await;
        h.remote
            .fail_next(Operation::Insert, RemoteError::Unavailable("offline".into()));
        let secret = h.store.add_tag("Secret", "#123456").await.unwrap();
        assert!(secret.local_only);
        h.store.sign_out();

        h.store.sign_in("u1").await;
        assert_eq!(h.store.tag_count(), 0);
        h.store.add_tag("Beach", "#ff0000").await.unwrap();
        let cached: Vec<_> = cached_tags(h.cache.as_ref())
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(cached, vec!["Beach", "Secret"]);
        h.store.sign_out();

        h.store.sign_in("u2").await;
        let tags = h.store.tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "Secret");
        assert!(tags[0].local_only);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_cached_tags() {
        let h = signed_in("u1").await;
        h.store.add_tag("Beach", "#ff0000").await.unwrap();
        h.remote
            .fail_next(Operation::Query, RemoteError::Unavailable("offline".into()));

        h.store.load_tags().await;

        assert_eq!(h.store.tag_count(), 1);
        assert_eq!(h.store.tags()[0].name, "Beach");
    }
}
