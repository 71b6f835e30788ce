//! Location bookmarks ("lieux") kept in sync with a remote document store.
//!
//! The core is [`store::SyncStore`]: an in-memory view of the signed-in
//! user's places and tags that persists every change through a
//! [`remote::DocumentStore`] and keeps tags usable offline through a
//! [`cache::LocalCache`].

pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod remote;
pub mod store;

pub use models::{Place, PlaceDraft, PlaceUpdate, Tag};
pub use store::{StoreError, StoreResult, SyncStore};
