pub mod dates;
mod place;
mod tag;

pub use place::{normalize_tags, Place, PlaceDraft, PlaceKey, PlaceUpdate};
pub use tag::{Tag, DEFAULT_TAG_COLOR, LOCAL_ID_PREFIX};
