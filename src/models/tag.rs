use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use uuid::Uuid;

use crate::remote::{Document, Fields};

/// Display color used for tag names with no matching tag.
pub const DEFAULT_TAG_COLOR: &str = "#6b7280";

/// Prefix of identifiers assigned before the remote store confirms a tag.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// A user-defined label. Places refer to tags by name only.
///
/// The serialized form is what the local cache stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub local_only: bool,
}

#[derive(Deserialize)]
struct TagRecord {
    name: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
}

impl Tag {
    /// A tag that exists only locally, under a temporary id.
    pub fn local(name: impl Into<String>, color: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            id: Some(format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4().simple())),
            name: name.into(),
            color: color.into(),
            user_id,
            local_only: true,
        }
    }

    /// Remote id, if the tag has been confirmed by the remote store.
    pub fn remote_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.starts_with(LOCAL_ID_PREFIX))
    }

    pub fn is_temporary(&self) -> bool {
        self.remote_id().is_none()
    }

    /// The confirmed copy after the remote store assigned `id`.
    pub fn confirmed(&self, id: String, user_id: &str) -> Self {
        Self {
            id: Some(id),
            name: self.name.clone(),
            color: self.color.clone(),
            user_id: Some(user_id.to_string()),
            local_only: false,
        }
    }

    /// Document fields stored remotely. Only name, color and owner are kept.
    pub fn remote_fields(&self, user_id: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!(self.name));
        fields.insert("color".into(), json!(self.color));
        fields.insert("userId".into(), json!(user_id));
        fields
    }

    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        let record: TagRecord = serde_json::from_value(doc.fields.clone().into())?;
        Ok(Self {
            id: Some(doc.id.clone()),
            name: record.name,
            color: record.color.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
            user_id: record.user_id,
            local_only: false,
        })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.color)?;
        if self.local_only {
            write!(f, " [local]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_tag_has_temporary_id() {
        let tag = Tag::local("Beach", "#ff0000", None);
        assert!(tag.local_only);
        assert!(tag.is_temporary());
        assert!(tag.id.as_deref().unwrap().starts_with(LOCAL_ID_PREFIX));
        assert_eq!(tag.remote_id(), None);
    }

    #[test]
    fn test_local_ids_are_unique() {
        let a = Tag::local("a", "#000", None);
        let b = Tag::local("b", "#000", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_confirmed_clears_local_flag() {
        let tag = Tag::local("Beach", "#ff0000", None);
        let confirmed = tag.confirmed("remote-1".into(), "user1");
        assert_eq!(confirmed.remote_id(), Some("remote-1"));
        assert_eq!(confirmed.user_id.as_deref(), Some("user1"));
        assert!(!confirmed.local_only);
        assert_eq!(confirmed.color, "#ff0000");
    }

    #[test]
    fn test_cache_shape() {
        let tag = Tag {
            id: Some("abc".into()),
            name: "Beach".into(),
            color: "#ff0000".into(),
            user_id: None,
            local_only: false,
        };
        let value = serde_json::to_value(&tag).unwrap();
        assert_eq!(value, json!({ "id": "abc", "name": "Beach", "color": "#ff0000" }));

        let parsed: Tag =
            serde_json::from_value(json!({ "name": "Old", "color": "#111", "localOnly": true }))
                .unwrap();
        assert!(parsed.local_only);
        assert_eq!(parsed.id, None);
        assert!(parsed.is_temporary());
    }

    #[test]
    fn test_from_document_defaults_color() {
        let doc = Document::new("t1", json!({ "name": "Hike", "userId": "u" }));
        let tag = Tag::from_document(&doc).unwrap();
        assert_eq!(tag.id.as_deref(), Some("t1"));
        assert_eq!(tag.color, DEFAULT_TAG_COLOR);
        assert_eq!(tag.user_id.as_deref(), Some("u"));
    }

    #[test]
    fn test_remote_fields() {
        let tag = Tag::local("Beach", "#ff0000", None);
        let fields = tag.remote_fields("user1");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["userId"], json!("user1"));
    }
}
