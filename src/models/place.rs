use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::dates;
use crate::remote::{Document, Fields};

/// A saved point of interest owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub description: String,
    pub lat: f64,
    pub lng: f64,
    pub registered_at: DateTime<Utc>,
    pub event_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
    pub tags: Vec<String>,
    pub notification_enabled: Option<bool>,
}

/// Identity of a place for duplicate detection: (name, lat, lng).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceKey {
    name: String,
    lat: u64,
    lng: u64,
}

impl PlaceKey {
    pub fn new(name: &str, lat: f64, lng: f64) -> Self {
        Self {
            name: name.to_string(),
            lat: coordinate_bits(lat),
            lng: coordinate_bits(lng),
        }
    }
}

// -0.0 and 0.0 are the same coordinate.
fn coordinate_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Remote document layout. Field names are shared with the scheduled event
/// scan and must not change.
#[derive(Serialize)]
struct PlaceDocument<'a> {
    nom: &'a str,
    description: &'a str,
    lat: f64,
    lng: f64,
    #[serde(rename = "dateEnregistrement", with = "dates::timestamp")]
    registered_at: DateTime<Utc>,
    #[serde(rename = "dateEvenement", with = "dates::event_date")]
    event_date: Option<NaiveDate>,
    #[serde(rename = "createdAt", with = "dates::timestamp")]
    created_at: DateTime<Utc>,
    #[serde(rename = "userId")]
    user_id: &'a str,
    tags: &'a [String],
    #[serde(rename = "notificationEnabled", skip_serializing_if = "Option::is_none")]
    notification_enabled: Option<bool>,
}

/// Lenient view of a stored document; every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlaceRecord {
    nom: Option<String>,
    description: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
    #[serde(rename = "dateEnregistrement")]
    registered_at: Option<String>,
    #[serde(rename = "dateEvenement")]
    event_date: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
    tags: Option<Vec<String>>,
    #[serde(rename = "notificationEnabled")]
    notification_enabled: Option<bool>,
}

impl Place {
    pub fn key(&self) -> PlaceKey {
        PlaceKey::new(&self.name, self.lat, self.lng)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t == name)
    }

    /// Remove a tag name. Returns true if the place referenced it.
    pub fn remove_tag(&mut self, name: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != name);
        self.tags.len() != before
    }

    /// Encode as document fields (the id is the document key, not a field).
    pub fn to_fields(&self) -> Result<Fields, serde_json::Error> {
        let doc = PlaceDocument {
            nom: &self.name,
            description: &self.description,
            lat: self.lat,
            lng: self.lng,
            registered_at: self.registered_at,
            event_date: self.event_date,
            created_at: self.created_at,
            user_id: &self.user_id,
            tags: &self.tags,
            notification_enabled: self.notification_enabled,
        };
        match serde_json::to_value(doc)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(serde::ser::Error::custom("place did not encode as an object")),
        }
    }

    /// Decode a stored document, filling in defaults for missing fields:
    /// numbers become 0, timestamps `now`, tags empty, and the owner falls
    /// back to `session_user`.
    pub fn from_document(
        doc: &Document,
        session_user: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let record: PlaceRecord = serde_json::from_value(doc.fields.clone().into())?;

        Ok(Self {
            id: doc.id.clone(),
            name: record.nom.unwrap_or_default(),
            description: record.description.unwrap_or_default(),
            lat: record.lat.filter(|v| !v.is_nan()).unwrap_or(0.0),
            lng: record.lng.filter(|v| !v.is_nan()).unwrap_or(0.0),
            registered_at: dates::timestamp_or(record.registered_at.as_deref(), now),
            event_date: record
                .event_date
                .as_deref()
                .and_then(dates::parse_event_date),
            created_at: dates::timestamp_or(record.created_at.as_deref(), now),
            user_id: record
                .user_id
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| session_user.to_string()),
            tags: record.tags.unwrap_or_default(),
            notification_enabled: record.notification_enabled,
        })
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.chars().count()))?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Location: {:.6}, {:.6}", self.lat, self.lng)?;
        writeln!(f, "Registered: {}", dates::format_timestamp(&self.registered_at))?;

        if let Some(date) = &self.event_date {
            writeln!(f, "Event: {}", dates::format_event_date(date))?;
        }
        if let Some(enabled) = self.notification_enabled {
            writeln!(f, "Notify: {}", if enabled { "yes" } else { "no" })?;
        }
        if !self.tags.is_empty() {
            writeln!(f, "Tags: {}", self.tags.join(", "))?;
        }
        if !self.description.is_empty() {
            writeln!(f, "\n{}", self.description)?;
        }

        Ok(())
    }
}

/// Caller input for a new place. Owner, id and creation time are stamped by
/// the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceDraft {
    pub name: String,
    pub description: String,
    pub lat: f64,
    pub lng: f64,
    pub registered_at: Option<DateTime<Utc>>,
    pub event_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub notification_enabled: Option<bool>,
}

impl PlaceDraft {
    pub fn new(name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            lat,
            lng,
            registered_at: None,
            event_date: None,
            tags: Vec::new(),
            notification_enabled: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_registered_at(mut self, registered_at: DateTime<Utc>) -> Self {
        self.registered_at = Some(registered_at);
        self
    }

    pub fn with_event_date(mut self, date: NaiveDate) -> Self {
        self.event_date = Some(date);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_notification(mut self, enabled: bool) -> Self {
        self.notification_enabled = Some(enabled);
        self
    }

    pub fn key(&self) -> PlaceKey {
        PlaceKey::new(&self.name, self.lat, self.lng)
    }

    /// Build the full record. The id stays empty until the remote store
    /// assigns one.
    pub fn into_place(self, user_id: &str, now: DateTime<Utc>) -> Place {
        Place {
            id: String::new(),
            name: self.name,
            description: self.description,
            lat: self.lat,
            lng: self.lng,
            registered_at: self.registered_at.unwrap_or(now),
            event_date: self.event_date,
            created_at: now,
            user_id: user_id.to_string(),
            tags: normalize_tags(self.tags),
            notification_enabled: self.notification_enabled,
        }
    }
}

/// Partial update. Id, creation time and owner are not representable here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub registered_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the event date.
    pub event_date: Option<Option<NaiveDate>>,
    pub tags: Option<Vec<String>>,
    pub notification_enabled: Option<bool>,
}

impl PlaceUpdate {
    pub fn tags(tags: Vec<String>) -> Self {
        Self {
            tags: Some(tags),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(self, place: &mut Place) {
        if let Some(name) = self.name {
            place.name = name;
        }
        if let Some(description) = self.description {
            place.description = description;
        }
        if let Some(lat) = self.lat {
            place.lat = lat;
        }
        if let Some(lng) = self.lng {
            place.lng = lng;
        }
        if let Some(registered_at) = self.registered_at {
            place.registered_at = registered_at;
        }
        if let Some(event_date) = self.event_date {
            place.event_date = event_date;
        }
        if let Some(tags) = self.tags {
            place.tags = normalize_tags(tags);
        }
        if let Some(enabled) = self.notification_enabled {
            place.notification_enabled = Some(enabled);
        }
    }
}

/// Trim names, drop empties and keep the first occurrence of each name.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}
