//! Request and requester models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::{fold_key, normalize_text_option};

/// Backend-assigned identifier of a request row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new random request ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Client-side token for a submission the backend has not confirmed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalToken(Uuid);

impl LocalToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for LocalToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Reference to a queue entry as the presentation layer sees it.
///
/// Only `Confirmed` entries accept votes or lock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum RequestRef {
    Confirmed(RequestId),
    PendingCreation(LocalToken),
}

impl RequestRef {
    pub const fn confirmed(self) -> Option<RequestId> {
        match self {
            Self::Confirmed(id) => Some(id),
            Self::PendingCreation(_) => None,
        }
    }
}

impl fmt::Display for RequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed(id) => write!(f, "{id}"),
            Self::PendingCreation(token) => write!(f, "{token}"),
        }
    }
}

/// Where a submission came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    #[default]
    Web,
    Kiosk,
}

/// One person asking for a song; child of exactly one request row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: Uuid,
    pub request_id: RequestId,
    pub name: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "created_at")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: RequestSource,
}

impl Requester {
    /// Message text if it carries anything besides whitespace.
    pub fn message_text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

/// One submission event as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_played: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub requesters: Vec<Requester>,
}

const fn default_active() -> bool {
    true
}

impl Request {
    /// Identity shared by every submission of the same song.
    pub fn merge_key(&self) -> String {
        merge_key(&self.title, self.artist.as_deref())
    }
}

/// `lowercase(trim(title)) + "|" + lowercase(trim(artist))`
pub fn merge_key(title: &str, artist: Option<&str>) -> String {
    format!("{}|{}", fold_key(title), fold_key(artist.unwrap_or_default()))
}

/// Input for a new song request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewRequest {
    pub title: String,
    pub artist: String,
    pub requester_name: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub source: RequestSource,
}

impl NewRequest {
    /// Trim every field and reject missing required values.
    pub fn normalized(self) -> Result<Self> {
        let title = required(self.title, "Song title")?;
        let artist = required(self.artist, "Artist")?;
        let requester_name = required(self.requester_name, "Requester name")?;

        Ok(Self {
            title,
            artist,
            requester_name,
            photo: normalize_text_option(self.photo),
            message: normalize_text_option(self.message),
            source: self.source,
        })
    }

    pub fn merge_key(&self) -> String {
        merge_key(&self.title, Some(&self.artist))
    }
}

fn required(value: String, field: &str) -> Result<String> {
    normalize_text_option(Some(value)).ok_or_else(|| Error::Validation(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_key_ignores_case_and_padding() {
        assert_eq!(
            merge_key("  Mr. Brightside ", Some("The Killers")),
            merge_key("mr. brightside", Some(" the killers "))
        );
        assert_eq!(merge_key("Intro", None), "intro|");
    }

    #[test]
    fn request_id_parse_roundtrip() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn new_request_rejects_missing_fields() {
        let error = NewRequest {
            title: "Song".to_string(),
            artist: "  ".to_string(),
            requester_name: "Ana".to_string(),
            ..Default::default()
        }
        .normalized()
        .unwrap_err();

        match error {
            Error::Validation(message) => assert!(message.contains("Artist")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn new_request_trims_and_drops_empty_optionals() {
        let request = NewRequest {
            title: " Song ".to_string(),
            artist: " Band ".to_string(),
            requester_name: " Ana ".to_string(),
            photo: None,
            message: Some("   ".to_string()),
            source: RequestSource::Kiosk,
        }
        .normalized()
        .unwrap();

        assert_eq!(request.title, "Song");
        assert_eq!(request.artist, "Band");
        assert_eq!(request.requester_name, "Ana");
        assert_eq!(request.message, None);
    }

    #[test]
    fn request_row_deserializes_with_embedded_requesters() {
        let row = r#"
        {
          "id": "6f1c2a56-1a0b-4f55-9f4e-3a9f4b6f2a10",
          "title": "Dancing Queen",
          "artist": null,
          "votes": 2,
          "is_locked": false,
          "is_played": false,
          "created_at": "2024-05-01T20:00:00Z",
          "requesters": [{
            "id": "0d6b1f3e-9e51-4b7c-8f5e-2d6f0f8f8a11",
            "request_id": "6f1c2a56-1a0b-4f55-9f4e-3a9f4b6f2a10",
            "name": "Ana",
            "photo": "https://cdn.example.com/ana.jpg",
            "message": null,
            "source": "kiosk",
            "created_at": "2024-05-01T20:00:01Z"
          }]
        }
        "#;

        let request: Request = serde_json::from_str(row).unwrap();
        assert!(request.is_active);
        assert_eq!(request.merge_key(), "dancing queen|");
        assert_eq!(request.requesters[0].source, RequestSource::Kiosk);
        assert_eq!(request.requesters[0].message_text(), None);
    }

    #[test]
    fn request_ref_only_confirmed_has_id() {
        let id = RequestId::new();
        assert_eq!(RequestRef::Confirmed(id).confirmed(), Some(id));
        assert_eq!(RequestRef::PendingCreation(LocalToken::new()).confirmed(), None);
    }
}
