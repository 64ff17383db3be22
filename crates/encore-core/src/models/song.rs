//! Song catalog model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference data maintained by the operator; read-only to the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub album_art_url: Option<String>,
}

impl Song {
    pub fn merge_key(&self) -> String {
        super::merge_key(&self.title, Some(&self.artist))
    }
}
