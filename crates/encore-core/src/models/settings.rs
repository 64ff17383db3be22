//! Queue settings model

use serde::{Deserialize, Serialize};

/// Operator-controlled switches for the request queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Whether new submissions are accepted
    #[serde(default = "default_accepting")]
    pub accepting_requests: bool,
    /// Longest requester message accepted, in characters
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

const fn default_accepting() -> bool {
    true
}

const fn default_max_message_len() -> usize {
    200
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            accepting_requests: default_accepting(),
            max_message_len: default_max_message_len(),
        }
    }
}
