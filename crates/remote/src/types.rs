//! Wire types of the message channel API.

use serde::{Deserialize, Serialize};

/// `payload_json` part sent alongside each slice attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Slice index, shown as the message text.
    pub content: String,
    /// Random token the channel uses to deduplicate sends.
    pub nonce: String,
    pub tts: bool,
}

/// The subset of a created message the store cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageResponse {
    /// URL of the first attachment, which is the slice locator.
    pub fn attachment_url(&self) -> Option<&str> {
        self.attachments.first().map(|a| a.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}
