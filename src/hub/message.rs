// src/hub/message.rs

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Serialised form of a [`Message`] as handed to client channels.
///
/// Shared, so one broadcast allocates the payload once for all clients.
pub type Wire = Arc<str>;

/// Envelope carried by the hub.
///
/// Empty fields are omitted on the wire. `sender` lets a client recognise
/// (and skip) echoes of its own broadcasts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,
}

impl Message {
    pub fn new(kind: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn to_wire(&self) -> Result<Wire> {
        Ok(serde_json::to_string(self)?.into())
    }

    pub fn from_wire(wire: &str) -> Result<Self> {
        Ok(serde_json::from_str(wire)?)
    }
}
