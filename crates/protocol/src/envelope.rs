use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;

/// Unit of data crossing the wire and the unit of fan-out.
///
/// `payload` is kept as a loosely typed [`Value`] so that a single decoded
/// frame can be handed to many subscribers; each consumer decodes it into
/// the concrete type it expects with [`Envelope::parse_payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Creates an envelope from any serializable payload.
    pub fn new<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: event_type.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Parses one textual frame. Only a JSON object with a string `type`
    /// is accepted.
    pub fn from_frame(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(FrameError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serializes the envelope into one textual frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the payload into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// Returns `true` if this envelope carries the given tag.
    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}
