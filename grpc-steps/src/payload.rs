//! # Payload Codec
//!
//! Turns the textual documents written in scenarios into [`DynamicMessage`]s and the
//! messages received from a server back into text.
//!
//! * Request documents are extended JSON (see [`extjson`]). Methods whose client side streams
//!   (client streaming and bidirectional) take a JSON array, one element per message.
//! * Unknown fields are ignored while decoding.
//! * Responses are always rendered in canonical extended JSON.
pub mod extjson;

use crate::registry::StreamingShape;
use extjson::ExtJsonError;
use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Payload is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error(transparent)]
    ExtJson(#[from] ExtJsonError),
    #[error("Expected a JSON array of '{0}' messages for a client stream")]
    ExpectedSequence(String),
    #[error("Expected a single JSON object for a '{0}' message")]
    ExpectedDocument(String),
    #[error("Payload does not match the schema of '{message}': {source}")]
    Schema {
        message: String,
        source: serde_json::Error,
    },
    #[error("Failed to render the response: {0}")]
    Render(#[source] serde_json::Error),
}

/// One message, or an ordered sequence of messages for the streaming side of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Single(DynamicMessage),
    Sequence(Vec<DynamicMessage>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Single(_) => 1,
            Payload::Sequence(messages) => messages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decodes a request document against `schema`.
pub fn decode(
    schema: &MessageDescriptor,
    shape: StreamingShape,
    text: &str,
) -> Result<Payload, PayloadError> {
    let document = serde_json::from_str(text).map_err(PayloadError::Syntax)?;
    let document = extjson::to_plain(document)?;

    if shape.is_client_streaming() {
        let Value::Array(items) = document else {
            return Err(PayloadError::ExpectedSequence(schema.full_name().to_string()));
        };

        items
            .into_iter()
            .map(|item| to_message(schema, item))
            .collect::<Result<_, _>>()
            .map(Payload::Sequence)
    } else {
        if !document.is_object() {
            return Err(PayloadError::ExpectedDocument(schema.full_name().to_string()));
        }

        to_message(schema, document).map(Payload::Single)
    }
}

/// Renders a response in canonical extended JSON.
pub fn encode(payload: &Payload) -> Result<String, PayloadError> {
    let document = match payload {
        Payload::Single(message) => extjson::from_message(message)?,
        Payload::Sequence(messages) => Value::Array(
            messages
                .iter()
                .map(extjson::from_message)
                .collect::<Result<_, _>>()?,
        ),
    };

    serde_json::to_string(&document).map_err(PayloadError::Render)
}

/// Replaces every variable name found in `text` by its value.
///
/// Only string and integer values are substituted. Names are replaced in lexical order,
/// so a name that is a substring of another one may shadow it.
pub fn substitute(text: &str, vars: &BTreeMap<String, Value>) -> String {
    let mut text = text.to_string();

    for (name, value) in vars {
        let replacement = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
            _ => continue,
        };

        if text.contains(name.as_str()) {
            trace!(%name, %replacement, "substituting variable");
            text = text.replace(name.as_str(), &replacement);
        }
    }

    text
}

fn to_message(schema: &MessageDescriptor, document: Value) -> Result<DynamicMessage, PayloadError> {
    let options = DeserializeOptions::new().deny_unknown_fields(false);

    DynamicMessage::deserialize_with_options(schema.clone(), document, &options).map_err(
        |source| PayloadError::Schema {
            message: schema.full_name().to_string(),
            source,
        },
    )
}
