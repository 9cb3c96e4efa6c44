//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while converting between wire form and typed form.
///
/// Decode failures are always non-fatal to the engine: a malformed payload
/// on one topic must never stop delivery on any other.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload on a known topic failed to parse.
    #[error("malformed payload on {topic}: {source}")]
    Decode {
        /// Topic path the payload arrived on.
        topic: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Outgoing payload failed to serialize.
    #[error("failed to encode payload for {destination}: {source}")]
    Encode {
        /// Destination path of the publish.
        destination: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Topic path does not match any known template.
    #[error("unrecognized topic: {0}")]
    UnknownTopic(String),
}
