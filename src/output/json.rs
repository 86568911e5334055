//! Machine-readable envelope output.

use crate::models::ResponseEnvelope;

/// Pretty-printed JSON of the full envelope.
pub fn render(envelope: &ResponseEnvelope) -> String {
    serde_json::to_string_pretty(envelope).expect("envelope serializes")
}
