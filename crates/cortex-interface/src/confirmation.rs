//! Two-turn confirmation flow.
//!
//! A handler that wants explicit user approval stores a
//! [`PendingConfirmation`]; the next inbound message is parsed with
//! [`parse_confirmation_response`] and either routed to the stored tool or
//! treated as normal input.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation awaiting user approval. At most one exists per
/// conversation; storing a second replaces the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    /// Plugin that owns the tool, for dispatch.
    pub plugin_id: String,
    /// Fully prefixed tool name.
    pub tool_name: String,
    /// Shown to the user when asking.
    pub description: String,
    pub args: Value,
}

/// Parsed yes/no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationReply {
    pub confirmed: bool,
}

const POSITIVE: &[&str] = &["yes", "y", "ok", "sure", "proceed", "confirm", "go"];
const NEGATIVE: &[&str] = &["no", "n", "cancel", "abort", "stop", "nope"];

/// Interprets a reply to a pending confirmation.
///
/// Comparison is lowercased and trimmed. Anything outside the two token
/// sets — including numeric-prefixed answers like `1. yes` — is
/// unrecognized and returns `None`.
pub fn parse_confirmation_response(text: &str) -> Option<ConfirmationReply> {
    let normalized = text.trim().to_lowercase();
    if POSITIVE.contains(&normalized.as_str()) {
        Some(ConfirmationReply { confirmed: true })
    } else if NEGATIVE.contains(&normalized.as_str()) {
        Some(ConfirmationReply { confirmed: false })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_and_negative_sets() {
        for token in ["yes", "y", "ok", "sure", "proceed", "confirm", "go"] {
            assert_eq!(
                parse_confirmation_response(token),
                Some(ConfirmationReply { confirmed: true }),
                "{token}"
            );
        }
        for token in ["no", "n", "cancel", "abort", "stop", "nope"] {
            assert_eq!(
                parse_confirmation_response(token),
                Some(ConfirmationReply { confirmed: false }),
                "{token}"
            );
        }
    }

    #[test]
    fn stable_under_whitespace_and_case() {
        assert_eq!(
            parse_confirmation_response("  YES  "),
            Some(ConfirmationReply { confirmed: true })
        );
        assert_eq!(
            parse_confirmation_response("\tNope\n"),
            Some(ConfirmationReply { confirmed: false })
        );
    }

    #[test]
    fn unrecognized_input_returns_none() {
        assert_eq!(parse_confirmation_response("1. yes"), None);
        assert_eq!(parse_confirmation_response("yes please"), None);
        assert_eq!(parse_confirmation_response(""), None);
        assert_eq!(parse_confirmation_response("maybe"), None);
    }
}
