use serde::Serialize;

/// What [`crate::Bridge::handle_inbound`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum InboundOutcome {
    /// The message id was already admitted or finalized. Not an error; the
    /// enclosing service still acknowledges the webhook.
    DuplicateSuppressed,
    /// AI mode: a reply was produced and delivered.
    Replied { ty_uid: String, attempts: usize },
    /// HUMAN mode: the AI suggestion went to the CRM as a private note, no
    /// channel send.
    SuggestionPosted { ty_uid: String },
    /// AI mode, but the delivery failed after reply production; an alert
    /// note went to the CRM instead of a visible message.
    DeliveryFailed { ty_uid: String, error: String },
    /// Event older than the staleness threshold; identity and CRM
    /// bookkeeping ran, reply production was skipped.
    Stale { ty_uid: String },
}
