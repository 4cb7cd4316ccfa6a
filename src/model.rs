use chrono::{DateTime, Local};
use std::fmt;

/// Availability reported by the endpoint's `pickupDisplay` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Available,
    Unavailable,
    Unknown,
}

impl Status {
    /// Maps the raw `pickupDisplay` value. Anything but `"available"` is
    /// unavailable; a missing field is unknown.
    pub fn from_display(display: Option<&str>) -> Self {
        match display {
            Some(text) if text.trim().eq_ignore_ascii_case("available") => Status::Available,
            Some(_) => Status::Unavailable,
            None => Status::Unknown,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Available => "available",
            Status::Unavailable => "unavailable",
            Status::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// One store's parsed availability for a single iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilitySnapshot {
    pub store_name: String,
    pub status: Status,
    pub display_text: String,
    pub raw_quote: String,
    pub observed_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Request,
    MalformedPayload,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Request => "request",
            TransportErrorKind::MalformedPayload => "malformed payload",
        };
        f.write_str(text)
    }
}

/// Result of fetching one store. Fetch failures are values, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(AvailabilitySnapshot),
    HttpError {
        status_code: u16,
        body: String,
    },
    TransportError {
        kind: TransportErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BecameAvailable,
    RestockDateChanged,
    StatusChanged,
}

/// What gets handed to every notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub store_name: String,
    pub kind: EventKind,
    pub message_text: String,
}
