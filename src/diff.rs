//! Change detection between consecutive snapshots of the same store.
//!
//! Classification is pure; [`LastKnownState::observe`] is the only place the
//! per-store state changes, once per successful fetch.

use serde::Deserialize;
use std::collections::HashMap;

use crate::model::{AvailabilitySnapshot, EventKind, NotificationEvent, Status};

/// Separator between the availability text and the restock date in a quote.
pub const QUOTE_DELIMITER: &str = "<br/>";

/// How two snapshots are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffPolicy {
    /// Compare the date token following [`QUOTE_DELIMITER`] in the quote.
    #[default]
    DateSubstring,
    /// Compare the structured status and the raw quote text.
    AvailabilityField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    FirstObservation,
    Unchanged,
    StillUnavailable,
    BecameAvailable,
    RestockDateChanged {
        previous: Option<String>,
        current: String,
    },
    StatusChanged {
        previous: Status,
        current: Status,
    },
    Unparseable,
}

impl Classification {
    pub fn is_notable(&self) -> bool {
        matches!(
            self,
            Classification::BecameAvailable
                | Classification::RestockDateChanged { .. }
                | Classification::StatusChanged { .. }
        )
    }

    /// Builds the event to send for notable classifications.
    pub fn event(&self, snapshot: &AvailabilitySnapshot) -> Option<NotificationEvent> {
        let store = &snapshot.store_name;
        let (kind, message_text) = match self {
            Classification::BecameAvailable => (
                EventKind::BecameAvailable,
                format!("Product now in stock at {store}: {}", snapshot.raw_quote),
            ),
            Classification::RestockDateChanged { current, .. } => (
                EventKind::RestockDateChanged,
                format!("The new date for {store} is {current}"),
            ),
            Classification::StatusChanged { previous, current } => (
                EventKind::StatusChanged,
                format!("Pickup status for {store} changed from {previous} to {current}"),
            ),
            _ => return None,
        };

        Some(NotificationEvent {
            store_name: store.clone(),
            kind,
            message_text,
        })
    }
}

/// Splits a quote into its date token. Only an exact two-part split counts.
pub fn restock_date(raw_quote: &str) -> Option<&str> {
    let mut parts = raw_quote.split(QUOTE_DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(date), None) => Some(date),
        _ => None,
    }
}

/// What is remembered about one store between iterations.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRecord {
    pub snapshot: AvailabilitySnapshot,
    /// Last parseable restock date; the date policy's comparison baseline.
    pub restock_date: Option<String>,
}

/// Classifies `current` against what was last recorded for the same store.
pub fn classify(
    policy: DiffPolicy,
    previous: Option<&StoreRecord>,
    current: &AvailabilitySnapshot,
) -> Classification {
    let Some(previous) = previous else {
        return Classification::FirstObservation;
    };

    match policy {
        DiffPolicy::DateSubstring => classify_by_date(previous, current),
        DiffPolicy::AvailabilityField => classify_by_status(&previous.snapshot, current),
    }
}

fn classify_by_date(previous: &StoreRecord, current: &AvailabilitySnapshot) -> Classification {
    let Some(date) = restock_date(&current.raw_quote) else {
        return Classification::Unparseable;
    };

    match previous.restock_date.as_deref() {
        // earlier quotes never parsed: this one becomes the baseline
        None => Classification::FirstObservation,
        Some(last) if last != date => Classification::RestockDateChanged {
            previous: Some(last.to_string()),
            current: date.to_string(),
        },
        Some(_) => steady(current.status),
    }
}

fn classify_by_status(
    previous: &AvailabilitySnapshot,
    current: &AvailabilitySnapshot,
) -> Classification {
    let was_available = previous.status == Status::Available;
    let is_available = current.status == Status::Available;

    if is_available && !was_available {
        Classification::BecameAvailable
    } else if previous.raw_quote != current.raw_quote {
        Classification::RestockDateChanged {
            previous: Some(previous.raw_quote.clone()),
            current: current.raw_quote.clone(),
        }
    } else if previous.status != current.status {
        Classification::StatusChanged {
            previous: previous.status,
            current: current.status,
        }
    } else {
        steady(current.status)
    }
}

fn steady(status: Status) -> Classification {
    if status == Status::Available {
        Classification::Unchanged
    } else {
        Classification::StillUnavailable
    }
}

/// Last observed state per store name, kept for the life of the process.
#[derive(Debug)]
pub struct LastKnownState {
    policy: DiffPolicy,
    records: HashMap<String, StoreRecord>,
}

impl LastKnownState {
    pub fn new(policy: DiffPolicy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
        }
    }

    pub fn get(&self, store_name: &str) -> Option<&StoreRecord> {
        self.records.get(store_name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Classifies the snapshot, then records it. The snapshot is always stored;
    /// the restock date baseline only moves when the quote parses.
    pub fn observe(&mut self, snapshot: AvailabilitySnapshot) -> Classification {
        let previous = self.records.get(&snapshot.store_name);
        let classification = classify(self.policy, previous, &snapshot);

        let restock_date = restock_date(&snapshot.raw_quote)
            .map(str::to_string)
            .or_else(|| previous.and_then(|record| record.restock_date.clone()));

        self.records.insert(
            snapshot.store_name.clone(),
            StoreRecord {
                snapshot,
                restock_date,
            },
        );

        classification
    }
}
