//! Itinerary error types

use super::item::{ItemId, TripId};
use super::store::Guard;
use thiserror::Error;

/// A structural change that would corrupt a day's chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Violation {
    /// An item would become its own predecessor.
    #[error("item {0} would become its own predecessor")]
    SelfReference(ItemId),

    /// Two items of one day would share the same predecessor slot.
    #[error("day {day} would fork after {}", display_slot(.after))]
    Fork {
        /// Day number of the forked list
        day: u32,
        /// The shared predecessor; `None` means two heads
        after: Option<ItemId>,
    },

    /// Following predecessors from the item would loop forever.
    #[error("predecessor chain through {0} would form a cycle")]
    Cycle(ItemId),
}

fn display_slot(after: &Option<ItemId>) -> String {
    match after {
        Some(id) => id.to_string(),
        None => "the head".to_string(),
    }
}

/// Errors raised by an [`ItemStore`](super::store::ItemStore) implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A change-set precondition no longer holds.
    #[error("guard failed: {guard}")]
    GuardFailed {
        /// The precondition that failed
        guard: Guard,
    },

    /// A row with this id already exists.
    #[error("duplicate item id {0}")]
    DuplicateId(ItemId),

    /// A row the change set writes to does not exist.
    #[error("missing row {0}")]
    MissingRow(ItemId),

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// Persisted data could not be decoded.
    #[error("corrupt row: {message}")]
    Corrupt {
        /// What could not be decoded
        message: String,
    },

    /// Underlying SQLite failure.
    #[cfg(feature = "sqlite")]
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Errors that can occur while reading or restructuring an itinerary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ItineraryError {
    /// The item being moved, updated or deleted does not exist.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// The requested predecessor does not exist in the target day.
    #[error("predecessor {id} not found on day {day}")]
    PredecessorNotFound {
        /// The predecessor id that was requested
        id: ItemId,
        /// The day it was looked up in
        day: u32,
    },

    /// A concurrent structural write got there first. Re-read and retry.
    #[error("conflicting write on trip {trip_id}: {reason}")]
    Conflict {
        /// Trip whose chain was contended
        trip_id: TripId,
        /// What changed underneath the operation
        reason: String,
    },

    /// The operation would corrupt the chain and was refused.
    #[error("invariant violation: {0}")]
    InvariantViolation(Violation),

    /// Payload fields failed validation.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Description of the problem
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of the problem
        message: String,
    },

    /// A configured limit would be exceeded.
    #[error("limit exceeded: {limit} (max {max}, requested {requested})")]
    LimitExceeded {
        /// Name of the limit
        limit: &'static str,
        /// Configured maximum
        max: usize,
        /// Value that was requested
        requested: usize,
    },

    /// Error while serializing snapshot data
    #[error("serialization error: {message}")]
    SerializationError {
        /// Underlying error message
        message: String,
    },

    /// Error while deserializing snapshot data
    #[error("deserialization error: {message}")]
    DeserializationError {
        /// Underlying error message
        message: String,
    },

    /// Snapshot integrity check failed
    #[error("checksum mismatch: expected {expected}, but computed {actual}")]
    ChecksumMismatch {
        /// Expected checksum value
        expected: String,
        /// Actual checksum value
        actual: String,
    },

    /// Failure inside the persistence collaborator.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl ItineraryError {
    /// Returns `true` when a fresh read followed by a retry may succeed.
    #[must_use]
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ItineraryError::Conflict { .. })
    }

    /// Returns `true` for the not-found family.
    #[must_use]
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ItineraryError::ItemNotFound(_) | ItineraryError::PredecessorNotFound { .. }
        )
    }

    pub(crate) fn from_store(trip_id: TripId, err: StoreError) -> Self {
        match err {
            StoreError::GuardFailed { guard } => ItineraryError::Conflict {
                trip_id,
                reason: guard.to_string(),
            },
            StoreError::MissingRow(id) => ItineraryError::Conflict {
                trip_id,
                reason: format!("row {id} disappeared"),
            },
            other => ItineraryError::Store(other),
        }
    }
}

impl From<StoreError> for ItineraryError {
    #[cold]
    fn from(err: StoreError) -> Self {
        ItineraryError::Store(err)
    }
}

impl From<Violation> for ItineraryError {
    fn from(violation: Violation) -> Self {
        ItineraryError::InvariantViolation(violation)
    }
}
