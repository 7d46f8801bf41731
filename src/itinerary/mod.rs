//! Day-partitioned itineraries stored as predecessor-linked rows.

/// Chain change notifications.
pub mod change_event;
pub mod error;
pub mod item;
/// Optional size limits.
pub mod limits;
/// Insert, move, delete and payload edits.
pub mod operations;
pub mod sequencer;
pub mod service;
pub mod snapshot;
/// Pure planning of guarded change sets.
pub mod splice;
pub mod store;

pub use change_event::{ChainChange, ChainChangedEvent, ChainChangedListener};
pub use error::{ItineraryError, StoreError, Violation};
pub use item::{
    ClockTime, FIRST_SENTINEL, GeoPoint, InsertionPoint, ItemId, ItemKind, ItemPayload,
    ItineraryItem, Location, Schedule, Scope, TransportDetails, TransportMode, TripId,
};
pub use limits::ItineraryLimits;
pub use sequencer::{ChainDefects, ChainReport, Linked, inspect, sequence, sequence_refs};
pub use service::{Itinerary, MoveOutcome};
pub use snapshot::{
    DaySnapshot, ITINERARY_SNAPSHOT_FORMAT_VERSION, ItinerarySnapshot, ItinerarySnapshotPackage,
};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::{ChangeSet, Guard, ItemStore, MemoryStore, RowWrite};
