//! Prelude module that re-exports commonly used types and traits.
//!
//! ```rust
//! use itinerary_rs::prelude::*;
//! ```

// Service and storage
pub use crate::itinerary::service::{Itinerary, MoveOutcome};
#[cfg(feature = "sqlite")]
pub use crate::itinerary::store::SqliteStore;
pub use crate::itinerary::store::{ChangeSet, Guard, ItemStore, MemoryStore, RowWrite};

// Model types
pub use crate::itinerary::item::{
    ClockTime, FIRST_SENTINEL, GeoPoint, InsertionPoint, ItemId, ItemKind, ItemPayload,
    ItineraryItem, Location, Schedule, Scope, TransportDetails, TransportMode, TripId,
};

// Ordering
pub use crate::itinerary::sequencer::{
    ChainDefects, ChainReport, Linked, inspect, sequence, sequence_refs,
};

// Errors
pub use crate::itinerary::error::{ItineraryError, StoreError, Violation};

// Configuration and events
pub use crate::itinerary::change_event::{ChainChange, ChainChangedEvent, ChainChangedListener};
pub use crate::itinerary::limits::ItineraryLimits;

// Snapshots
pub use crate::itinerary::snapshot::{
    DaySnapshot, ITINERARY_SNAPSHOT_FORMAT_VERSION, ItinerarySnapshot, ItinerarySnapshotPackage,
};

// Utility functions
pub use crate::utils::current_time_millis;
