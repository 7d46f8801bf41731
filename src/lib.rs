//! # Ordered Itineraries over a Keyed Store
//!
//! A library for keeping per-day trip itineraries as singly-linked lists in an
//! ordinary keyed store. Each item row stores the id of the item it follows
//! (`prev_item_id`) instead of an integer rank, so inserting, moving or
//! deleting an item rewrites at most three rows no matter how long the day is.
//!
//! ## Key Features
//!
//! - **Total Sequencer**: Rebuilds a day's order from an unordered set of rows.
//!   Missing heads, duplicate heads, forks, cycles and dangling predecessors are
//!   tolerated: every row is returned exactly once, unreachable rows at the end.
//!
//! - **Atomic Splices**: Insert-after, move (within or across days) and delete
//!   are planned as a single change set of guarded writes. The store checks the
//!   guards and applies the writes as one unit.
//!
//! - **Safe Under Concurrency**: Two writers racing for the same slot cannot both
//!   win. The loser gets [`ItineraryError::Conflict`] and may re-read and retry;
//!   the chain never forks.
//!
//! - **Invariant Refusal**: Self-references, forks and cycles are detected before
//!   commit and refused with [`ItineraryError::InvariantViolation`].
//!
//! - **Pluggable Storage**: [`MemoryStore`] for in-process use and tests, and a
//!   SQLite-backed `SqliteStore` behind the `sqlite` feature.
//!
//! - **Snapshots**: Checksum-protected JSON export of a whole trip that can be
//!   restored into empty days.
//!
//! ## Quick Start
//!
//! ```rust
//! use itinerary_rs::prelude::*;
//!
//! let itinerary = Itinerary::new(MemoryStore::new());
//! let trip = TripId::new();
//! let day1 = Scope::new(trip, 1);
//!
//! let hotel = itinerary
//!     .insert_after(day1, InsertionPoint::First, ItemPayload::titled("Check out"))
//!     .unwrap();
//! let temple = itinerary
//!     .insert_after(day1, InsertionPoint::After(hotel), ItemPayload::titled("Kiyomizu-dera"))
//!     .unwrap();
//!
//! // Move the temple visit to the head of day 2
//! itinerary.move_item(temple, 2, InsertionPoint::First).unwrap();
//!
//! assert_eq!(itinerary.day(day1).unwrap().len(), 1);
//! assert_eq!(itinerary.day(Scope::new(trip, 2)).unwrap()[0].id, temple);
//! ```
//!
//! ## Concurrency Model
//!
//! Every operation is short-lived and independent. Operations on different
//! trips never contend. Structural operations on the same trip are serialized
//! by the store: [`MemoryStore`] holds a per-trip lock while checking guards
//! and applying writes, `SqliteStore` uses an immediate transaction. Nothing is
//! retried inside the library.
//!
//! ## Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events and installs no
//! subscriber. Malformed chains seen by read paths and write conflicts are
//! logged at `warn`.

pub mod itinerary;

pub mod prelude;
mod utils;

pub use itinerary::{
    ChainChange, ChainChangedEvent, ChainChangedListener, ChainDefects, ChainReport, ChangeSet,
    DaySnapshot, Guard, ITINERARY_SNAPSHOT_FORMAT_VERSION, InsertionPoint, ItemId, ItemPayload,
    ItemStore, Itinerary, ItineraryError, ItineraryItem, ItineraryLimits, ItinerarySnapshot,
    ItinerarySnapshotPackage, MemoryStore, MoveOutcome, Scope, StoreError, TripId, Violation,
    sequence,
};
#[cfg(feature = "sqlite")]
pub use itinerary::SqliteStore;
pub use utils::current_time_millis;

/// Itinerary service backed by the in-memory store.
pub type MemoryItinerary = Itinerary<MemoryStore>;
