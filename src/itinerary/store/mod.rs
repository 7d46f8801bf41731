//! Persistence collaborator for itinerary rows.
//!
//! The service never writes rows one by one. Every structural operation is
//! turned into a [`ChangeSet`]: a list of [`Guard`]s describing the state the
//! plan was computed from, and the [`RowWrite`]s to apply. A store must check
//! all guards and apply all writes as one indivisible unit, so two writers
//! that planned against the same slot cannot both commit.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`]: concurrent in-process store keyed by trip
//! - `SqliteStore`: SQLite-backed store (requires the `sqlite` feature)

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::StoreError;
use super::item::{ItemId, ItemPayload, ItineraryItem, Scope, TripId};

/// A precondition checked by the store right before a change set is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guard {
    /// The row exists on `day` with exactly this predecessor.
    At {
        /// Row id
        id: ItemId,
        /// Expected day
        day: u32,
        /// Expected predecessor
        prev: Option<ItemId>,
    },

    /// The row exists on `day`, wherever it sits.
    Present {
        /// Row id
        id: ItemId,
        /// Expected day
        day: u32,
    },

    /// The rows of `day` whose predecessor is `after` are exactly `holder`.
    ///
    /// `holder == None` asserts that the slot is free. With `after == None`
    /// the slot is the head of the day.
    SlotHolder {
        /// Day of the slot
        day: u32,
        /// Predecessor defining the slot
        after: Option<ItemId>,
        /// Expected occupant, if any
        holder: Option<ItemId>,
    },

    /// The day holds no rows at all.
    DayEmpty {
        /// Day that must be empty
        day: u32,
    },

    /// The day holds at most `max` rows before the writes are applied.
    DayCountAtMost {
        /// Day being counted
        day: u32,
        /// Largest acceptable row count
        max: usize,
    },
}

impl Guard {
    /// Evaluates the guard against a snapshot of one trip's rows.
    pub fn holds<'a, I>(&self, rows: I) -> bool
    where
        I: IntoIterator<Item = &'a ItineraryItem>,
    {
        let mut rows = rows.into_iter();
        match self {
            Guard::At { id, day, prev } => rows
                .find(|row| row.id == *id)
                .is_some_and(|row| row.scope.day == *day && row.prev_item_id == *prev),
            Guard::Present { id, day } => rows
                .find(|row| row.id == *id)
                .is_some_and(|row| row.scope.day == *day),
            Guard::SlotHolder { day, after, holder } => {
                let mut occupants =
                    rows.filter(|row| row.scope.day == *day && row.prev_item_id == *after);
                let first = occupants.next().map(|row| row.id);
                first == *holder && occupants.next().is_none()
            }
            Guard::DayEmpty { day } => !rows.any(|row| row.scope.day == *day),
            Guard::DayCountAtMost { day, max } => {
                rows.filter(|row| row.scope.day == *day).count() <= *max
            }
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot(id: &Option<ItemId>) -> String {
            id.map_or_else(|| "none".to_string(), |id| id.to_string())
        }

        match self {
            Guard::At { id, day, prev } => {
                write!(f, "item {id} expected on day {day} after {}", slot(prev))
            }
            Guard::Present { id, day } => write!(f, "item {id} expected on day {day}"),
            Guard::SlotHolder { day, after, holder } => write!(
                f,
                "slot after {} on day {day} expected to hold {}",
                slot(after),
                slot(holder)
            ),
            Guard::DayEmpty { day } => write!(f, "day {day} expected to be empty"),
            Guard::DayCountAtMost { day, max } => {
                write!(f, "day {day} expected to hold at most {max} items")
            }
        }
    }
}

/// A single row mutation inside a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowWrite {
    /// Insert a new row.
    Create(ItineraryItem),

    /// Set a row's day and predecessor.
    Link {
        /// Row id
        id: ItemId,
        /// New day
        day: u32,
        /// New predecessor
        prev: Option<ItemId>,
    },

    /// Delete a row.
    Remove {
        /// Row id
        id: ItemId,
    },
}

impl RowWrite {
    /// Id of the row this write touches.
    #[must_use]
    pub fn id(&self) -> ItemId {
        match self {
            RowWrite::Create(item) => item.id,
            RowWrite::Link { id, .. } | RowWrite::Remove { id } => *id,
        }
    }
}

/// An all-or-nothing set of guarded writes against one trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct ChangeSet {
    trip_id: TripId,
    timestamp: u64,
    guards: Vec<Guard>,
    writes: Vec<RowWrite>,
}

impl ChangeSet {
    /// Starts an empty change set for `trip_id`.
    pub fn new(trip_id: TripId, timestamp: u64) -> Self {
        Self {
            trip_id,
            timestamp,
            guards: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Adds a precondition.
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Adds a write.
    pub fn write(mut self, write: RowWrite) -> Self {
        self.writes.push(write);
        self
    }

    /// Trip every row in this change set belongs to.
    #[must_use]
    #[inline]
    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    /// Time stamped on every row the change set touches.
    #[must_use]
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Preconditions, in insertion order.
    #[must_use]
    #[inline]
    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    /// Writes, in insertion order.
    #[must_use]
    #[inline]
    pub fn writes(&self) -> &[RowWrite] {
        &self.writes
    }

    /// Returns `true` when there is nothing to write.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Storage for itinerary rows.
///
/// Reads return rows in no particular order; callers reconstruct order with
/// the sequencer. `commit` is the only way to change `prev_item_id` or the
/// day of a row, and `update_payload` must never change either.
///
/// # Thread Safety
///
/// Implementations are shared between concurrent callers, hence `Send + Sync`.
/// `commit` must behave as if change sets on the same trip were applied one
/// at a time.
pub trait ItemStore: Send + Sync {
    /// All rows of one (trip, day) scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the rows cannot be read.
    fn load_scope(&self, scope: &Scope) -> Result<Vec<ItineraryItem>, StoreError>;

    /// All rows of one trip, across days.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the rows cannot be read.
    fn load_trip(&self, trip_id: &TripId) -> Result<Vec<ItineraryItem>, StoreError>;

    /// All rows of the given days of one trip, read as one consistent view.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the rows cannot be read.
    fn load_days(&self, trip_id: &TripId, days: &[u32]) -> Result<Vec<ItineraryItem>, StoreError> {
        Ok(self
            .load_trip(trip_id)?
            .into_iter()
            .filter(|row| days.contains(&row.scope.day))
            .collect())
    }

    /// A single row by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the row cannot be read.
    fn get(&self, id: &ItemId) -> Result<Option<ItineraryItem>, StoreError>;

    /// Checks every guard, then applies every write, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GuardFailed`] if a guard does not hold, in which
    /// case nothing was written.
    fn commit(&self, change: &ChangeSet) -> Result<(), StoreError>;

    /// Replaces a row's payload, leaving its position untouched.
    ///
    /// Returns the updated row, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn update_payload(
        &self,
        id: &ItemId,
        payload: &ItemPayload,
        updated_at: u64,
    ) -> Result<Option<ItineraryItem>, StoreError>;
}
