//! The itinerary service: owns a store and exposes ordered reads over it.
//!
//! Structural writes live in [`operations`](super::operations), snapshot
//! export and restore in [`snapshot`](super::snapshot).

use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace, warn};

use super::change_event::{ChainChange, ChainChangedEvent, ChainChangedListener};
use super::error::ItineraryError;
use super::item::{ItemId, ItineraryItem, Scope, TripId};
use super::limits::ItineraryLimits;
use super::sequencer::{ChainReport, inspect, sequence};
use super::store::{ChangeSet, ItemStore};

/// Result of a move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The item was re-linked.
    Moved,
    /// The item already sat at the requested position; nothing was written.
    Unchanged,
}

/// Ordered, day-partitioned itineraries on top of an [`ItemStore`].
///
/// Every day of a trip is a singly-linked list: each row names its
/// predecessor and the head names none. Reads rebuild the order with the
/// sequencer and never fail on a malformed chain. Writes are planned against
/// a fresh read, checked for chain corruption and committed as a single
/// guarded change set, so a concurrent writer that touched the same slots
/// makes the commit fail with [`ItineraryError::Conflict`] instead of forking
/// the list.
///
/// # Examples
///
/// ```
/// use itinerary_rs::prelude::*;
///
/// let itinerary = Itinerary::new(MemoryStore::new());
/// let day1 = Scope::new(TripId::new(), 1);
///
/// let a = itinerary.insert_after(day1, InsertionPoint::First, ItemPayload::titled("A")).unwrap();
/// let c = itinerary.insert_after(day1, InsertionPoint::After(a), ItemPayload::titled("C")).unwrap();
/// let b = itinerary.insert_after(day1, InsertionPoint::After(a), ItemPayload::titled("B")).unwrap();
///
/// let titles: Vec<_> = itinerary
///     .day(day1)
///     .unwrap()
///     .into_iter()
///     .map(|item| item.payload.title)
///     .collect();
/// assert_eq!(titles, ["A", "B", "C"]);
/// # let _ = (b, c);
/// ```
pub struct Itinerary<S: ItemStore> {
    /// Persistence collaborator
    pub(super) store: S,

    /// Optional size limits
    pub(super) limits: ItineraryLimits,

    /// Called after every successful commit
    pub(super) listener: Option<ChainChangedListener>,
}

impl<S: ItemStore> fmt::Debug for Itinerary<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Itinerary")
            .field("store", &self.store)
            .field("limits", &self.limits)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl<S: ItemStore> Itinerary<S> {
    /// Creates a service with no limits and no listener.
    pub fn new(store: S) -> Self {
        Self::with_limits(store, ItineraryLimits::default())
    }

    /// Creates a service enforcing `limits`.
    pub fn with_limits(store: S, limits: ItineraryLimits) -> Self {
        Self {
            store,
            limits,
            listener: None,
        }
    }

    /// Registers a listener called after every successful commit.
    pub fn set_change_listener(&mut self, listener: ChainChangedListener) {
        self.listener = Some(listener);
    }

    /// Removes the change listener, if any.
    pub fn clear_change_listener(&mut self) {
        self.listener = None;
    }

    /// Replaces the limits.
    pub fn set_limits(&mut self, limits: ItineraryLimits) {
        self.limits = limits;
    }

    /// Current limits.
    #[must_use]
    pub fn limits(&self) -> &ItineraryLimits {
        &self.limits
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Looks up a single item.
    pub fn item(&self, id: ItemId) -> Result<ItineraryItem, ItineraryError> {
        trace!("Itinerary: fetching item {}", id);
        self.store
            .get(&id)?
            .ok_or(ItineraryError::ItemNotFound(id))
    }

    /// The items of one day, in chain order.
    pub fn day(&self, scope: Scope) -> Result<Vec<ItineraryItem>, ItineraryError> {
        trace!("Itinerary {}: reading day", scope);
        let rows = self.store.load_scope(&scope)?;
        Ok(self.sequenced(&scope, rows))
    }

    /// Every non-empty day of a trip, each in chain order.
    pub fn days(&self, trip_id: TripId) -> Result<BTreeMap<u32, Vec<ItineraryItem>>, ItineraryError> {
        trace!("Itinerary {}: reading all days", trip_id);
        let mut grouped: BTreeMap<u32, Vec<ItineraryItem>> = BTreeMap::new();
        for row in self.store.load_trip(&trip_id)? {
            grouped.entry(row.scope.day).or_default().push(row);
        }
        Ok(grouped
            .into_iter()
            .map(|(day, rows)| (day, self.sequenced(&Scope::new(trip_id, day), rows)))
            .collect())
    }

    /// Describes the shape of one day's chain without reordering it.
    pub fn inspect_day(&self, scope: Scope) -> Result<ChainReport, ItineraryError> {
        let rows = self.store.load_scope(&scope)?;
        Ok(inspect(&rows))
    }

    fn sequenced(&self, scope: &Scope, rows: Vec<ItineraryItem>) -> Vec<ItineraryItem> {
        let report = inspect(&rows);
        if !report.is_clean() {
            warn!(
                "Itinerary {}: malformed chain ({:?}, {} of {} items threaded)",
                scope, report.defects, report.threaded, report.len
            );
        }
        sequence(rows)
    }

    /// Commits a planned change set, turning guard failures into conflicts.
    pub(super) fn commit(&self, change: &ChangeSet) -> Result<(), ItineraryError> {
        match self.store.commit(change) {
            Ok(()) => {
                debug!(
                    "Itinerary {}: committed {} writes",
                    change.trip_id(),
                    change.writes().len()
                );
                Ok(())
            }
            Err(err) => {
                let err = ItineraryError::from_store(change.trip_id(), err);
                if err.is_retryable() {
                    warn!("Itinerary {}: {}", change.trip_id(), err);
                }
                Err(err)
            }
        }
    }

    pub(super) fn notify(&self, trip_id: TripId, timestamp: u64, change: ChainChange) {
        if let Some(listener) = &self.listener {
            listener(ChainChangedEvent {
                trip_id,
                timestamp,
                change,
            });
        }
    }
}
