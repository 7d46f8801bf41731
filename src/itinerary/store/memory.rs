//! In-process [`ItemStore`] backed by concurrent maps.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

use super::{ChangeSet, ItemStore, RowWrite};
use crate::itinerary::error::StoreError;
use crate::itinerary::item::{ItemId, ItemPayload, ItineraryItem, Scope, TripId};

type TripRows = HashMap<ItemId, ItineraryItem>;

/// Concurrent in-memory item store.
///
/// Rows are partitioned by trip; each trip's rows sit behind their own lock,
/// so change sets on different trips never contend while change sets on the
/// same trip are applied one at a time. A move only ever touches two days of
/// one trip, which keeps every change set inside a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Rows of each trip, indexed by item id
    trips: DashMap<TripId, Arc<Mutex<TripRows>>>,

    /// A concurrent map from item ID to its owning trip for fast lookups
    locations: DashMap<ItemId, TripId>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across all trips.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns `true` if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Inserts rows verbatim, bypassing every chain check.
    ///
    /// Meant for loading legacy data or reproducing a corrupt chain; regular
    /// callers go through the service.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] if a row id is already present.
    pub fn seed<I>(&self, items: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = ItineraryItem>,
    {
        for item in items {
            let partition = self.partition(&item.scope.trip_id);
            let mut rows = lock(&partition)?;
            match self.locations.entry(item.id) {
                Entry::Occupied(_) => return Err(StoreError::DuplicateId(item.id)),
                Entry::Vacant(slot) => {
                    slot.insert(item.scope.trip_id);
                }
            }
            rows.insert(item.id, item);
        }
        Ok(())
    }

    fn partition(&self, trip_id: &TripId) -> Arc<Mutex<TripRows>> {
        self.trips.entry(*trip_id).or_default().value().clone()
    }

    fn existing_partition(&self, trip_id: &TripId) -> Option<Arc<Mutex<TripRows>>> {
        self.trips.get(trip_id).map(|entry| entry.value().clone())
    }
}

fn lock(partition: &Mutex<TripRows>) -> Result<MutexGuard<'_, TripRows>, StoreError> {
    partition.lock().map_err(|_| StoreError::Poisoned)
}

/// Checks that every write can be applied, tracking only the ids the change
/// set creates or removes on top of `rows`.
fn check_writes(rows: &TripRows, change: &ChangeSet) -> Result<(), StoreError> {
    let mut overlay: HashMap<ItemId, bool> = HashMap::new();
    let exists = |overlay: &HashMap<ItemId, bool>, id: &ItemId| {
        overlay.get(id).copied().unwrap_or_else(|| rows.contains_key(id))
    };

    for write in change.writes() {
        match write {
            RowWrite::Create(item) => {
                if exists(&overlay, &item.id) {
                    return Err(StoreError::DuplicateId(item.id));
                }
                overlay.insert(item.id, true);
            }
            RowWrite::Link { id, .. } => {
                if !exists(&overlay, id) {
                    return Err(StoreError::MissingRow(*id));
                }
            }
            RowWrite::Remove { id } => {
                if !exists(&overlay, id) {
                    return Err(StoreError::MissingRow(*id));
                }
                overlay.insert(*id, false);
            }
        }
    }
    Ok(())
}

/// Applies writes that [`check_writes`] accepted. Returns the created and
/// removed ids.
fn apply(rows: &mut TripRows, change: &ChangeSet) -> Vec<(ItemId, bool)> {
    let mut touched = Vec::with_capacity(change.writes().len());
    for write in change.writes() {
        match write {
            RowWrite::Create(item) => {
                rows.insert(item.id, item.clone());
                touched.push((item.id, true));
            }
            RowWrite::Link { id, day, prev } => {
                if let Some(row) = rows.get_mut(id) {
                    row.scope.day = *day;
                    row.prev_item_id = *prev;
                    row.updated_at = change.timestamp();
                }
            }
            RowWrite::Remove { id } => {
                rows.remove(id);
                touched.push((*id, false));
            }
        }
    }
    touched
}

impl ItemStore for MemoryStore {
    fn load_scope(&self, scope: &Scope) -> Result<Vec<ItineraryItem>, StoreError> {
        let Some(partition) = self.existing_partition(&scope.trip_id) else {
            return Ok(Vec::new());
        };
        let rows = lock(&partition)?;
        Ok(rows
            .values()
            .filter(|row| row.scope.day == scope.day)
            .cloned()
            .collect())
    }

    fn load_trip(&self, trip_id: &TripId) -> Result<Vec<ItineraryItem>, StoreError> {
        let Some(partition) = self.existing_partition(trip_id) else {
            return Ok(Vec::new());
        };
        let rows = lock(&partition)?;
        Ok(rows.values().cloned().collect())
    }

    fn get(&self, id: &ItemId) -> Result<Option<ItineraryItem>, StoreError> {
        let Some(trip_id) = self.locations.get(id).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        let Some(partition) = self.existing_partition(&trip_id) else {
            return Ok(None);
        };
        let rows = lock(&partition)?;
        Ok(rows.get(id).cloned())
    }

    fn commit(&self, change: &ChangeSet) -> Result<(), StoreError> {
        let partition = self.partition(&change.trip_id());
        let mut rows = lock(&partition)?;

        if let Some(failed) = change
            .guards()
            .iter()
            .find(|guard| !guard.holds(rows.values()))
        {
            trace!("memory store: guard failed on trip {}: {}", change.trip_id(), failed);
            return Err(StoreError::GuardFailed {
                guard: failed.clone(),
            });
        }

        for write in change.writes() {
            if let RowWrite::Create(item) = write {
                if self.locations.contains_key(&item.id) {
                    return Err(StoreError::DuplicateId(item.id));
                }
            }
        }

        check_writes(&rows, change)?;
        let touched = apply(&mut rows, change);
        for (id, present) in touched {
            if present {
                self.locations.insert(id, change.trip_id());
            } else {
                self.locations.remove(&id);
            }
        }
        trace!(
            "memory store: committed {} writes on trip {}",
            change.writes().len(),
            change.trip_id()
        );
        Ok(())
    }

    fn update_payload(
        &self,
        id: &ItemId,
        payload: &ItemPayload,
        updated_at: u64,
    ) -> Result<Option<ItineraryItem>, StoreError> {
        let Some(trip_id) = self.locations.get(id).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        let Some(partition) = self.existing_partition(&trip_id) else {
            return Ok(None);
        };
        let mut rows = lock(&partition)?;
        Ok(rows.get_mut(id).map(|row| {
            row.payload = payload.clone();
            row.updated_at = updated_at;
            row.clone()
        }))
    }
}
