//! Structural operations: insert, move, delete and payload edits.

use tracing::trace;

use super::change_event::ChainChange;
use super::error::ItineraryError;
use super::item::{InsertionPoint, ItemId, ItemPayload, ItineraryItem, Scope};
use super::service::{Itinerary, MoveOutcome};
use super::splice::{plan_delete, plan_insert, plan_move, verify};
use super::store::ItemStore;
use crate::utils::current_time_millis;

impl<S: ItemStore> Itinerary<S> {
    /// Inserts a new item with a generated id at `point` within `scope`.
    ///
    /// Returns the new item's id.
    ///
    /// # Errors
    ///
    /// - [`ItineraryError::PredecessorNotFound`] if `point` names an item that is
    ///   not on that day
    /// - [`ItineraryError::Conflict`] if another writer changed the same slot
    /// - [`ItineraryError::InvalidPayload`] / [`ItineraryError::LimitExceeded`]
    pub fn insert_after(
        &self,
        scope: Scope,
        point: InsertionPoint,
        payload: ItemPayload,
    ) -> Result<ItemId, ItineraryError> {
        self.insert_with_id(ItemId::new(), scope, point, payload)
            .map(|item| item.id)
    }

    /// Inserts a new item with a caller-chosen id.
    ///
    /// The item takes `point` as its predecessor; whatever followed `point`
    /// before now follows the new item. Inserting at
    /// [`InsertionPoint::First`] makes the item the new head.
    ///
    /// # Errors
    ///
    /// Same as [`Self::insert_after`], plus [`ItineraryError::Store`] wrapping
    /// a duplicate id.
    pub fn insert_with_id(
        &self,
        id: ItemId,
        scope: Scope,
        point: InsertionPoint,
        payload: ItemPayload,
    ) -> Result<ItineraryItem, ItineraryError> {
        self.limits.check_day(scope.day)?;
        self.limits.check_payload(&payload)?;
        trace!("Itinerary {}: inserting {} after {}", scope, id, point);

        let rows = self.store.load_scope(&scope)?;
        self.limits.check_day_capacity(rows.len(), 1)?;

        let timestamp = current_time_millis();
        let item = ItineraryItem::new(id, scope, point.prev_item_id(), payload, timestamp);
        let mut change = plan_insert(&rows, item.clone(), timestamp)?;
        verify(&rows, &change)?;
        if let Some(guard) = self.limits.capacity_guard(scope.day, 1) {
            change = change.guard(guard);
        }
        self.commit(&change)?;

        self.notify(
            scope.trip_id,
            timestamp,
            ChainChange::Inserted {
                item_id: id,
                scope,
                prev: item.prev_item_id,
            },
        );
        Ok(item)
    }

    /// Moves an item to `point` on `new_day` of the same trip.
    ///
    /// # Errors
    ///
    /// - [`ItineraryError::ItemNotFound`] if the item does not exist
    /// - [`ItineraryError::PredecessorNotFound`] if `point` is not on `new_day`
    /// - [`ItineraryError::InvariantViolation`] when moving an item after itself
    /// - [`ItineraryError::Conflict`] if another writer touched either slot
    pub fn move_item(
        &self,
        id: ItemId,
        new_day: u32,
        point: InsertionPoint,
    ) -> Result<MoveOutcome, ItineraryError> {
        let item = self.item(id)?;
        self.relocate(item, new_day, point)
    }

    /// Moves an item to `point` within `target`, which must belong to the
    /// item's own trip.
    ///
    /// # Errors
    ///
    /// [`ItineraryError::InvalidOperation`] if `target` is in another trip,
    /// otherwise as [`Self::move_item`].
    pub fn move_item_to(
        &self,
        id: ItemId,
        target: Scope,
        point: InsertionPoint,
    ) -> Result<MoveOutcome, ItineraryError> {
        let item = self.item(id)?;
        if item.scope.trip_id != target.trip_id {
            return Err(ItineraryError::InvalidOperation {
                message: format!(
                    "item {} belongs to trip {}, cannot move it to {}",
                    id, item.scope.trip_id, target
                ),
            });
        }
        self.relocate(item, target.day, point)
    }

    fn relocate(
        &self,
        item: ItineraryItem,
        new_day: u32,
        point: InsertionPoint,
    ) -> Result<MoveOutcome, ItineraryError> {
        self.limits.check_day(new_day)?;
        let from = item.scope;
        let to = from.with_day(new_day);
        trace!("Itinerary: moving {} from {} to {} after {}", item.id, from, to, point);

        let rows = self
            .store
            .load_days(&from.trip_id, &[from.day, new_day])?;
        ensure_unmoved(&item, &rows)?;
        if new_day != from.day {
            let occupied = rows.iter().filter(|row| row.scope.day == new_day).count();
            self.limits.check_day_capacity(occupied, 1)?;
        }

        let timestamp = current_time_millis();
        let after = point.prev_item_id();
        let Some(mut change) = plan_move(&rows, &item, new_day, after, timestamp)? else {
            trace!("Itinerary: {} already at {} after {}", item.id, to, point);
            return Ok(MoveOutcome::Unchanged);
        };
        verify(&rows, &change)?;
        if new_day != from.day
            && let Some(guard) = self.limits.capacity_guard(new_day, 1)
        {
            change = change.guard(guard);
        }
        self.commit(&change)?;

        self.notify(
            from.trip_id,
            timestamp,
            ChainChange::Moved {
                item_id: item.id,
                from,
                to,
                prev: after,
            },
        );
        Ok(MoveOutcome::Moved)
    }

    /// Deletes an item, linking its successor to its predecessor.
    ///
    /// Deleting the head promotes its successor to head. Returns the removed
    /// row as it was read before the delete.
    ///
    /// # Errors
    ///
    /// - [`ItineraryError::ItemNotFound`] if the item does not exist
    /// - [`ItineraryError::Conflict`] if the item or its successor moved meanwhile
    pub fn delete_item(&self, id: ItemId) -> Result<ItineraryItem, ItineraryError> {
        let item = self.item(id)?;
        trace!("Itinerary {}: deleting {}", item.scope, id);

        let rows = self.store.load_scope(&item.scope)?;
        ensure_unmoved(&item, &rows)?;
        let timestamp = current_time_millis();
        let change = plan_delete(&rows, &item, timestamp)?;
        verify(&rows, &change)?;
        self.commit(&change)?;

        self.notify(
            item.scope.trip_id,
            timestamp,
            ChainChange::Deleted {
                item_id: id,
                scope: item.scope,
            },
        );
        Ok(item)
    }

    /// Replaces an item's descriptive fields. Its day and predecessor are
    /// never touched.
    ///
    /// # Errors
    ///
    /// [`ItineraryError::ItemNotFound`] if the item does not exist, or a
    /// validation error for the payload.
    pub fn update_payload(
        &self,
        id: ItemId,
        payload: ItemPayload,
    ) -> Result<ItineraryItem, ItineraryError> {
        self.limits.check_payload(&payload)?;
        trace!("Itinerary: updating payload of {}", id);

        let timestamp = current_time_millis();
        let updated = self
            .store
            .update_payload(&id, &payload, timestamp)?
            .ok_or(ItineraryError::ItemNotFound(id))?;

        self.notify(
            updated.scope.trip_id,
            timestamp,
            ChainChange::PayloadUpdated {
                item_id: id,
                scope: updated.scope,
            },
        );
        Ok(updated)
    }
}

/// Fails with a conflict when `rows` no longer show `item` where it was read.
fn ensure_unmoved(item: &ItineraryItem, rows: &[ItineraryItem]) -> Result<(), ItineraryError> {
    match rows.iter().find(|row| row.id == item.id) {
        Some(row) if row.scope == item.scope && row.prev_item_id == item.prev_item_id => Ok(()),
        _ => Err(ItineraryError::Conflict {
            trip_id: item.scope.trip_id,
            reason: format!("item {} moved while planning", item.id),
        }),
    }
}
