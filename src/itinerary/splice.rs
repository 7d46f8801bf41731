//! Planning of structural change sets.
//!
//! Every function here is pure: it reads the rows the service loaded and
//! returns a [`ChangeSet`] describing both the writes and the state those
//! writes were computed from. Nothing is persisted until the store commits
//! the change set, and the store refuses it if any guard no longer holds.
//!
//! [`verify`] simulates a change set over the rows it was planned from and
//! refuses writes that would corrupt a chain.

use std::collections::HashMap;

use super::error::{ItineraryError, Violation};
use super::item::{ItemId, ItineraryItem, Scope, TripId};
use super::store::{ChangeSet, Guard, RowWrite};

/// The single row of `day` whose predecessor is `after`, ignoring `exclude`.
///
/// # Errors
///
/// Returns [`Violation::Fork`] if the slot is already held by more than one row.
pub fn slot_holder(
    rows: &[ItineraryItem],
    day: u32,
    after: Option<ItemId>,
    exclude: Option<ItemId>,
) -> Result<Option<ItemId>, Violation> {
    let mut occupants = rows
        .iter()
        .filter(|row| row.scope.day == day && row.prev_item_id == after)
        .filter(|row| Some(row.id) != exclude)
        .map(|row| row.id);

    let holder = occupants.next();
    if occupants.next().is_some() {
        return Err(Violation::Fork { day, after });
    }
    Ok(holder)
}

fn require_predecessor(
    rows: &[ItineraryItem],
    day: u32,
    after: Option<ItemId>,
) -> Result<(), ItineraryError> {
    match after {
        Some(id) if !rows.iter().any(|row| row.id == id && row.scope.day == day) => {
            Err(ItineraryError::PredecessorNotFound { id, day })
        }
        _ => Ok(()),
    }
}

/// Plans the insertion of `item` into its scope at `item.prev_item_id`.
///
/// `day_rows` are the rows of the target day as read by the caller. The
/// current holder of the slot is re-pointed at the new item.
///
/// # Errors
///
/// - [`ItineraryError::PredecessorNotFound`] if the predecessor is not in the day
/// - [`ItineraryError::InvariantViolation`] if the slot is already forked or
///   the item names itself as predecessor
pub fn plan_insert(
    day_rows: &[ItineraryItem],
    item: ItineraryItem,
    timestamp: u64,
) -> Result<ChangeSet, ItineraryError> {
    let day = item.scope.day;
    let after = item.prev_item_id;

    if after == Some(item.id) {
        return Err(Violation::SelfReference(item.id).into());
    }
    require_predecessor(day_rows, day, after)?;
    let holder = slot_holder(day_rows, day, after, None)?;

    let new_id = item.id;
    let mut change = ChangeSet::new(item.scope.trip_id, timestamp);
    if let Some(id) = after {
        change = change.guard(Guard::Present { id, day });
    }
    change = change
        .guard(Guard::SlotHolder { day, after, holder })
        .write(RowWrite::Create(item));
    if let Some(successor) = holder {
        change = change.write(RowWrite::Link {
            id: successor,
            day,
            prev: Some(new_id),
        });
    }
    Ok(change)
}

/// Plans the removal of `item`, handing its predecessor to its successor.
///
/// # Errors
///
/// Returns [`ItineraryError::InvariantViolation`] if the item has more than one
/// successor.
pub fn plan_delete(
    day_rows: &[ItineraryItem],
    item: &ItineraryItem,
    timestamp: u64,
) -> Result<ChangeSet, ItineraryError> {
    let day = item.scope.day;
    let successor = slot_holder(day_rows, day, Some(item.id), None)?;

    let mut change = ChangeSet::new(item.scope.trip_id, timestamp)
        .guard(Guard::At {
            id: item.id,
            day,
            prev: item.prev_item_id,
        })
        .guard(Guard::SlotHolder {
            day,
            after: Some(item.id),
            holder: successor,
        });
    if let Some(successor) = successor {
        change = change.write(RowWrite::Link {
            id: successor,
            day,
            prev: item.prev_item_id,
        });
    }
    Ok(change.write(RowWrite::Remove { id: item.id }))
}

/// Plans moving `item` to `new_day` right after `after`.
///
/// `rows` must hold every row of the item's current day and of `new_day`.
/// Returns `None` when the item already sits at the requested position.
///
/// # Errors
///
/// - [`ItineraryError::InvariantViolation`] for a self-referencing target or a
///   forked slot
/// - [`ItineraryError::PredecessorNotFound`] if `after` is not in `new_day`
pub fn plan_move(
    rows: &[ItineraryItem],
    item: &ItineraryItem,
    new_day: u32,
    after: Option<ItemId>,
    timestamp: u64,
) -> Result<Option<ChangeSet>, ItineraryError> {
    if after == Some(item.id) {
        return Err(Violation::SelfReference(item.id).into());
    }
    let old_day = item.scope.day;
    if old_day == new_day && item.prev_item_id == after {
        return Ok(None);
    }
    require_predecessor(rows, new_day, after)?;

    let old_successor = slot_holder(rows, old_day, Some(item.id), None)?;
    let new_successor = slot_holder(rows, new_day, after, Some(item.id))?;

    let mut change = ChangeSet::new(item.scope.trip_id, timestamp)
        .guard(Guard::At {
            id: item.id,
            day: old_day,
            prev: item.prev_item_id,
        })
        .guard(Guard::SlotHolder {
            day: old_day,
            after: Some(item.id),
            holder: old_successor,
        });
    if let Some(id) = after {
        change = change.guard(Guard::Present { id, day: new_day });
    }
    change = change.guard(Guard::SlotHolder {
        day: new_day,
        after,
        holder: new_successor,
    });

    if let Some(id) = old_successor {
        change = change.write(RowWrite::Link {
            id,
            day: old_day,
            prev: item.prev_item_id,
        });
    }
    if let Some(id) = new_successor {
        change = change.write(RowWrite::Link {
            id,
            day: new_day,
            prev: Some(item.id),
        });
    }
    Ok(Some(change.write(RowWrite::Link {
        id: item.id,
        day: new_day,
        prev: after,
    })))
}

/// Plans recreating `days` in the given order. Every target day must be empty.
///
/// Each day's rows are re-linked from their position in the slice, so the
/// persisted predecessors of the input rows are ignored.
pub fn plan_restore(
    trip_id: TripId,
    days: &[(u32, Vec<ItineraryItem>)],
    timestamp: u64,
) -> ChangeSet {
    let mut change = ChangeSet::new(trip_id, timestamp);
    for (day, _) in days {
        change = change.guard(Guard::DayEmpty { day: *day });
    }
    for (day, items) in days {
        let mut prev = None;
        for item in items {
            let mut row = item.clone();
            row.scope = Scope::new(trip_id, *day);
            row.prev_item_id = prev;
            prev = Some(row.id);
            change = change.write(RowWrite::Create(row));
        }
    }
    change
}

type Slot = (u32, Option<ItemId>);

fn slot_counts(state: &HashMap<ItemId, Slot>) -> HashMap<Slot, usize> {
    let mut counts = HashMap::with_capacity(state.len());
    for slot in state.values() {
        *counts.entry(*slot).or_insert(0) += 1;
    }
    counts
}

/// Checks that applying `change` over `rows` keeps every touched row sound.
///
/// `rows` must contain every row of each day the change set touches. A touched
/// row may not be its own predecessor, may not lie on a predecessor cycle, and
/// may not share its slot with another row unless that slot was already shared
/// before the change.
///
/// # Errors
///
/// Returns the first [`Violation`] found.
pub fn verify(rows: &[ItineraryItem], change: &ChangeSet) -> Result<(), Violation> {
    let mut state: HashMap<ItemId, Slot> = rows
        .iter()
        .map(|row| (row.id, (row.scope.day, row.prev_item_id)))
        .collect();
    let before = slot_counts(&state);

    let mut touched = Vec::with_capacity(change.writes().len());
    for write in change.writes() {
        match write {
            RowWrite::Create(item) => {
                state.insert(item.id, (item.scope.day, item.prev_item_id));
                touched.push(item.id);
            }
            RowWrite::Link { id, day, prev } => {
                state.insert(*id, (*day, *prev));
                touched.push(*id);
            }
            RowWrite::Remove { id } => {
                state.remove(id);
            }
        }
    }
    let after = slot_counts(&state);

    for id in touched {
        let Some(&(day, prev)) = state.get(&id) else {
            continue;
        };
        if prev == Some(id) {
            return Err(Violation::SelfReference(id));
        }

        let shared = after.get(&(day, prev)).copied().unwrap_or(0);
        if shared > 1 && shared > before.get(&(day, prev)).copied().unwrap_or(0) {
            return Err(Violation::Fork { day, after: prev });
        }

        let mut current = prev;
        let mut steps = 0;
        while let Some(next) = current {
            if next == id {
                return Err(Violation::Cycle(id));
            }
            steps += 1;
            if steps > state.len() {
                break;
            }
            current = state.get(&next).and_then(|&(_, prev)| prev);
        }
    }
    Ok(())
}
