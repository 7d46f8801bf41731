//! Itinerary snapshots for export, sharing and restore

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{info, trace};

use super::change_event::ChainChange;
use super::error::ItineraryError;
use super::item::{ItineraryItem, Scope, TripId};
use super::service::Itinerary;
use super::splice::plan_restore;
use super::store::ItemStore;
use crate::utils::current_time_millis;

/// One day of a snapshot, items in chain order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySnapshot {
    /// Day number
    pub day: u32,

    /// Items in the order the sequencer produced
    pub items: Vec<ItineraryItem>,
}

/// A snapshot of a trip's days at a specific point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItinerarySnapshot {
    /// Trip the snapshot was taken from
    pub trip_id: TripId,

    /// Timestamp when the snapshot was created (milliseconds since epoch)
    pub timestamp: u64,

    /// Non-empty days, ascending
    pub days: Vec<DaySnapshot>,
}

impl ItinerarySnapshot {
    /// Total number of items across all days
    pub fn item_count(&self) -> usize {
        self.days.iter().map(|day| day.items.len()).sum()
    }

    /// The snapshot of one day, if present
    pub fn day(&self, day: u32) -> Option<&DaySnapshot> {
        self.days.iter().find(|snapshot| snapshot.day == day)
    }
}

/// Format version used for checksum-enabled itinerary snapshots.
pub const ITINERARY_SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A snapshot sealed with a SHA-256 digest, as exchanged in JSON form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItinerarySnapshotPackage {
    /// Snapshot format version; part of the digest.
    pub version: u32,
    /// The sealed snapshot.
    pub snapshot: ItinerarySnapshot,
    /// Lowercase hex SHA-256 digest of `version` and `snapshot`.
    pub checksum: String,
}

impl ItinerarySnapshotPackage {
    /// Seals `snapshot` under the current format version.
    pub fn new(snapshot: ItinerarySnapshot) -> Result<Self, ItineraryError> {
        let checksum = digest(ITINERARY_SNAPSHOT_FORMAT_VERSION, &snapshot)?;
        Ok(Self {
            version: ITINERARY_SNAPSHOT_FORMAT_VERSION,
            snapshot,
            checksum,
        })
    }

    /// Encodes the package as JSON.
    pub fn to_json(&self) -> Result<String, ItineraryError> {
        serde_json::to_string(self).map_err(|e| ItineraryError::SerializationError {
            message: format!("snapshot of trip {}: {e}", self.snapshot.trip_id),
        })
    }

    /// Decodes a package from JSON without checking its digest.
    pub fn from_json(data: &str) -> Result<Self, ItineraryError> {
        serde_json::from_str(data).map_err(|e| ItineraryError::DeserializationError {
            message: format!("snapshot package: {e}"),
        })
    }

    /// Checks the format version, then recomputes the digest.
    ///
    /// # Errors
    ///
    /// - [`ItineraryError::InvalidOperation`] for a version this build cannot read
    /// - [`ItineraryError::ChecksumMismatch`] if the snapshot was altered
    pub fn validate(&self) -> Result<(), ItineraryError> {
        if self.version != ITINERARY_SNAPSHOT_FORMAT_VERSION {
            return Err(ItineraryError::InvalidOperation {
                message: format!(
                    "snapshot format {} is not readable, this build reads format {}",
                    self.version, ITINERARY_SNAPSHOT_FORMAT_VERSION
                ),
            });
        }

        let actual = digest(self.version, &self.snapshot)?;
        if actual == self.checksum {
            Ok(())
        } else {
            Err(ItineraryError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            })
        }
    }

    /// Validates the package and unwraps its snapshot.
    pub fn into_snapshot(self) -> Result<ItinerarySnapshot, ItineraryError> {
        self.validate()?;
        Ok(self.snapshot)
    }
}

/// Hashes a snapshot field by field.
///
/// Ids, days and timestamps are fed as fixed-width bytes; each payload as
/// length-prefixed JSON.
fn digest(version: u32, snapshot: &ItinerarySnapshot) -> Result<String, ItineraryError> {
    let mut hasher = Sha256::new();
    hasher.update(version.to_le_bytes());
    hasher.update(snapshot.trip_id.as_uuid().as_bytes());
    hasher.update(snapshot.timestamp.to_le_bytes());
    hasher.update((snapshot.days.len() as u64).to_le_bytes());

    for day in &snapshot.days {
        hasher.update(day.day.to_le_bytes());
        hasher.update((day.items.len() as u64).to_le_bytes());
        for item in &day.items {
            hasher.update(item.id.as_uuid().as_bytes());
            hasher.update(item.scope.trip_id.as_uuid().as_bytes());
            hasher.update(item.scope.day.to_le_bytes());
            match item.prev_item_id {
                Some(prev) => {
                    hasher.update([1u8]);
                    hasher.update(prev.as_uuid().as_bytes());
                }
                None => hasher.update([0u8]),
            }
            hasher.update(item.created_at.to_le_bytes());
            hasher.update(item.updated_at.to_le_bytes());

            let payload = serde_json::to_vec(&item.payload).map_err(|e| {
                ItineraryError::SerializationError {
                    message: format!("payload of {}: {e}", item.id),
                }
            })?;
            hasher.update((payload.len() as u64).to_le_bytes());
            hasher.update(&payload);
        }
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

impl<S: ItemStore> Itinerary<S> {
    /// Captures every day of a trip in chain order.
    pub fn create_snapshot(&self, trip_id: TripId) -> Result<ItinerarySnapshot, ItineraryError> {
        let days = self
            .days(trip_id)?
            .into_iter()
            .map(|(day, items)| DaySnapshot { day, items })
            .collect();
        Ok(ItinerarySnapshot {
            trip_id,
            timestamp: current_time_millis(),
            days,
        })
    }

    /// Creates a checksum-protected snapshot package.
    pub fn create_snapshot_package(
        &self,
        trip_id: TripId,
    ) -> Result<ItinerarySnapshotPackage, ItineraryError> {
        ItinerarySnapshotPackage::new(self.create_snapshot(trip_id)?)
    }

    /// Serializes a trip snapshot package to JSON.
    pub fn snapshot_to_json(&self, trip_id: TripId) -> Result<String, ItineraryError> {
        self.create_snapshot_package(trip_id)?.to_json()
    }

    /// Recreates the snapshot's days in its trip, in snapshot order.
    ///
    /// Every day named by the snapshot must be empty. Predecessor links are
    /// rebuilt from the order of `items`, so a snapshot taken from a malformed
    /// chain restores as a clean one. Returns the number of restored items.
    ///
    /// # Errors
    ///
    /// - [`ItineraryError::InvalidOperation`] for a non-empty target day, a day
    ///   listed twice or an item id listed twice
    /// - [`ItineraryError::Conflict`] if a target day filled up concurrently
    /// - payload and limit errors for any item
    pub fn restore_from_snapshot(
        &self,
        snapshot: ItinerarySnapshot,
    ) -> Result<usize, ItineraryError> {
        let trip_id = snapshot.trip_id;
        let mut seen_days = HashSet::with_capacity(snapshot.days.len());
        let mut seen_items = HashSet::with_capacity(snapshot.item_count());

        for day in &snapshot.days {
            self.limits.check_day(day.day)?;
            self.limits.check_day_capacity(0, day.items.len())?;
            if !seen_days.insert(day.day) {
                return Err(ItineraryError::InvalidOperation {
                    message: format!("day {} appears twice in snapshot", day.day),
                });
            }
            for item in &day.items {
                self.limits.check_payload(&item.payload)?;
                if !seen_items.insert(item.id) {
                    return Err(ItineraryError::InvalidOperation {
                        message: format!("item {} appears twice in snapshot", item.id),
                    });
                }
            }

            let scope = Scope::new(trip_id, day.day);
            if !self.store.load_scope(&scope)?.is_empty() {
                return Err(ItineraryError::InvalidOperation {
                    message: format!("cannot restore into non-empty day {scope}"),
                });
            }
        }

        let days: Vec<(u32, Vec<ItineraryItem>)> = snapshot
            .days
            .into_iter()
            .map(|day| (day.day, day.items))
            .collect();
        let timestamp = current_time_millis();
        let change = plan_restore(trip_id, &days, timestamp);
        let restored = change.writes().len();
        trace!("Itinerary {}: restoring {} items", trip_id, restored);
        self.commit(&change)?;

        info!(
            "Itinerary {}: restored {} items across {} days",
            trip_id,
            restored,
            days.len()
        );
        self.notify(trip_id, timestamp, ChainChange::Restored { items: restored });
        Ok(restored)
    }

    /// Restores a trip from a checksum-protected package.
    pub fn restore_from_snapshot_package(
        &self,
        package: ItinerarySnapshotPackage,
    ) -> Result<usize, ItineraryError> {
        let snapshot = package.into_snapshot()?;
        self.restore_from_snapshot(snapshot)
    }

    /// Restores a trip from the JSON produced by [`Self::snapshot_to_json`].
    pub fn restore_from_snapshot_json(&self, data: &str) -> Result<usize, ItineraryError> {
        let package = ItinerarySnapshotPackage::from_json(data)?;
        self.restore_from_snapshot_package(package)
    }
}
