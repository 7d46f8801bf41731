//! SQLite-backed [`ItemStore`].
//!
//! Rows live in a single `itinerary_items` table. Structural fields are
//! plain columns so guards can be evaluated with indexed lookups; the
//! payload is stored as a JSON document. Every change set runs inside a
//! `BEGIN IMMEDIATE` transaction, which takes the database write lock before
//! the guards are read, so guard checks and writes cannot interleave with
//! another writer.

use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, trace};

use super::{ChangeSet, Guard, ItemStore, RowWrite};
use crate::itinerary::error::StoreError;
use crate::itinerary::item::{ItemId, ItemPayload, ItineraryItem, Scope, TripId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS itinerary_items (
    id TEXT PRIMARY KEY NOT NULL,
    trip_id TEXT NOT NULL,
    day_number INTEGER NOT NULL,
    prev_item_id TEXT,
    payload TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_itinerary_items_slot
    ON itinerary_items(trip_id, day_number, prev_item_id);
";

const SELECT_COLUMNS: &str =
    "SELECT id, trip_id, day_number, prev_item_id, payload, created_at_ms, updated_at_ms \
     FROM itinerary_items";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Item store persisted in a SQLite database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path` and installs the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("Opened itinerary store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the schema cannot be installed.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Inserts rows verbatim, bypassing every chain check.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] if a row id is already present.
    pub fn seed<I>(&self, items: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = ItineraryItem>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for item in items {
            insert_row(&tx, &item)?;
        }
        tx.commit()?;
        Ok(())
    }
}

struct RawRow {
    id: String,
    trip_id: String,
    day: i64,
    prev: Option<String>,
    payload: String,
    created_at: i64,
    updated_at: i64,
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        day: row.get(2)?,
        prev: row.get(3)?,
        payload: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn corrupt(message: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        message: message.into(),
    }
}

fn decode(raw: RawRow) -> Result<ItineraryItem, StoreError> {
    let id: ItemId = raw
        .id
        .parse()
        .map_err(|e| corrupt(format!("item id {:?}: {e}", raw.id)))?;
    let trip_id: TripId = raw
        .trip_id
        .parse()
        .map_err(|e| corrupt(format!("trip id {:?} of {id}: {e}", raw.trip_id)))?;
    let day = u32::try_from(raw.day).map_err(|e| corrupt(format!("day of {id}: {e}")))?;
    let prev_item_id = raw
        .prev
        .as_deref()
        .map(str::parse::<ItemId>)
        .transpose()
        .map_err(|e| corrupt(format!("predecessor of {id}: {e}")))?;
    let payload: ItemPayload = serde_json::from_str(&raw.payload)
        .map_err(|e| corrupt(format!("payload of {id}: {e}")))?;

    Ok(ItineraryItem {
        id,
        scope: Scope::new(trip_id, day),
        prev_item_id,
        payload,
        created_at: u64::try_from(raw.created_at)
            .map_err(|e| corrupt(format!("created_at of {id}: {e}")))?,
        updated_at: u64::try_from(raw.updated_at)
            .map_err(|e| corrupt(format!("updated_at of {id}: {e}")))?,
    })
}

fn millis(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn id_text(id: Option<ItemId>) -> Option<String> {
    id.map(|id| id.to_string())
}

fn encode_payload(id: ItemId, payload: &ItemPayload) -> Result<String, StoreError> {
    serde_json::to_string(payload).map_err(|e| corrupt(format!("payload of {id}: {e}")))
}

fn insert_row(tx: &Transaction<'_>, item: &ItineraryItem) -> Result<(), StoreError> {
    let payload = encode_payload(item.id, &item.payload)?;
    let result = tx.execute(
        "INSERT INTO itinerary_items(id, trip_id, day_number, prev_item_id, payload, created_at_ms, updated_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            item.id.to_string(),
            item.scope.trip_id.to_string(),
            i64::from(item.scope.day),
            id_text(item.prev_item_id),
            payload,
            millis(item.created_at),
            millis(item.updated_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Err(StoreError::DuplicateId(item.id))
        }
        Err(err) => Err(err.into()),
    }
}

fn guard_holds(tx: &Transaction<'_>, trip_id: &str, guard: &Guard) -> Result<bool, StoreError> {
    match guard {
        Guard::At { id, day, prev } => {
            let found: Option<(i64, Option<String>)> = tx
                .query_row(
                    "SELECT day_number, prev_item_id FROM itinerary_items WHERE id = ?1 AND trip_id = ?2",
                    params![id.to_string(), trip_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(found.is_some_and(|(found_day, found_prev)| {
                found_day == i64::from(*day) && found_prev == id_text(*prev)
            }))
        }
        Guard::Present { id, day } => {
            let found: Option<i64> = tx
                .query_row(
                    "SELECT day_number FROM itinerary_items WHERE id = ?1 AND trip_id = ?2",
                    params![id.to_string(), trip_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found == Some(i64::from(*day)))
        }
        Guard::SlotHolder { day, after, holder } => {
            let mut stmt = tx.prepare(
                "SELECT id FROM itinerary_items \
                 WHERE trip_id = ?1 AND day_number = ?2 AND prev_item_id IS ?3",
            )?;
            let occupants = stmt
                .query_map(params![trip_id, i64::from(*day), id_text(*after)], |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            let expected: Vec<String> = id_text(*holder).into_iter().collect();
            Ok(occupants == expected)
        }
        Guard::DayEmpty { day } => Ok(day_count(tx, trip_id, *day)? == 0),
        Guard::DayCountAtMost { day, max } => Ok(day_count(tx, trip_id, *day)? <= *max),
    }
}

fn day_count(tx: &Transaction<'_>, trip_id: &str, day: u32) -> Result<usize, StoreError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM itinerary_items WHERE trip_id = ?1 AND day_number = ?2",
        params![trip_id, i64::from(day)],
        |row| row.get(0),
    )?;
    usize::try_from(count).map_err(|e| corrupt(format!("row count of day {day}: {e}")))
}

fn apply_write(
    tx: &Transaction<'_>,
    trip_id: &str,
    timestamp: u64,
    write: &RowWrite,
) -> Result<(), StoreError> {
    match write {
        RowWrite::Create(item) => insert_row(tx, item),
        RowWrite::Link { id, day, prev } => {
            let changed = tx.execute(
                "UPDATE itinerary_items SET day_number = ?1, prev_item_id = ?2, updated_at_ms = ?3 \
                 WHERE id = ?4 AND trip_id = ?5",
                params![
                    i64::from(*day),
                    id_text(*prev),
                    millis(timestamp),
                    id.to_string(),
                    trip_id
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::MissingRow(*id));
            }
            Ok(())
        }
        RowWrite::Remove { id } => {
            let changed = tx.execute(
                "DELETE FROM itinerary_items WHERE id = ?1 AND trip_id = ?2",
                params![id.to_string(), trip_id],
            )?;
            if changed == 0 {
                return Err(StoreError::MissingRow(*id));
            }
            Ok(())
        }
    }
}

fn select_rows(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ItineraryItem>, StoreError> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE {filter}"))?;
    let raws = stmt
        .query_map(params, read_raw)?
        .collect::<Result<Vec<_>, _>>()?;
    raws.into_iter().map(decode).collect()
}

impl ItemStore for SqliteStore {
    fn load_scope(&self, scope: &Scope) -> Result<Vec<ItineraryItem>, StoreError> {
        let conn = self.conn()?;
        select_rows(
            &conn,
            "trip_id = ?1 AND day_number = ?2",
            params![scope.trip_id.to_string(), i64::from(scope.day)],
        )
    }

    fn load_trip(&self, trip_id: &TripId) -> Result<Vec<ItineraryItem>, StoreError> {
        let conn = self.conn()?;
        select_rows(&conn, "trip_id = ?1", params![trip_id.to_string()])
    }

    fn get(&self, id: &ItemId) -> Result<Option<ItineraryItem>, StoreError> {
        let conn = self.conn()?;
        Ok(select_rows(&conn, "id = ?1", params![id.to_string()])?
            .into_iter()
            .next())
    }

    fn commit(&self, change: &ChangeSet) -> Result<(), StoreError> {
        let trip_id = change.trip_id().to_string();
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for guard in change.guards() {
            if !guard_holds(&tx, &trip_id, guard)? {
                trace!("sqlite store: guard failed on trip {trip_id}: {guard}");
                return Err(StoreError::GuardFailed {
                    guard: guard.clone(),
                });
            }
        }

        for write in change.writes() {
            apply_write(&tx, &trip_id, change.timestamp(), write)?;
        }

        tx.commit()?;
        trace!(
            "sqlite store: committed {} writes on trip {trip_id}",
            change.writes().len()
        );
        Ok(())
    }

    fn update_payload(
        &self,
        id: &ItemId,
        payload: &ItemPayload,
        updated_at: u64,
    ) -> Result<Option<ItineraryItem>, StoreError> {
        let encoded = encode_payload(*id, payload)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE itinerary_items SET payload = ?1, updated_at_ms = ?2 WHERE id = ?3",
            params![encoded, millis(updated_at), id.to_string()],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(select_rows(&conn, "id = ?1", params![id.to_string()])?
            .into_iter()
            .next())
    }
}
