use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::item::{ItemId, Scope, TripId};

/// What changed in a trip's chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainChange {
    /// An item was spliced into a day
    Inserted {
        /// The new item
        item_id: ItemId,
        /// Where it was inserted
        scope: Scope,
        /// Its predecessor
        prev: Option<ItemId>,
    },

    /// An item changed position, possibly across days
    Moved {
        /// The moved item
        item_id: ItemId,
        /// Scope before the move
        from: Scope,
        /// Scope after the move
        to: Scope,
        /// New predecessor
        prev: Option<ItemId>,
    },

    /// An item was removed and its neighbours re-linked
    Deleted {
        /// The removed item
        item_id: ItemId,
        /// Scope it was removed from
        scope: Scope,
    },

    /// Descriptive fields changed; the position did not
    PayloadUpdated {
        /// The edited item
        item_id: ItemId,
        /// Its scope
        scope: Scope,
    },

    /// A snapshot was restored into the trip
    Restored {
        /// Number of recreated items
        items: usize,
    },
}

/// Event emitted after a change set has been committed.
/// Listeners only learn what changed; they re-read the affected days
/// through the service if they need the new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainChangedEvent {
    /// Trip the change belongs to
    pub trip_id: TripId,

    /// Commit time (milliseconds since epoch)
    pub timestamp: u64,

    /// The change itself
    pub change: ChainChange,
}

/// A thread-safe listener callback for chain change events.
///
/// Called synchronously on the writer's thread after every successful
/// insert, move, delete, payload update or restore.
pub type ChainChangedListener = Arc<dyn Fn(ChainChangedEvent) + Send + Sync>;
