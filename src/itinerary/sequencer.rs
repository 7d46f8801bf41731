//! Reconstruction of a day's order from predecessor pointers.
//!
//! Rows arrive from storage as an unordered set in which every row names the
//! row it follows. [`sequence`] turns that set back into a list. It is total:
//! forks, cycles, dangling pointers, missing or extra heads never make it fail
//! and never drop a row. Rows the forward walk cannot reach are appended, in
//! input order, after the walked part.
//!
//! [`inspect`] runs the same walk and reports what was wrong with the chain,
//! so read paths can log malformed days without changing what they render.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

use super::item::{ItemId, ItineraryItem};

/// Anything that stores a reference to its predecessor.
pub trait Linked {
    /// Identity type shared by `key` and `prev_key`.
    type Key: Eq + Hash;

    /// This node's identity.
    fn key(&self) -> &Self::Key;

    /// The node this one follows, or `None` for a head.
    fn prev_key(&self) -> Option<&Self::Key>;
}

impl Linked for ItineraryItem {
    type Key = ItemId;

    #[inline]
    fn key(&self) -> &ItemId {
        &self.id
    }

    #[inline]
    fn prev_key(&self) -> Option<&ItemId> {
        self.prev_item_id.as_ref()
    }
}

impl<T: Linked> Linked for &T {
    type Key = T::Key;

    #[inline]
    fn key(&self) -> &Self::Key {
        (**self).key()
    }

    #[inline]
    fn prev_key(&self) -> Option<&Self::Key> {
        (**self).prev_key()
    }
}

bitflags! {
    /// Problems found in a chain by [`inspect`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ChainDefects: u8 {
        /// Non-empty list without any head
        const NO_HEAD = 1 << 0;

        /// More than one head
        const MULTIPLE_HEADS = 1 << 1;

        /// Two nodes name the same predecessor
        const FORK = 1 << 2;

        /// Following predecessors loops
        const CYCLE = 1 << 3;

        /// A predecessor that is not in the list
        const DANGLING = 1 << 4;

        /// Nodes not reachable from the chosen head
        const ORPHANS = 1 << 5;
    }
}

/// Summary of a chain's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainReport {
    /// Number of nodes
    pub len: usize,
    /// Nodes with no predecessor
    pub heads: usize,
    /// Nodes reached by walking from the chosen head
    pub threaded: usize,
    /// Nodes appended after the walk
    pub orphans: usize,
    /// Defects found
    pub defects: ChainDefects,
}

impl ChainReport {
    /// Returns `true` if the chain is a single well-formed list.
    #[must_use]
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.defects.is_empty()
    }
}

/// Result of walking a chain: the output order as indices into the input.
struct Walk {
    order: Vec<usize>,
    threaded: usize,
    heads: usize,
    forked: bool,
}

fn walk<T: Linked>(items: &[T]) -> Walk {
    let mut heads: Vec<usize> = Vec::new();
    let mut successors: HashMap<&T::Key, usize> = HashMap::with_capacity(items.len());
    let mut forked = false;

    for (index, item) in items.iter().enumerate() {
        match item.prev_key() {
            None => heads.push(index),
            Some(prev) => {
                // last write wins when two nodes claim the same predecessor
                if successors.insert(prev, index).is_some() {
                    forked = true;
                }
            }
        }
    }

    let mut order = Vec::with_capacity(items.len());
    let mut visited = vec![false; items.len()];

    let head = heads.first().copied().or(if items.is_empty() {
        None
    } else {
        Some(0)
    });

    let mut current = head;
    while let Some(index) = current {
        if visited[index] {
            break;
        }
        visited[index] = true;
        order.push(index);
        current = successors.get(items[index].key()).copied();
    }
    let threaded = order.len();

    order.extend((0..items.len()).filter(|&index| !visited[index]));

    Walk {
        order,
        threaded,
        heads: heads.len(),
        forked,
    }
}

fn has_cycle<T: Linked>(items: &[T]) -> bool {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let positions: HashMap<&T::Key, usize> = items
        .iter()
        .enumerate()
        .map(|(index, item)| (item.key(), index))
        .collect();
    let mut state = vec![UNSEEN; items.len()];
    let mut path = Vec::new();

    for start in 0..items.len() {
        let mut current = Some(start);
        while let Some(index) = current {
            match state[index] {
                ON_PATH => return true,
                DONE => break,
                _ => {}
            }
            state[index] = ON_PATH;
            path.push(index);
            current = items[index]
                .prev_key()
                .and_then(|prev| positions.get(prev).copied());
        }
        for index in path.drain(..) {
            state[index] = DONE;
        }
    }
    false
}

/// Orders `items` by their predecessor pointers.
///
/// The head is the only node without a predecessor. With zero or several
/// such nodes the first of them in input order is used, or the first node
/// overall if none has a null predecessor. The output always contains every
/// input node exactly once.
///
/// # Examples
///
/// ```
/// use itinerary_rs::prelude::*;
///
/// let trip = TripId::from_u128(1);
/// let scope = Scope::new(trip, 1);
/// let a = ItineraryItem::new(ItemId::from_u128(1), scope, None, ItemPayload::titled("A"), 0);
/// let b = ItineraryItem::new(ItemId::from_u128(2), scope, Some(a.id), ItemPayload::titled("B"), 0);
///
/// let ordered = sequence(vec![b.clone(), a.clone()]);
/// assert_eq!(ordered, vec![a, b]);
/// ```
#[must_use]
pub fn sequence<T: Linked>(items: Vec<T>) -> Vec<T> {
    let order = walk(&items).order;

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

/// Borrowing variant of [`sequence`].
#[must_use]
pub fn sequence_refs<T: Linked>(items: &[T]) -> Vec<&T> {
    walk(items)
        .order
        .into_iter()
        .map(|index| &items[index])
        .collect()
}

/// Describes the shape of a chain without reordering it.
#[must_use]
pub fn inspect<T: Linked>(items: &[T]) -> ChainReport {
    let walked = walk(items);
    let mut defects = ChainDefects::empty();

    if !items.is_empty() && walked.heads == 0 {
        defects |= ChainDefects::NO_HEAD;
    }
    if walked.heads > 1 {
        defects |= ChainDefects::MULTIPLE_HEADS;
    }
    if walked.forked {
        defects |= ChainDefects::FORK;
    }
    if walked.threaded < items.len() {
        defects |= ChainDefects::ORPHANS;
    }

    let keys: std::collections::HashSet<&T::Key> = items.iter().map(Linked::key).collect();
    if items
        .iter()
        .filter_map(Linked::prev_key)
        .any(|prev| !keys.contains(prev))
    {
        defects |= ChainDefects::DANGLING;
    }
    if has_cycle(items) {
        defects |= ChainDefects::CYCLE;
    }

    ChainReport {
        len: items.len(),
        heads: walked.heads,
        threaded: walked.threaded,
        orphans: items.len() - walked.threaded,
        defects,
    }
}
