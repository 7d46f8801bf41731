//! Itinerary item model: identifiers, the (trip, day) scope key and the payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::ItineraryError;

/// Form value used by callers to request insertion at the head of a day.
pub const FIRST_SENTINEL: &str = "__first__";

/// Opaque, immutable identifier of an itinerary item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Builds an identifier from a raw 128-bit value. Handy for deterministic tests.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Returns the underlying UUID.
    #[must_use]
    #[inline]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ItemId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of the trip that owns a set of day lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(Uuid);

impl TripId {
    /// Generates a new random trip identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Builds a trip identifier from a raw 128-bit value.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Returns the underlying UUID.
    #[must_use]
    #[inline]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TripId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TripId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Partition key of one linked list: a day within a trip.
///
/// Days are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    /// Owning trip
    pub trip_id: TripId,
    /// Day number within the trip, starting at 1
    pub day: u32,
}

impl Scope {
    /// Creates a new scope key.
    #[must_use]
    pub const fn new(trip_id: TripId, day: u32) -> Self {
        Self { trip_id, day }
    }

    /// Returns the same trip's scope for another day.
    #[must_use]
    pub const fn with_day(&self, day: u32) -> Self {
        Self {
            trip_id: self.trip_id,
            day,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/day-{}", self.trip_id, self.day)
    }
}

/// Where an item should be attached within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InsertionPoint {
    /// Become the new head of the day.
    First,
    /// Follow the given item.
    After(ItemId),
}

impl InsertionPoint {
    /// The predecessor id the attached item will carry.
    #[must_use]
    #[inline]
    pub fn prev_item_id(&self) -> Option<ItemId> {
        match self {
            InsertionPoint::First => None,
            InsertionPoint::After(id) => Some(*id),
        }
    }

    /// Parses a raw form value: empty or [`FIRST_SENTINEL`] means head.
    pub fn parse(raw: &str) -> Result<Self, ItineraryError> {
        let raw = raw.trim();
        if raw.is_empty() || raw == FIRST_SENTINEL {
            return Ok(InsertionPoint::First);
        }
        raw.parse::<ItemId>()
            .map(InsertionPoint::After)
            .map_err(|error| ItineraryError::InvalidOperation {
                message: format!("invalid insertion point {raw:?}: {error}"),
            })
    }
}

impl From<Option<ItemId>> for InsertionPoint {
    fn from(value: Option<ItemId>) -> Self {
        match value {
            Some(id) => InsertionPoint::After(id),
            None => InsertionPoint::First,
        }
    }
}

impl fmt::Display for InsertionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertionPoint::First => write!(f, "{FIRST_SENTINEL}"),
            InsertionPoint::After(id) => write!(f, "{id}"),
        }
    }
}

/// A time of day with minute precision.
///
/// Accepts `HH:MM` and `HH:MM:SS` (seconds are dropped) and always renders
/// as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    /// Builds a clock time, returning `None` when out of range.
    #[must_use]
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self {
            minutes: u16::from(hour) * 60 + u16::from(minute),
        })
    }

    /// Hour component (0-23).
    #[must_use]
    #[inline]
    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    /// Minute component (0-59).
    #[must_use]
    #[inline]
    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    /// Minutes since midnight.
    #[must_use]
    #[inline]
    pub fn minutes_since_midnight(&self) -> u16 {
        self.minutes
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = ItineraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ItineraryError::InvalidPayload {
            message: format!("invalid clock time {s:?}, expected HH:MM"),
        };

        let mut parts = s.trim().split(':');
        let hour = parts.next().ok_or_else(invalid)?;
        let minute = parts.next().ok_or_else(invalid)?;
        if let Some(second) = parts.next() {
            second.parse::<u8>().map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        ClockTime::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ItineraryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// When an item happens. Clock times and a relative duration are mutually
/// exclusive display modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Schedule {
    /// No timing information.
    #[default]
    Unscheduled,
    /// Explicit clock times. `end` may precede `start` for overnight legs.
    Clock {
        /// Start time
        start: ClockTime,
        /// Optional end time
        end: Option<ClockTime>,
    },
    /// A relative duration.
    Duration {
        /// Length in minutes, always positive
        minutes: u32,
    },
}

impl Schedule {
    /// Builds a schedule from the loose form fields a caller usually has.
    ///
    /// A positive duration wins over clock times; a zero or missing duration
    /// falls back to the start time, if any.
    pub fn from_parts(
        start: Option<ClockTime>,
        end: Option<ClockTime>,
        duration_minutes: Option<u32>,
    ) -> Self {
        match (duration_minutes, start) {
            (Some(minutes), _) if minutes > 0 => Schedule::Duration { minutes },
            (_, Some(start)) => Schedule::Clock { start, end },
            _ => Schedule::Unscheduled,
        }
    }

    /// Returns the start time when scheduled by clock.
    #[must_use]
    pub fn start(&self) -> Option<ClockTime> {
        match self {
            Schedule::Clock { start, .. } => Some(*start),
            _ => None,
        }
    }

    /// Returns the duration when scheduled relatively.
    #[must_use]
    pub fn duration_minutes(&self) -> Option<u32> {
        match self {
            Schedule::Duration { minutes } => Some(*minutes),
            _ => None,
        }
    }
}

/// Means of transport for a transport leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// High-speed rail
    Shinkansen,
    /// Limited express train
    Express,
    /// Local train
    LocalTrain,
    /// Bus
    Bus,
    /// Ferry or ship
    Ship,
    /// Flight
    Airplane,
    /// Private car or rental
    Car,
    /// Taxi
    Taxi,
    /// On foot
    Walk,
    /// Bicycle
    Bicycle,
    /// Anything else
    Other,
}

/// Fields that only make sense for a transport leg.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransportDetails {
    /// Means of transport
    pub mode: Option<TransportMode>,
    /// Departure station, stop or airport
    pub departure_name: Option<String>,
    /// Arrival station, stop or airport
    pub arrival_name: Option<String>,
    /// Car number on a train
    pub car_number: Option<String>,
    /// Seat number
    pub seat_number: Option<String>,
}

/// Category of an item, carrying the category-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ItemKind {
    /// A transport leg
    Transport(TransportDetails),
    /// A sightseeing stop
    Sightseeing,
    /// A meal
    Meal,
    /// Accommodation
    Lodging,
    /// Uncategorised
    #[default]
    Other,
}

impl ItemKind {
    /// Short lowercase label of the category.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Transport(_) => "transport",
            ItemKind::Sightseeing => "sightseeing",
            ItemKind::Meal => "meal",
            ItemKind::Lodging => "lodging",
            ItemKind::Other => "other",
        }
    }
}

/// WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

/// A named place an item refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Display name
    pub name: String,
    /// Optional coordinates
    pub coordinates: Option<GeoPoint>,
    /// Provider place identifier
    pub place_id: Option<String>,
    /// Administrative region code (1-47 for Japanese prefectures)
    pub prefecture_code: Option<u8>,
}

impl Location {
    /// A location known only by name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coordinates: None,
            place_id: None,
            prefecture_code: None,
        }
    }
}

/// Everything about an item except its identity and position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemPayload {
    /// Title, never blank
    pub title: String,
    /// Free-text notes
    pub description: Option<String>,
    /// Where it happens
    pub location: Option<Location>,
    /// When it happens
    pub schedule: Schedule,
    /// Category and category-specific fields
    pub kind: ItemKind,
    /// Optional photo
    pub photo_url: Option<String>,
}

impl ItemPayload {
    /// A payload with only a title set.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Checks the payload's own rules.
    pub fn validate(&self) -> Result<(), ItineraryError> {
        if self.title.trim().is_empty() {
            return Err(ItineraryError::InvalidPayload {
                message: "title must not be blank".to_string(),
            });
        }
        if let Schedule::Duration { minutes: 0 } = self.schedule {
            return Err(ItineraryError::InvalidPayload {
                message: "duration must be positive".to_string(),
            });
        }
        if let Some(point) = self.location.as_ref().and_then(|l| l.coordinates) {
            if !(-90.0..=90.0).contains(&point.latitude)
                || !(-180.0..=180.0).contains(&point.longitude)
            {
                return Err(ItineraryError::InvalidPayload {
                    message: format!(
                        "coordinates out of range: {}, {}",
                        point.latitude, point.longitude
                    ),
                });
            }
        }
        Ok(())
    }
}

/// One row of a day's linked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryItem {
    /// Immutable identity
    pub id: ItemId,
    /// The (trip, day) list this item belongs to
    pub scope: Scope,
    /// Predecessor within the same scope; `None` for the head
    pub prev_item_id: Option<ItemId>,
    /// Descriptive fields
    pub payload: ItemPayload,
    /// Creation time (milliseconds since epoch)
    pub created_at: u64,
    /// Last modification time (milliseconds since epoch)
    pub updated_at: u64,
}

impl ItineraryItem {
    /// Creates a new row.
    #[must_use]
    pub fn new(
        id: ItemId,
        scope: Scope,
        prev_item_id: Option<ItemId>,
        payload: ItemPayload,
        timestamp: u64,
    ) -> Self {
        Self {
            id,
            scope,
            prev_item_id,
            payload,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Returns `true` if this row claims to be the head of its day.
    #[must_use]
    #[inline]
    pub fn is_head(&self) -> bool {
        self.prev_item_id.is_none()
    }
}
