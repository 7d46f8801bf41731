//! Optional size limits enforced by the service.

use serde::{Deserialize, Serialize};

use super::error::ItineraryError;
use super::item::ItemPayload;
use super::store::Guard;

/// Per-service limits. Every limit is disabled (`None`) by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItineraryLimits {
    /// Maximum number of items a single day may hold
    pub max_items_per_day: Option<usize>,

    /// Highest day number a trip may use
    pub max_days: Option<u32>,

    /// Maximum title length, in characters
    pub max_title_len: Option<usize>,
}

impl ItineraryLimits {
    /// Limits with every check disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of items per day.
    #[must_use]
    pub fn with_max_items_per_day(mut self, max: usize) -> Self {
        self.max_items_per_day = Some(max);
        self
    }

    /// Caps the day number.
    #[must_use]
    pub fn with_max_days(mut self, max: u32) -> Self {
        self.max_days = Some(max);
        self
    }

    /// Caps the title length.
    #[must_use]
    pub fn with_max_title_len(mut self, max: usize) -> Self {
        self.max_title_len = Some(max);
        self
    }

    /// Fails if a day already holding `current` items cannot take `added` more.
    pub fn check_day_capacity(&self, current: usize, added: usize) -> Result<(), ItineraryError> {
        if let Some(max) = self.max_items_per_day {
            let requested = current.saturating_add(added);
            if requested > max {
                return Err(ItineraryError::LimitExceeded {
                    limit: "max_items_per_day",
                    max,
                    requested,
                });
            }
        }
        Ok(())
    }

    /// Commit-time counterpart of [`Self::check_day_capacity`]: a guard that
    /// fails if `day` can no longer take `added` more items when the change
    /// set is applied. `None` when the day has no cap.
    #[must_use]
    pub fn capacity_guard(&self, day: u32, added: usize) -> Option<Guard> {
        self.max_items_per_day.map(|max| Guard::DayCountAtMost {
            day,
            max: max.saturating_sub(added),
        })
    }

    /// Fails if `day` is zero or beyond `max_days`.
    pub fn check_day(&self, day: u32) -> Result<(), ItineraryError> {
        if day == 0 {
            return Err(ItineraryError::InvalidOperation {
                message: "day numbers start at 1".to_string(),
            });
        }
        if let Some(max) = self.max_days
            && day > max
        {
            return Err(ItineraryError::LimitExceeded {
                limit: "max_days",
                max: max as usize,
                requested: day as usize,
            });
        }
        Ok(())
    }

    /// Validates the payload, then applies the title limit.
    pub fn check_payload(&self, payload: &ItemPayload) -> Result<(), ItineraryError> {
        payload.validate()?;
        if let Some(max) = self.max_title_len {
            let len = payload.title.chars().count();
            if len > max {
                return Err(ItineraryError::LimitExceeded {
                    limit: "max_title_len",
                    max,
                    requested: len,
                });
            }
        }
        Ok(())
    }
}
