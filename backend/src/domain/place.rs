//! Physical places that offer queues.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PlaceId, UserId};

/// Validation errors raised by [`Place::new`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaceValidationError {
    #[error("place name must not be empty")]
    EmptyName,
    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),
    #[error("max concurrent queues must be at least 1")]
    NoQueueCapacity,
    #[error("closing time must be after opening time")]
    InvertedOpeningHours,
}

/// Input payload for [`Place::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceDraft {
    pub id: PlaceId,
    pub owner_id: UserId,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub max_concurrent_queues: u32,
    pub created_at: DateTime<Utc>,
}

/// A place owned by one admin user. Immutable once registered.
///
/// ## Invariants
/// - `name` is non-blank.
/// - Coordinates are valid WGS84 degrees.
/// - `max_concurrent_queues >= 1`.
/// - When both opening hours are set, closing comes after opening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    id: PlaceId,
    owner_id: UserId,
    name: String,
    address: String,
    latitude: f64,
    longitude: f64,
    opening_time: Option<NaiveTime>,
    closing_time: Option<NaiveTime>,
    max_concurrent_queues: u32,
    created_at: DateTime<Utc>,
}

impl Place {
    /// Validate a draft and build a place.
    pub fn new(draft: PlaceDraft) -> Result<Self, PlaceValidationError> {
        let PlaceDraft {
            id,
            owner_id,
            name,
            address,
            latitude,
            longitude,
            opening_time,
            closing_time,
            max_concurrent_queues,
            created_at,
        } = draft;

        if name.trim().is_empty() {
            return Err(PlaceValidationError::EmptyName);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(PlaceValidationError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(PlaceValidationError::LongitudeOutOfRange(longitude));
        }
        if max_concurrent_queues == 0 {
            return Err(PlaceValidationError::NoQueueCapacity);
        }
        if let (Some(open), Some(close)) = (opening_time, closing_time)
            && close <= open
        {
            return Err(PlaceValidationError::InvertedOpeningHours);
        }

        Ok(Self {
            id,
            owner_id,
            name,
            address,
            latitude,
            longitude,
            opening_time,
            closing_time,
            max_concurrent_queues,
            created_at,
        })
    }

    /// Place identifier.
    pub const fn id(&self) -> &PlaceId {
        &self.id
    }

    /// Admin user who owns the place and may operate its queues.
    pub const fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Daily opening time, if published.
    pub const fn opening_time(&self) -> Option<NaiveTime> {
        self.opening_time
    }

    /// Daily closing time, if published.
    pub const fn closing_time(&self) -> Option<NaiveTime> {
        self.closing_time
    }

    /// Upper bound on simultaneously open queues.
    pub const fn max_concurrent_queues(&self) -> u32 {
        self.max_concurrent_queues
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
