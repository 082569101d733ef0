//! Core data models for the transit pipeline
//!
//! This module contains the values that flow between the calculation
//! oracle, the caches and the orchestrator. All of them are plain values:
//! created once, cloned freely, never mutated by the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Subject
// =============================================================================

/// A point in space-time: a person's birth moment, or an observer location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Stable identifier used for cache keys
    pub id: String,
    /// Display name
    pub name: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// IANA timezone name
    pub timezone: String,
    /// Pre-resolved zodiac type ("Tropic", "Sidereal")
    #[serde(default)]
    pub zodiac_type: Option<String>,
    /// Sidereal mode when `zodiac_type` is sidereal
    #[serde(default)]
    pub sidereal_mode: Option<String>,
    /// House system identifier
    #[serde(default)]
    pub houses_system: Option<String>,
}

impl Subject {
    /// Canonical observer used for raw-sky ephemeris timelines.
    pub fn greenwich_observer() -> Self {
        Self {
            id: "ephemeris-greenwich".to_string(),
            name: "Greenwich".to_string(),
            year: 2000,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            latitude: 51.4769,
            longitude: 0.0,
            timezone: "Etc/UTC".to_string(),
            zodiac_type: None,
            sidereal_mode: None,
            houses_system: None,
        }
    }

    /// Copy of this subject moved to `instant`. The original is untouched.
    pub fn at_instant(&self, instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
            day: instant.day(),
            hour: instant.hour(),
            minute: instant.minute(),
            ..self.clone()
        }
    }
}

// =============================================================================
// Oracle Output
// =============================================================================

/// Position of one chart point as reported by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPosition {
    pub name: String,
    pub sign: String,
    /// Degrees within the sign
    pub position: f64,
    /// Absolute ecliptic longitude (0..360)
    pub abs_pos: f64,
    #[serde(default)]
    pub house: Option<String>,
    #[serde(default)]
    pub retrograde: Option<bool>,
}

/// Subject snapshot enriched with computed point positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSubject {
    pub name: String,
    #[serde(default)]
    pub points: Vec<PointPosition>,
}

/// Whether an aspect is tightening or loosening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectMovement {
    Applying,
    Separating,
    Static,
}

/// An aspect between two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    pub p1_name: String,
    pub p2_name: String,
    /// Aspect kind name, e.g. "trine"
    pub aspect: String,
    /// Signed degrees of deviation from exact
    pub orbit: f64,
    #[serde(default)]
    pub aspect_movement: Option<AspectMovement>,
}

impl Aspect {
    /// Convenience constructor
    pub fn new(
        p1: impl Into<String>,
        p2: impl Into<String>,
        kind: impl Into<String>,
        orbit: f64,
    ) -> Self {
        Self {
            p1_name: p1.into(),
            p2_name: p2.into(),
            aspect: kind.into(),
            orbit,
            aspect_movement: None,
        }
    }

    /// Unsigned orb in degrees
    pub fn orb(&self) -> f64 {
        self.orbit.abs()
    }
}

/// A point of one chart projected into the houses of the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseProjection {
    pub point_name: String,
    pub projected_house: String,
}

/// House overlays in both directions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HouseComparison {
    #[serde(default)]
    pub first_points_in_second_houses: Vec<HouseProjection>,
    #[serde(default)]
    pub second_points_in_first_houses: Vec<HouseProjection>,
}

/// One day of transits to a reference subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitDayData {
    /// UTC midnight of the calendar day
    pub date: DateTime<Utc>,
    pub transit_subject: EnrichedSubject,
    #[serde(default)]
    pub aspects: Vec<Aspect>,
    #[serde(default)]
    pub house_comparison: HouseComparison,
}

impl TransitDayData {
    /// Calendar day of this record
    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }
}

/// One day of raw-sky positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EphemerisDay {
    /// UTC midnight of the calendar day
    pub date: DateTime<Utc>,
    pub subject: EnrichedSubject,
}

impl EphemerisDay {
    /// Calendar day of this record
    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }
}

/// UTC midnight for a calendar day
pub fn day_instant(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

// =============================================================================
// Options & Progress
// =============================================================================

/// How the oracle distributes element/quality weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMethod {
    #[default]
    Weighted,
    PureCount,
}

/// Options bag forwarded to every oracle call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationOptions {
    /// Points to compute; empty means oracle default
    #[serde(default)]
    pub active_points: Vec<String>,
    /// Aspect kinds to compute; empty means oracle default
    #[serde(default)]
    pub active_aspects: Vec<String>,
    #[serde(default)]
    pub distribution_method: DistributionMethod,
    /// Per-aspect weight overrides
    #[serde(default)]
    pub custom_distribution_weights: BTreeMap<String, f64>,
}

/// Progress of a timeline request: `loaded` of `total` units processed.
///
/// Units are months for transit timelines and days for ephemeris timelines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub loaded: usize,
    pub total: usize,
}

impl Progress {
    /// Fresh counter for a new request
    pub fn reset(total: usize) -> Self {
        Self { loaded: 0, total }
    }

    /// Whether every unit has been processed
    pub fn is_complete(&self) -> bool {
        self.loaded >= self.total
    }
}
