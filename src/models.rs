//! Canonical records produced by the normalization layer.
//!
//! Upstream payloads arrive as untyped JSON in several historical shapes;
//! these types are the single internal representation the rest of the
//! pipeline works with. Everything here is a per-request snapshot — nothing
//! is persisted beyond the result cache's TTL window.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// A station as returned by the upstream station search.
///
/// Identity is `code`; `uic_code` is the international identifier. Name
/// variants differ in length ("Almere C" vs "Almere Centrum") and all of
/// them participate in resolver matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uic_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_short: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_long: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
}

impl Station {
    /// Preferred display name: long, then medium, then short, then code.
    pub fn display_name(&self) -> &str {
        self.name_long
            .as_deref()
            .or(self.name_medium.as_deref())
            .or(self.name_short.as_deref())
            .unwrap_or(&self.code)
    }

    /// All known name variants, for matching.
    pub fn name_variants(&self) -> impl Iterator<Item = &str> {
        [
            self.name_long.as_deref(),
            self.name_medium.as_deref(),
            self.name_short.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// One trip alternative from a trip search response.
///
/// `ctx_recon` is an opaque upstream capability token used to re-fetch full
/// detail; it is carried verbatim and never parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx_recon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub transfers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_duration_minutes: Option<u32>,
    pub optimal: bool,
    pub realtime: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_planned_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_actual_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_planned_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_actual_date_time: Option<DateTime<FixedOffset>>,
    pub legs: Vec<TripLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_message: Option<String>,
}

impl TripSummary {
    /// Duration used for ranking: actual when known, planned otherwise.
    pub fn duration_minutes(&self) -> Option<u32> {
        self.actual_duration_minutes
            .or(self.planned_duration_minutes)
    }

    /// Departure instant used for ranking: actual when known, planned otherwise.
    pub fn departure_time(&self) -> Option<DateTime<FixedOffset>> {
        self.departure_actual_date_time
            .or(self.departure_planned_date_time)
    }
}

/// One leg of a trip. `stops` is lazy-loadable upstream and may be absent
/// even when `stop_count > 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripLeg {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_planned_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_actual_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_planned_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_actual_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_planned_track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_actual_track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_planned_track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_actual_track: Option<String>,
    pub stop_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stops: Option<Vec<Stop>>,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journey_detail_ref: Option<String>,
}

/// An intermediate stop on a leg or journey.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_track: Option<String>,
    pub cancelled: bool,
}

impl Stop {
    /// A stop with neither datetime is a non-public pass-through. It still
    /// counts toward `stop_count` but is excluded from display lists.
    pub fn is_passthrough(&self) -> bool {
        self.planned_date_time.is_none() && self.actual_date_time.is_none()
    }
}

/// Filter a stop list down to publicly displayable stops.
pub fn display_stops(stops: &[Stop]) -> Vec<&Stop> {
    stops.iter().filter(|s| !s.is_passthrough()).collect()
}

/// One entry on a departure or arrival board. For arrivals, `direction`
/// carries the origin station name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Departure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_track: Option<String>,
    pub cancelled: bool,
}

impl Departure {
    /// Board time used for window filtering: actual when known, planned otherwise.
    pub fn time(&self) -> Option<DateTime<FixedOffset>> {
        self.actual_date_time.or(self.planned_date_time)
    }

    /// Track used for platform filtering: actual when known, planned otherwise.
    pub fn track(&self) -> Option<&str> {
        self.actual_track
            .as_deref()
            .or(self.planned_track.as_deref())
    }
}

/// Upstream disruption categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisruptionType {
    Disruption,
    Maintenance,
    Calamity,
}

impl DisruptionType {
    pub fn from_upstream(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "DISRUPTION" => Some(DisruptionType::Disruption),
            "MAINTENANCE" => Some(DisruptionType::Maintenance),
            "CALAMITY" => Some(DisruptionType::Calamity),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisruptionType::Disruption => "DISRUPTION",
            DisruptionType::Maintenance => "MAINTENANCE",
            DisruptionType::Calamity => "CALAMITY",
        }
    }
}

/// A service disruption, maintenance window, or calamity notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disruption {
    pub id: String,
    #[serde(rename = "type")]
    pub disruption_type: DisruptionType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub is_active: bool,
}
