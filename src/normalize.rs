//! Normalization of heterogeneous upstream JSON into canonical records.
//!
//! The upstream API has grown several payload generations (`namen.lang` vs
//! `names.long`, `UICCode` vs `uicCode`, stop times under different keys),
//! so every normalizer here walks untyped [`Value`]s defensively: every
//! field is optional, unknown shapes degrade to `None`, and a record is
//! dropped only when its identity is missing.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use crate::models::{
    Departure, Disruption, DisruptionType, Station, Stop, TripLeg, TripSummary,
};

// ============ Field helpers ============

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Accept either a string or a number for string-ish identifiers
/// (UIC codes and track numbers arrive both ways).
fn stringy_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn u32_field(value: &Value, key: &str) -> Option<u32> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn f64_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Parse an upstream timestamp. The API emits ISO 8601 with either a
/// colonized (`+01:00`) or compact (`+0100`) offset.
pub fn parse_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

fn datetime_field(value: &Value, key: &str) -> Option<DateTime<FixedOffset>> {
    value
        .get(key)
        .and_then(Value::as_str)
        .and_then(parse_datetime)
}

fn first_datetime(value: &Value, keys: &[&str]) -> Option<DateTime<FixedOffset>> {
    keys.iter().find_map(|key| datetime_field(value, key))
}

// ============ Stations ============

/// Normalize one station record. Handles both the `nsapp-stations` shape
/// (`id.code`, `names.long`) and the legacy shape (`code`, `namen.lang`).
pub fn station_from_json(value: &Value) -> Option<Station> {
    let id = value.get("id");
    let code = str_field(value, "code")
        .or_else(|| id.and_then(|v| str_field(v, "code")))
        .or_else(|| str_field(value, "stationCode"))?;

    let uic_code = stringy_field(value, "UICCode")
        .or_else(|| stringy_field(value, "uicCode"))
        .or_else(|| id.and_then(|v| stringy_field(v, "uicCode")));

    let names = value.get("names").or_else(|| value.get("namen"));
    let name_short = names
        .and_then(|n| str_field(n, "short").or_else(|| str_field(n, "kort")))
        .or_else(|| str_field(value, "nameShort"));
    let name_medium = names
        .and_then(|n| str_field(n, "medium").or_else(|| str_field(n, "middel")))
        .or_else(|| str_field(value, "nameMedium"));
    let name_long = names
        .and_then(|n| str_field(n, "long").or_else(|| str_field(n, "lang")))
        .or_else(|| str_field(value, "nameLong"));

    let location = value.get("location");
    let lat = f64_field(value, "lat").or_else(|| location.and_then(|l| f64_field(l, "lat")));
    let lng = f64_field(value, "lng").or_else(|| location.and_then(|l| f64_field(l, "lng")));

    Some(Station {
        code,
        uic_code,
        name_short,
        name_medium,
        name_long,
        country_code: str_field(value, "country")
            .or_else(|| str_field(value, "land"))
            .or_else(|| str_field(value, "countryCode")),
        lat,
        lng,
        distance_meters: f64_field(value, "distance")
            .or_else(|| f64_field(value, "distanceMeters")),
    })
}

pub fn stations_from_payload(json: &Value) -> Vec<Station> {
    list_under(json, &["payload", "stations"])
        .iter()
        .filter_map(|v| station_from_json(v))
        .collect()
}

// ============ Trips ============

pub fn trip_from_json(value: &Value) -> Option<TripSummary> {
    let uid = str_field(value, "uid")
        .or_else(|| str_field(value, "idx"))
        .or_else(|| stringy_field(value, "index"))?;

    let legs: Vec<TripLeg> = value
        .get("legs")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(i, leg)| leg_from_json(leg, i as u32))
                .collect()
        })
        .unwrap_or_default();

    let first_leg = legs.first();
    let last_leg = legs.last();

    let transfers = u32_field(value, "transfers")
        .unwrap_or_else(|| (legs.len().saturating_sub(1)) as u32);

    Some(TripSummary {
        uid,
        ctx_recon: str_field(value, "ctxRecon"),
        status: str_field(value, "status"),
        source: str_field(value, "source"),
        transfers,
        planned_duration_minutes: u32_field(value, "plannedDurationInMinutes")
            .or_else(|| u32_field(value, "plannedDurationMinutes")),
        actual_duration_minutes: u32_field(value, "actualDurationInMinutes")
            .or_else(|| u32_field(value, "actualDurationMinutes")),
        optimal: bool_field(value, "optimal"),
        realtime: bool_field(value, "realtime"),
        departure_name: first_leg.and_then(|l| l.origin_name.clone()),
        arrival_name: last_leg.and_then(|l| l.destination_name.clone()),
        departure_planned_date_time: first_leg.and_then(|l| l.origin_planned_date_time),
        departure_actual_date_time: first_leg.and_then(|l| l.origin_actual_date_time),
        arrival_planned_date_time: last_leg.and_then(|l| l.destination_planned_date_time),
        arrival_actual_date_time: last_leg.and_then(|l| l.destination_actual_date_time),
        legs,
        primary_message: value
            .get("primaryMessage")
            .and_then(|m| str_field(m, "title").or_else(|| str_field(m, "message"))),
    })
}

pub fn trips_from_payload(json: &Value) -> Vec<TripSummary> {
    list_under(json, &["trips"])
        .iter()
        .filter_map(|v| trip_from_json(v))
        .collect()
}

pub fn leg_from_json(value: &Value, fallback_index: u32) -> TripLeg {
    let origin = value.get("origin").unwrap_or(&Value::Null);
    let destination = value.get("destination").unwrap_or(&Value::Null);
    let product = value.get("product").unwrap_or(&Value::Null);

    let stops: Option<Vec<Stop>> = value
        .get("stops")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(stop_from_json).collect());

    let stop_count = u32_field(value, "stopCount")
        .unwrap_or_else(|| stops.as_ref().map(|s| s.len() as u32).unwrap_or(0));

    TripLeg {
        index: u32_field(value, "idx").unwrap_or(fallback_index),
        mode: str_field(value, "travelType").or_else(|| str_field(product, "type")),
        name: str_field(value, "name").or_else(|| str_field(product, "displayName")),
        operator: str_field(product, "operatorName"),
        origin_name: str_field(origin, "name"),
        destination_name: str_field(destination, "name"),
        origin_planned_date_time: datetime_field(origin, "plannedDateTime"),
        origin_actual_date_time: datetime_field(origin, "actualDateTime"),
        destination_planned_date_time: datetime_field(destination, "plannedDateTime"),
        destination_actual_date_time: datetime_field(destination, "actualDateTime"),
        origin_planned_track: stringy_field(origin, "plannedTrack"),
        origin_actual_track: stringy_field(origin, "actualTrack"),
        destination_planned_track: stringy_field(destination, "plannedTrack"),
        destination_actual_track: stringy_field(destination, "actualTrack"),
        stop_count,
        stops,
        cancelled: bool_field(value, "cancelled"),
        journey_detail_ref: str_field(value, "journeyDetailRef"),
    }
}

/// Normalize one intermediate stop. Stop times live under different keys
/// depending on the endpoint generation; a stop with no resolvable time on
/// either side is a non-public pass-through.
pub fn stop_from_json(value: &Value) -> Stop {
    let nested = value.get("stop");
    let name = str_field(value, "name").or_else(|| nested.and_then(|n| str_field(n, "name")));

    Stop {
        name,
        planned_date_time: first_datetime(
            value,
            &[
                "plannedDateTime",
                "plannedDepartureDateTime",
                "plannedArrivalDateTime",
            ],
        ),
        actual_date_time: first_datetime(
            value,
            &[
                "actualDateTime",
                "actualDepartureDateTime",
                "actualArrivalDateTime",
            ],
        ),
        planned_track: stringy_field(value, "plannedTrack")
            .or_else(|| stringy_field(value, "plannedDepartureTrack")),
        actual_track: stringy_field(value, "actualTrack")
            .or_else(|| stringy_field(value, "actualDepartureTrack")),
        cancelled: bool_field(value, "cancelled"),
    }
}

/// Stops of a single journey (train run), for the journey-detail view.
pub fn journey_stops_from_payload(json: &Value) -> Vec<Stop> {
    list_under(json, &["payload", "stops"])
        .iter()
        .map(|v| stop_from_json(v))
        .collect()
}

// ============ Departure / arrival boards ============

pub fn departure_from_json(value: &Value) -> Option<Departure> {
    // A board entry without both a name and a time is unusable.
    let planned = datetime_field(value, "plannedDateTime");
    let actual = datetime_field(value, "actualDateTime");
    let name = str_field(value, "name");
    if name.is_none() && planned.is_none() && actual.is_none() {
        return None;
    }

    let product = value.get("product").unwrap_or(&Value::Null);

    Some(Departure {
        direction: str_field(value, "direction").or_else(|| str_field(value, "origin")),
        name,
        train_category: str_field(value, "trainCategory")
            .or_else(|| str_field(product, "categoryCode")),
        operator: str_field(product, "operatorName"),
        planned_date_time: planned,
        actual_date_time: actual,
        planned_track: stringy_field(value, "plannedTrack"),
        actual_track: stringy_field(value, "actualTrack"),
        cancelled: bool_field(value, "cancelled"),
    })
}

pub fn departures_from_payload(json: &Value, arrivals: bool) -> Vec<Departure> {
    let key = if arrivals { "arrivals" } else { "departures" };
    json.get("payload")
        .and_then(|p| p.get(key))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(departure_from_json).collect())
        .unwrap_or_default()
}

// ============ Disruptions ============

pub fn disruption_from_json(value: &Value) -> Option<Disruption> {
    let id = stringy_field(value, "id")?;
    let disruption_type = str_field(value, "type")
        .and_then(|t| DisruptionType::from_upstream(&t))
        .unwrap_or(DisruptionType::Disruption);

    Some(Disruption {
        id,
        disruption_type,
        title: str_field(value, "title").unwrap_or_default(),
        topic: str_field(value, "topic")
            .or_else(|| value.get("topic").and_then(|t| str_field(t, "label"))),
        is_active: value
            .get("isActive")
            .and_then(Value::as_bool)
            .unwrap_or(true),
    })
}

pub fn disruptions_from_payload(json: &Value) -> Vec<Disruption> {
    list_under(json, &["payload", "disruptions"])
        .iter()
        .filter_map(|v| disruption_from_json(v))
        .collect()
}

/// Find the first array under any of `keys`, or treat the value itself as
/// the list when it already is one.
fn list_under<'a>(json: &'a Value, keys: &[&str]) -> Vec<&'a Value> {
    if let Some(items) = json.as_array() {
        return items.iter().collect();
    }
    for key in keys {
        if let Some(items) = json.get(key).and_then(Value::as_array) {
            return items.iter().collect();
        }
        // One level of nesting, e.g. `payload.stations`.
        if let Some(inner) = json.get(key) {
            for inner_key in keys {
                if let Some(items) = inner.get(inner_key).and_then(Value::as_array) {
                    return items.iter().collect();
                }
            }
        }
    }
    Vec::new()
}
