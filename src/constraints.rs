//! Hard (filtering) and soft (ranking) constraint application.
//!
//! Hard constraints are a contract: an unsupported key for the action's
//! result domain fails the whole request with `invalid_tool_input`. Soft
//! constraints are a hint: unknown rank keys are skipped. Scalar values
//! arriving as strings (tool-calling models routinely stringify booleans
//! and numbers) are coerced first; a value that cannot be coerced drops
//! that single key rather than the whole request.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{SkillError, SkillResult};
use crate::models::{Departure, Disruption, TripSummary};

/// Which result shape an action produces, for hard-key support checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultDomain {
    Trips,
    Board,
    Disruptions,
    /// Actions whose results support no hard constraints at all.
    None,
}

impl ResultDomain {
    pub fn supported_hard_keys(&self) -> &'static [&'static str] {
        match self {
            ResultDomain::Trips => &[
                "directOnly",
                "maxTransfers",
                "maxDurationMinutes",
                "includeModes",
                "excludeModes",
                "includeOperators",
            ],
            ResultDomain::Board => &["excludeCancelled", "platformEquals"],
            ResultDomain::Disruptions => &["disruptionTypes", "activeOnly"],
            ResultDomain::None => &[],
        }
    }
}

/// Reject any hard key the action's result domain does not support.
pub fn validate_hard_keys(
    hard: &Map<String, Value>,
    domain: ResultDomain,
    action_name: &str,
) -> SkillResult<()> {
    let supported = domain.supported_hard_keys();
    for key in hard.keys() {
        if !supported.contains(&key.as_str()) {
            return Err(SkillError::invalid_input(format!(
                "Hard constraint '{}' is not supported for {}",
                key, action_name
            ))
            .with_details(json!({"supported": supported})));
        }
    }
    Ok(())
}

// ============ Coercion ============

#[derive(Debug, Clone, Copy)]
enum ExpectedType {
    Bool,
    UInt,
    Text,
    TextList,
}

fn expected_type(key: &str) -> ExpectedType {
    match key {
        "directOnly" | "excludeCancelled" | "activeOnly" => ExpectedType::Bool,
        "maxTransfers" | "maxDurationMinutes" => ExpectedType::UInt,
        "platformEquals" => ExpectedType::Text,
        _ => ExpectedType::TextList,
    }
}

fn coerce_value(value: &Value, expected: ExpectedType) -> Option<Value> {
    match expected {
        ExpectedType::Bool => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
            _ => None,
        },
        ExpectedType::UInt => match value {
            Value::Number(n) if n.as_u64().is_some() => Some(value.clone()),
            Value::String(s) => s.trim().parse::<u64>().ok().map(|n| json!(n)),
            _ => None,
        },
        ExpectedType::Text => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
        ExpectedType::TextList => match value {
            Value::Array(items) => {
                let texts: Vec<Value> = items
                    .iter()
                    .filter(|v| v.is_string())
                    .cloned()
                    .collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(Value::Array(texts))
                }
            }
            Value::String(s) => {
                let parts: Vec<Value> = s
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| Value::String(p.to_string()))
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(Value::Array(parts))
                }
            }
            _ => None,
        },
    }
}

/// Coerce every hard value to its expected type. Keys whose values cannot
/// be coerced are dropped (and reported back for logging), never escalated.
pub fn coerce_hard(hard: &Map<String, Value>) -> (Map<String, Value>, Vec<String>) {
    let mut coerced = Map::new();
    let mut dropped = Vec::new();

    for (key, value) in hard {
        match coerce_value(value, expected_type(key)) {
            Some(clean) => {
                coerced.insert(key.clone(), clean);
            }
            None => {
                debug!(key = %key, "dropping uncoercible hard constraint value");
                dropped.push(key.clone());
            }
        }
    }

    (coerced, dropped)
}

// ============ Hard filters ============

/// Result of applying hard filters: the surviving rows plus the keys that
/// actually filtered. All supported keys that were present are reported.
#[derive(Debug, Clone)]
pub struct HardOutcome<T> {
    pub filtered: Vec<T>,
    pub applied: Vec<String>,
}

fn text_set(hard: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    hard.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_lowercase)
            .collect()
    })
}

/// Effective transfer ceiling: `directOnly: true` and `maxTransfers` are
/// normalized to one predicate (a `maxTransfers` of 0 is direct-only).
fn effective_max_transfers(hard: &Map<String, Value>) -> Option<u32> {
    let direct_only = hard
        .get("directOnly")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let max_transfers = hard
        .get("maxTransfers")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());

    if direct_only {
        Some(0)
    } else {
        max_transfers
    }
}

pub fn apply_hard_trips(
    trips: &[TripSummary],
    hard: &Map<String, Value>,
) -> HardOutcome<TripSummary> {
    let mut applied = Vec::new();

    let max_transfers = effective_max_transfers(hard);
    if hard.contains_key("directOnly") {
        applied.push("directOnly".to_string());
    }
    if hard.contains_key("maxTransfers") {
        applied.push("maxTransfers".to_string());
    }

    let max_duration = hard
        .get("maxDurationMinutes")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok());
    if max_duration.is_some() {
        applied.push("maxDurationMinutes".to_string());
    }

    let include_modes = text_set(hard, "includeModes");
    if include_modes.is_some() {
        applied.push("includeModes".to_string());
    }
    let exclude_modes = text_set(hard, "excludeModes");
    if exclude_modes.is_some() {
        applied.push("excludeModes".to_string());
    }
    let include_operators = text_set(hard, "includeOperators");
    if include_operators.is_some() {
        applied.push("includeOperators".to_string());
    }

    let filtered = trips
        .iter()
        .filter(|trip| {
            if let Some(ceiling) = max_transfers {
                if trip.transfers > ceiling {
                    return false;
                }
            }
            if let Some(ceiling) = max_duration {
                match trip.duration_minutes() {
                    Some(minutes) if minutes <= ceiling => {}
                    _ => return false,
                }
            }
            if let Some(modes) = &include_modes {
                let all_included = trip.legs.iter().all(|leg| {
                    leg.mode
                        .as_deref()
                        .map(|m| modes.contains(&m.to_lowercase()))
                        .unwrap_or(false)
                });
                if !all_included {
                    return false;
                }
            }
            if let Some(modes) = &exclude_modes {
                let any_excluded = trip.legs.iter().any(|leg| {
                    leg.mode
                        .as_deref()
                        .map(|m| modes.contains(&m.to_lowercase()))
                        .unwrap_or(false)
                });
                if any_excluded {
                    return false;
                }
            }
            if let Some(operators) = &include_operators {
                let all_included = trip.legs.iter().all(|leg| {
                    leg.operator
                        .as_deref()
                        .map(|o| operators.contains(&o.to_lowercase()))
                        .unwrap_or(false)
                });
                if !all_included {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    HardOutcome { filtered, applied }
}

pub fn apply_hard_board(
    board: &[Departure],
    hard: &Map<String, Value>,
) -> HardOutcome<Departure> {
    let mut applied = Vec::new();

    let exclude_cancelled = hard
        .get("excludeCancelled")
        .and_then(Value::as_bool);
    if exclude_cancelled.is_some() {
        applied.push("excludeCancelled".to_string());
    }

    let platform = hard
        .get("platformEquals")
        .and_then(Value::as_str)
        .map(str::to_string);
    if platform.is_some() {
        applied.push("platformEquals".to_string());
    }

    let filtered = board
        .iter()
        .filter(|entry| {
            if exclude_cancelled == Some(true) && entry.cancelled {
                return false;
            }
            if let Some(wanted) = &platform {
                match entry.track() {
                    Some(track) if track.eq_ignore_ascii_case(wanted) => {}
                    _ => return false,
                }
            }
            true
        })
        .cloned()
        .collect();

    HardOutcome { filtered, applied }
}

pub fn apply_hard_disruptions(
    disruptions: &[Disruption],
    hard: &Map<String, Value>,
) -> HardOutcome<Disruption> {
    let mut applied = Vec::new();

    let types = text_set(hard, "disruptionTypes");
    if types.is_some() {
        applied.push("disruptionTypes".to_string());
    }

    let active_only = hard.get("activeOnly").and_then(Value::as_bool);
    if active_only.is_some() {
        applied.push("activeOnly".to_string());
    }

    let filtered = disruptions
        .iter()
        .filter(|d| {
            if let Some(types) = &types {
                if !types.contains(&d.disruption_type.as_str().to_lowercase()) {
                    return false;
                }
            }
            if active_only == Some(true) && !d.is_active {
                return false;
            }
            true
        })
        .cloned()
        .collect();

    HardOutcome { filtered, applied }
}

// ============ Direct-only alternatives ============

/// Fallback shown when a strict no-transfer filter matched nothing: the
/// same upstream set re-filtered at the smallest transfer count that still
/// yields at least one trip. Always a separate labeled block, never
/// substituted into the primary list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectOnlyAlternatives {
    pub max_transfers: u32,
    pub trips: Vec<TripSummary>,
}

pub fn direct_only_alternatives(unfiltered: &[TripSummary]) -> Option<DirectOnlyAlternatives> {
    let min_transfers = unfiltered.iter().map(|t| t.transfers).min()?;
    let trips: Vec<TripSummary> = unfiltered
        .iter()
        .filter(|t| t.transfers <= min_transfers)
        .cloned()
        .collect();
    Some(DirectOnlyAlternatives {
        max_transfers: min_transfers,
        trips,
    })
}

// ============ Soft ranking ============

#[derive(Debug, Clone)]
pub struct SoftOutcome<T> {
    pub ordered: Vec<T>,
    pub applied: Vec<String>,
}

/// Rank keys the engine understands; anything else is a skipped hint.
const KNOWN_RANK_KEYS: &[&str] = &["fastest", "fewest_transfers"];

/// Lexicographic stable sort over the rank keys in priority order.
pub fn apply_soft_trips(mut trips: Vec<TripSummary>, rank_by: &[String]) -> SoftOutcome<TripSummary> {
    let applied: Vec<String> = rank_by
        .iter()
        .filter(|key| KNOWN_RANK_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();

    if !applied.is_empty() {
        trips.sort_by(|a, b| {
            for key in &applied {
                let ordering = match key.as_str() {
                    "fastest" => a
                        .duration_minutes()
                        .unwrap_or(u32::MAX)
                        .cmp(&b.duration_minutes().unwrap_or(u32::MAX)),
                    "fewest_transfers" => a.transfers.cmp(&b.transfers),
                    _ => std::cmp::Ordering::Equal,
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    SoftOutcome {
        ordered: trips,
        applied,
    }
}

// ============ Departure windows ============

pub fn parse_window(
    date: &str,
    from_time: &str,
    to_time: &str,
) -> SkillResult<(NaiveDate, NaiveTime, NaiveTime)> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| SkillError::invalid_input(format!("Invalid date '{}': expected YYYY-MM-DD", date)))?;
    let from = NaiveTime::parse_from_str(from_time, "%H:%M")
        .map_err(|_| SkillError::invalid_input(format!("Invalid fromTime '{}': expected HH:MM", from_time)))?;
    let to = NaiveTime::parse_from_str(to_time, "%H:%M")
        .map_err(|_| SkillError::invalid_input(format!("Invalid toTime '{}': expected HH:MM", to_time)))?;
    if from >= to {
        return Err(SkillError::invalid_input(
            "fromTime must be before toTime",
        ));
    }
    Ok((date, from, to))
}

/// Keep board entries whose (actual, else planned) time falls in the
/// half-open window `[from, to)` on `date`. Entries without a usable time
/// are dropped.
pub fn filter_window(
    board: Vec<Departure>,
    date: NaiveDate,
    from: NaiveTime,
    to: NaiveTime,
) -> Vec<Departure> {
    board
        .into_iter()
        .filter(|entry| match entry.time() {
            Some(t) => t.date_naive() == date && t.time() >= from && t.time() < to,
            None => false,
        })
        .collect()
}
