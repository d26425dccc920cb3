//! Compilation of a parsed intent into an allow-listed upstream plan.
//!
//! The planner is deliberately tolerant about *extra* argument keys (model
//! generated tool calls routinely over-specify; unknown keys are dropped,
//! not rejected) and strict about *missing required* ones, which become a
//! structured clarification request instead of an error. This is the
//! opposite philosophy from the constraint engine, which hard-fails unknown
//! constraint keys — the two boundaries are intentionally different.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::constraints::ResultDomain;

/// Every inbound action this skill can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    StationsSearch,
    StationsNearest,
    DeparturesList,
    DeparturesWindow,
    ArrivalsList,
    TripsSearch,
    TripsDetail,
    JourneyDetail,
    DisruptionsList,
    DisruptionsByStation,
    DisruptionsDetail,
}

impl Action {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "stations.search" => Some(Action::StationsSearch),
            "stations.nearest" => Some(Action::StationsNearest),
            "departures.list" => Some(Action::DeparturesList),
            "departures.window" => Some(Action::DeparturesWindow),
            "arrivals.list" => Some(Action::ArrivalsList),
            "trips.search" => Some(Action::TripsSearch),
            "trips.detail" => Some(Action::TripsDetail),
            "journey.detail" => Some(Action::JourneyDetail),
            "disruptions.list" => Some(Action::DisruptionsList),
            "disruptions.by_station" => Some(Action::DisruptionsByStation),
            "disruptions.detail" => Some(Action::DisruptionsDetail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::StationsSearch => "stations.search",
            Action::StationsNearest => "stations.nearest",
            Action::DeparturesList => "departures.list",
            Action::DeparturesWindow => "departures.window",
            Action::ArrivalsList => "arrivals.list",
            Action::TripsSearch => "trips.search",
            Action::TripsDetail => "trips.detail",
            Action::JourneyDetail => "journey.detail",
            Action::DisruptionsList => "disruptions.list",
            Action::DisruptionsByStation => "disruptions.by_station",
            Action::DisruptionsDetail => "disruptions.detail",
        }
    }

    /// Argument keys this action accepts. Anything else the caller sends is
    /// dropped. `hard` and `soft` are handled separately and never travel
    /// upstream.
    pub fn allowed_args(&self) -> &'static [&'static str] {
        match self {
            Action::StationsSearch => &["query", "limit", "countryCodes", "lang"],
            Action::StationsNearest => &["lat", "lng", "limit"],
            Action::DeparturesList | Action::ArrivalsList => {
                &["station", "uicCode", "dateTime", "maxJourneys", "lang"]
            }
            Action::DeparturesWindow => {
                &["station", "uicCode", "date", "fromTime", "toTime", "lang"]
            }
            Action::TripsSearch => &[
                "from",
                "to",
                "via",
                "dateTime",
                "searchForArrival",
                "maxJourneys",
                "lang",
                "intent",
            ],
            Action::TripsDetail => &["ctxRecon", "lang"],
            Action::JourneyDetail => &["train", "id", "lang"],
            Action::DisruptionsList => &["isActive", "type", "lang"],
            Action::DisruptionsByStation => &["station", "lang"],
            Action::DisruptionsDetail => &["id", "lang"],
        }
    }

    /// Which result domain hard constraints are checked against.
    pub fn result_domain(&self) -> ResultDomain {
        match self {
            Action::TripsSearch => ResultDomain::Trips,
            Action::DeparturesList | Action::DeparturesWindow | Action::ArrivalsList => {
                ResultDomain::Board
            }
            Action::DisruptionsList | Action::DisruptionsByStation => ResultDomain::Disruptions,
            _ => ResultDomain::None,
        }
    }
}

/// What downstream layers need to know about the caller's original request,
/// recorded verbatim before any filtering or coercion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    pub requested_hard_keys: Vec<String>,
    pub requested_direct_only: bool,
}

/// The fully resolved, allow-listed instruction for the gateway. Built once
/// per query, never stored.
#[derive(Debug, Clone)]
pub struct Plan {
    pub action: Action,
    pub args: Map<String, Value>,
    pub hard: Map<String, Value>,
    pub rank_by: Vec<String>,
    pub request_meta: RequestMeta,
}

/// Planner result: a plan, or a clarification request for the end user.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Ok(Plan),
    Missing {
        missing: Vec<String>,
        clarification: String,
    },
}

pub fn compile(action: Action, raw_args: &Value) -> CompileOutcome {
    let Some(input) = raw_args.as_object() else {
        // Malformed intent shape: ask for a rephrase instead of surfacing a
        // raw validation error.
        return CompileOutcome::Missing {
            missing: vec!["args".to_string()],
            clarification: "I could not read that request. Could you rephrase what trip or \
                            station you are asking about?"
                .to_string(),
        };
    };

    let hard = input
        .get("hard")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let rank_by = input
        .get("soft")
        .and_then(|s| s.get("rankBy"))
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let request_meta = RequestMeta {
        requested_hard_keys: hard.keys().cloned().collect(),
        requested_direct_only: requested_direct_only(&hard),
    };

    // Allow-list: keep known keys, drop the rest silently.
    let mut args = Map::new();
    for key in action.allowed_args() {
        if let Some(value) = input.get(*key) {
            if !value.is_null() {
                args.insert((*key).to_string(), value.clone());
            }
        }
    }

    let missing = missing_fields(action, &args);
    if !missing.is_empty() {
        let clarification = clarification_for(action, &missing);
        return CompileOutcome::Missing {
            missing,
            clarification,
        };
    }

    CompileOutcome::Ok(Plan {
        action,
        args,
        hard,
        rank_by,
        request_meta,
    })
}

fn requested_direct_only(hard: &Map<String, Value>) -> bool {
    let direct_only = match hard.get("directOnly") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let zero_transfers = match hard.get("maxTransfers") {
        Some(Value::Number(n)) => n.as_u64() == Some(0),
        Some(Value::String(s)) => s.trim() == "0",
        _ => false,
    };
    direct_only || zero_transfers
}

fn has_nonempty(args: &Map<String, Value>, key: &str) -> bool {
    match args.get(key) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

fn missing_fields(action: Action, args: &Map<String, Value>) -> Vec<String> {
    let mut missing = Vec::new();
    fn need_in(args: &Map<String, Value>, missing: &mut Vec<String>, field: &str) {
        if !has_nonempty(args, field) {
            missing.push(field.to_string());
        }
    }

    match action {
        Action::StationsSearch => need_in(args, &mut missing, "query"),
        Action::StationsNearest => {
            need_in(args, &mut missing, "lat");
            need_in(args, &mut missing, "lng");
        }
        Action::DeparturesList | Action::ArrivalsList => {
            if !has_nonempty(args, "station") && !has_nonempty(args, "uicCode") {
                missing.push("station".to_string());
            }
        }
        Action::DeparturesWindow => {
            if !has_nonempty(args, "station") && !has_nonempty(args, "uicCode") {
                missing.push("station".to_string());
            }
            need_in(args, &mut missing, "date");
            need_in(args, &mut missing, "fromTime");
            need_in(args, &mut missing, "toTime");
        }
        Action::TripsSearch => {
            need_in(args, &mut missing, "from");
            need_in(args, &mut missing, "to");
        }
        Action::TripsDetail => need_in(args, &mut missing, "ctxRecon"),
        Action::JourneyDetail => {
            if !has_nonempty(args, "train") && !has_nonempty(args, "id") {
                missing.push("train".to_string());
            }
        }
        Action::DisruptionsList => {}
        Action::DisruptionsByStation => need_in(args, &mut missing, "station"),
        Action::DisruptionsDetail => need_in(args, &mut missing, "id"),
    }

    missing
}

fn clarification_for(action: Action, missing: &[String]) -> String {
    let fields = missing.join(", ");
    match action {
        Action::TripsSearch => format!(
            "To plan a trip I still need: {}. Where are you travelling from and to?",
            fields
        ),
        Action::DeparturesWindow => format!(
            "To list departures in a window I still need: {}.",
            fields
        ),
        Action::StationsSearch => {
            "Which station should I search for?".to_string()
        }
        _ => format!("I still need: {}.", fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_keys_dropped_not_rejected() {
        let args = json!({
            "from": "ASD",
            "to": "UT",
            "temperature": 0.7,
            "tool_call_id": "abc"
        });
        match compile(Action::TripsSearch, &args) {
            CompileOutcome::Ok(plan) => {
                assert!(plan.args.contains_key("from"));
                assert!(!plan.args.contains_key("temperature"));
                assert!(!plan.args.contains_key("tool_call_id"));
            }
            other => panic!("expected a plan, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_is_structured() {
        let args = json!({"from": "ASD"});
        match compile(Action::TripsSearch, &args) {
            CompileOutcome::Missing {
                missing,
                clarification,
            } => {
                assert_eq!(missing, vec!["to".to_string()]);
                assert!(clarification.contains("to"));
            }
            other => panic!("expected missing outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_window_requires_complete_window() {
        let args = json!({"station": "ASD", "fromTime": "18:00"});
        match compile(Action::DeparturesWindow, &args) {
            CompileOutcome::Missing { missing, .. } => {
                assert_eq!(missing, vec!["date".to_string(), "toTime".to_string()]);
            }
            other => panic!("expected missing outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_args_ask_for_rephrase() {
        match compile(Action::TripsSearch, &json!("just a string")) {
            CompileOutcome::Missing { missing, .. } => {
                assert_eq!(missing, vec!["args".to_string()]);
            }
            other => panic!("expected missing outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_request_meta_recorded_verbatim() {
        let args = json!({
            "from": "ASD",
            "to": "UT",
            "hard": {"maxTransfers": "0", "maxDurationMinutes": 90}
        });
        match compile(Action::TripsSearch, &args) {
            CompileOutcome::Ok(plan) => {
                assert!(plan.request_meta.requested_direct_only);
                assert_eq!(
                    plan.request_meta.requested_hard_keys,
                    vec![
                        "maxDurationMinutes".to_string(),
                        "maxTransfers".to_string(),
                    ]
                );
            }
            other => panic!("expected a plan, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_query_counts_as_missing() {
        let args = json!({"query": "   "});
        assert!(matches!(
            compile(Action::StationsSearch, &args),
            CompileOutcome::Missing { .. }
        ));
    }
}
