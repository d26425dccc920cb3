//! Orchestration of the full query pipeline.
//!
//! [`Skill::execute`] is the single inbound surface: it takes an action name
//! and an untyped argument object, runs heuristics → planner → resolver →
//! gateway (cache-checked) → normalization → constraints → recommendation,
//! and always returns a JSON envelope. Failures never escape as Rust errors;
//! they become `kind: "error"` envelopes so the conversational caller can
//! always render something.
//!
//! Envelope kinds:
//!
//! | kind               | produced by                                   |
//! |--------------------|-----------------------------------------------|
//! | `stations` …       | successful action, payload under its own key  |
//! | `missing_required` | planner clarification                         |
//! | `disambiguation`   | resolver returned multiple plausible stations |
//! | `error`            | everything in the error taxonomy              |

use chrono::Local;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::cache::{Cached, ResultCache};
use crate::config::Config;
use crate::constraints::{
    apply_hard_board, apply_hard_disruptions, apply_hard_trips, apply_soft_trips,
    coerce_hard, direct_only_alternatives, filter_window, parse_window, validate_hard_keys,
};
use crate::error::{ErrorCode, SkillError, SkillResult};
use crate::gateway::{GatewayClient, HttpTransport, Transport};
use crate::heuristics;
use crate::models::display_stops;
use crate::normalize;
use crate::planner::{compile, Action, CompileOutcome, Plan};
use crate::resolver::{self, ResolveOptions, Resolution};

const STATIONS_PATH: &str = "nsapp-stations/v2";
const STATIONS_NEAREST_PATH: &str = "nsapp-stations/v2/nearest";
const DEPARTURES_PATH: &str = "reisinformatie-api/api/v2/departures";
const ARRIVALS_PATH: &str = "reisinformatie-api/api/v2/arrivals";
const TRIPS_PATH: &str = "reisinformatie-api/api/v3/trips";
const TRIP_DETAIL_PATH: &str = "reisinformatie-api/api/v3/trips/trip";
const JOURNEY_PATH: &str = "reisinformatie-api/api/v2/journey";
const DISRUPTIONS_PATH: &str = "reisinformatie-api/api/v3/disruptions";

/// The transit skill: one instance per process, shared across queries.
pub struct Skill {
    gateway: GatewayClient,
    cache: ResultCache,
    resolve_options: ResolveOptions,
}

impl Skill {
    /// Production constructor: reqwest transport, key from config or env.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let key = config.gateway.resolve_subscription_key()?;
        let transport = Arc::new(HttpTransport::new()?);
        Skill::with_transport(config, key, transport).map_err(|e| anyhow::anyhow!(e))
    }

    /// Test/embedding constructor with an injected transport.
    pub fn with_transport(
        config: &Config,
        subscription_key: String,
        transport: Arc<dyn Transport>,
    ) -> SkillResult<Self> {
        Ok(Self {
            gateway: GatewayClient::new(&config.gateway, subscription_key, transport)?,
            cache: ResultCache::new(config.gateway.cache_max_ttl_seconds),
            resolve_options: ResolveOptions::from_config(&config.resolver),
        })
    }

    /// Execute one action. Always returns an envelope, never an `Err`.
    pub async fn execute(&self, action: &str, args: Value) -> Value {
        let Some(action) = Action::parse(action) else {
            return SkillError::invalid_input(format!("Unknown action: '{}'", action))
                .to_envelope();
        };

        match self.run(action, args).await {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(code = %err.code, message = %err.message, "pipeline error");
                err.to_envelope()
            }
        }
    }

    /// Free-text entry point: heuristics enrich an empty argument map, then
    /// the result runs as `trips.search`. Missing route parts come back as a
    /// clarification envelope.
    pub async fn ask(&self, free_text: &str) -> Value {
        let today = Local::now().date_naive();
        let args = heuristics::enrich(free_text, &Map::new(), today);
        self.execute("trips.search", Value::Object(args)).await
    }

    async fn run(&self, action: Action, mut args: Value) -> SkillResult<Value> {
        // Free-text intent riding along on a structured call is folded into
        // the argument map before compilation.
        if action == Action::TripsSearch {
            let enriched = args.as_object().and_then(|map| {
                map.get("intent").and_then(Value::as_str).map(|intent| {
                    heuristics::enrich(intent, map, Local::now().date_naive())
                })
            });
            if let Some(enriched) = enriched {
                args = Value::Object(enriched);
            }
        }

        let plan = match compile(action, &args) {
            CompileOutcome::Ok(plan) => plan,
            CompileOutcome::Missing {
                missing,
                clarification,
            } => {
                return Ok(json!({
                    "kind": "missing_required",
                    "missing": missing,
                    "clarification": clarification,
                }));
            }
        };

        // Hard constraints are validated up front so an unsupported key
        // never costs an upstream call.
        validate_hard_keys(&plan.hard, action.result_domain(), action.as_str())?;
        let (hard, dropped) = coerce_hard(&plan.hard);
        if !dropped.is_empty() {
            debug!(keys = ?dropped, "dropped uncoercible hard constraint values");
        }

        match action {
            Action::StationsSearch => self.stations_search(&plan).await,
            Action::StationsNearest => self.stations_nearest(&plan).await,
            Action::DeparturesList | Action::ArrivalsList => {
                self.board(&plan, &hard, action == Action::ArrivalsList).await
            }
            Action::DeparturesWindow => self.departures_window(&plan, &hard).await,
            Action::TripsSearch => self.trips_search(&plan, &hard).await,
            Action::TripsDetail => self.trips_detail(&plan).await,
            Action::JourneyDetail => self.journey_detail(&plan).await,
            Action::DisruptionsList => self.disruptions(&plan, &hard, None).await,
            Action::DisruptionsByStation => self.disruptions_by_station(&plan, &hard).await,
            Action::DisruptionsDetail => self.disruptions_detail(&plan).await,
        }
    }

    /// Cache-checked upstream fetch keyed on the final resolved arguments.
    async fn fetch_cached(
        &self,
        action: &str,
        path: String,
        query: Vec<(String, String)>,
    ) -> SkillResult<Cached> {
        let mut key_args = Map::new();
        for (k, v) in &query {
            key_args.insert(k.clone(), Value::String(v.clone()));
        }
        key_args.insert("path".to_string(), Value::String(path.clone()));

        self.cache
            .get_or_fetch(action, &key_args, || {
                let path = path.clone();
                let query = query.clone();
                async move {
                    let pairs: Vec<(&str, String)> =
                        query.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
                    let response = self.gateway.fetch_json(&path, &pairs).await?;
                    Ok((response.json, response.cache_max_age))
                }
            })
            .await
    }

    /// Resolve a free-text station argument to a station code via the
    /// upstream name search plus the resolver. When the search finds
    /// nothing, an input shaped like a station or UIC code passes through
    /// as a literal code.
    async fn resolve_station(&self, field: &str, text: &str) -> SkillResult<Result<String, Value>> {
        let trimmed = text.trim();

        let query = vec![("q".to_string(), trimmed.to_string())];
        let fetched = self
            .fetch_cached("stations.search", STATIONS_PATH.to_string(), query)
            .await?;
        let candidates = normalize::stations_from_payload(&fetched.value);

        if candidates.is_empty() && resolver::looks_like_station_code(trimmed) {
            debug!(field, code = %trimmed, "station code pass-through");
            return Ok(Ok(trimmed.to_string()));
        }

        match resolver::resolve(trimmed, &candidates, &self.resolve_options) {
            Resolution::Unique(station) => {
                debug!(field, input = %trimmed, code = %station.code, "station resolved");
                Ok(Ok(station.code))
            }
            Resolution::Disambiguate(options) => Ok(Err(json!({
                "kind": "disambiguation",
                "field": field,
                "query": trimmed,
                "options": options,
            }))),
            Resolution::NoMatch => Err(SkillError::invalid_input(format!(
                "No station matching '{}' was found",
                trimmed
            ))),
        }
    }

    // ============ Stations ============

    async fn stations_search(&self, plan: &Plan) -> SkillResult<Value> {
        let mut query = vec![("q".to_string(), arg_string(&plan.args, "query"))];
        push_optional(&mut query, &plan.args, &[("limit", "limit"), ("countryCodes", "countryCodes"), ("lang", "lang")]);

        let fetched = self
            .fetch_cached(plan.action.as_str(), STATIONS_PATH.to_string(), query)
            .await?;
        let stations = normalize::stations_from_payload(&fetched.value);

        Ok(envelope("stations", json!({"stations": stations}), &fetched))
    }

    async fn stations_nearest(&self, plan: &Plan) -> SkillResult<Value> {
        let mut query = vec![
            ("lat".to_string(), arg_string(&plan.args, "lat")),
            ("lng".to_string(), arg_string(&plan.args, "lng")),
        ];
        push_optional(&mut query, &plan.args, &[("limit", "limit")]);

        let fetched = self
            .fetch_cached(plan.action.as_str(), STATIONS_NEAREST_PATH.to_string(), query)
            .await?;
        let stations = normalize::stations_from_payload(&fetched.value);

        Ok(envelope("stations", json!({"stations": stations}), &fetched))
    }

    // ============ Boards ============

    async fn board_query(&self, plan: &Plan) -> SkillResult<Result<Vec<(String, String)>, Value>> {
        let mut query = Vec::new();

        if let Some(uic) = plan.args.get("uicCode").map(value_string) {
            query.push(("uicCode".to_string(), uic));
        } else {
            let station = arg_string(&plan.args, "station");
            match self.resolve_station("station", &station).await? {
                Ok(code) => query.push(("station".to_string(), code)),
                Err(envelope) => return Ok(Err(envelope)),
            }
        }

        push_optional(
            &mut query,
            &plan.args,
            &[("dateTime", "dateTime"), ("maxJourneys", "maxJourneys"), ("lang", "lang")],
        );
        Ok(Ok(query))
    }

    async fn board(
        &self,
        plan: &Plan,
        hard: &Map<String, Value>,
        arrivals: bool,
    ) -> SkillResult<Value> {
        let query = match self.board_query(plan).await? {
            Ok(query) => query,
            Err(reply) => return Ok(reply),
        };

        let path = if arrivals { ARRIVALS_PATH } else { DEPARTURES_PATH };
        let fetched = self
            .fetch_cached(plan.action.as_str(), path.to_string(), query)
            .await?;
        let entries = normalize::departures_from_payload(&fetched.value, arrivals);

        let had_results = !entries.is_empty();
        let outcome = apply_hard_board(&entries, hard);
        if outcome.filtered.is_empty() && had_results && !outcome.applied.is_empty() {
            return Err(SkillError::new(
                ErrorCode::ConstraintNoMatch,
                "No board entries match the given constraints",
            ));
        }

        let kind = if arrivals { "arrivals" } else { "departures" };
        let mut payload = Map::new();
        payload.insert(kind.to_string(), json!(outcome.filtered));
        payload.insert("appliedHard".to_string(), json!(outcome.applied));
        Ok(envelope(kind, Value::Object(payload), &fetched))
    }

    async fn departures_window(
        &self,
        plan: &Plan,
        hard: &Map<String, Value>,
    ) -> SkillResult<Value> {
        let (date, from, to) = parse_window(
            &arg_string(&plan.args, "date"),
            &arg_string(&plan.args, "fromTime"),
            &arg_string(&plan.args, "toTime"),
        )?;

        let mut query = Vec::new();
        if let Some(uic) = plan.args.get("uicCode").map(value_string) {
            query.push(("uicCode".to_string(), uic));
        } else {
            let station = arg_string(&plan.args, "station");
            match self.resolve_station("station", &station).await? {
                Ok(code) => query.push(("station".to_string(), code)),
                Err(reply) => return Ok(reply),
            }
        }
        // Anchor the board at the window start; the window itself is
        // enforced client-side.
        query.push((
            "dateTime".to_string(),
            format!("{}T{}:00", date.format("%Y-%m-%d"), from.format("%H:%M")),
        ));
        push_optional(&mut query, &plan.args, &[("lang", "lang")]);

        let fetched = self
            .fetch_cached(plan.action.as_str(), DEPARTURES_PATH.to_string(), query)
            .await?;
        let entries = normalize::departures_from_payload(&fetched.value, false);
        let windowed = filter_window(entries, date, from, to);
        let outcome = apply_hard_board(&windowed, hard);

        Ok(envelope(
            "departures",
            json!({"departures": outcome.filtered, "appliedHard": outcome.applied}),
            &fetched,
        ))
    }

    // ============ Trips ============

    async fn trips_search(&self, plan: &Plan, hard: &Map<String, Value>) -> SkillResult<Value> {
        let mut query = Vec::new();
        for (field, param) in [("from", "fromStation"), ("to", "toStation"), ("via", "viaStation")] {
            let Some(raw) = plan.args.get(field).map(value_string) else {
                continue;
            };
            match self.resolve_station(field, &raw).await? {
                Ok(code) => query.push((param.to_string(), code)),
                Err(reply) => return Ok(reply),
            }
        }
        push_optional(
            &mut query,
            &plan.args,
            &[
                ("dateTime", "dateTime"),
                ("searchForArrival", "searchForArrival"),
                ("maxJourneys", "maxJourneys"),
                ("lang", "lang"),
            ],
        );

        let fetched = self
            .fetch_cached(plan.action.as_str(), TRIPS_PATH.to_string(), query)
            .await?;
        let trips = normalize::trips_from_payload(&fetched.value);

        let outcome = apply_hard_trips(&trips, hard);
        if outcome.filtered.is_empty() && !outcome.applied.is_empty() && !trips.is_empty() {
            let err = SkillError::new(
                ErrorCode::ConstraintNoMatch,
                "No trips match the given constraints",
            );
            let mut reply = err.to_envelope();
            // A strict directness request still deserves options: the best
            // available trips, labeled, never substituted for the primary
            // (empty) result.
            if plan.request_meta.requested_direct_only {
                if let Some(alternatives) = direct_only_alternatives(&trips) {
                    reply["directOnlyAlternatives"] = json!(alternatives);
                }
            }
            return Ok(reply);
        }

        let ranked = apply_soft_trips(outcome.filtered, &plan.rank_by);
        let recommended = crate::recommend::pick_recommended(&ranked.ordered);

        Ok(envelope(
            "trips",
            json!({
                "trips": ranked.ordered,
                "recommendedIndex": recommended,
                "appliedHard": outcome.applied,
                "appliedSoft": ranked.applied,
                "requestMeta": plan.request_meta,
            }),
            &fetched,
        ))
    }

    async fn trips_detail(&self, plan: &Plan) -> SkillResult<Value> {
        let mut query = vec![("ctxRecon".to_string(), arg_string(&plan.args, "ctxRecon"))];
        push_optional(&mut query, &plan.args, &[("lang", "lang")]);

        let fetched = self
            .fetch_cached(plan.action.as_str(), TRIP_DETAIL_PATH.to_string(), query)
            .await?;
        let trip = normalize::trip_from_json(&fetched.value).ok_or_else(|| {
            SkillError::invalid_response("Trip detail response had no recognizable trip")
        })?;

        Ok(envelope("trip", json!({"trip": trip}), &fetched))
    }

    async fn journey_detail(&self, plan: &Plan) -> SkillResult<Value> {
        let mut query = Vec::new();
        push_optional(
            &mut query,
            &plan.args,
            &[("train", "train"), ("id", "id"), ("lang", "lang")],
        );

        let fetched = self
            .fetch_cached(plan.action.as_str(), JOURNEY_PATH.to_string(), query)
            .await?;
        let stops = normalize::journey_stops_from_payload(&fetched.value);
        let shown = display_stops(&stops);

        Ok(envelope(
            "journey",
            json!({"stops": shown, "totalStops": stops.len()}),
            &fetched,
        ))
    }

    // ============ Disruptions ============

    async fn disruptions(
        &self,
        plan: &Plan,
        hard: &Map<String, Value>,
        path_suffix: Option<String>,
    ) -> SkillResult<Value> {
        let path = match path_suffix {
            Some(suffix) => format!("{}/{}", DISRUPTIONS_PATH, suffix),
            None => DISRUPTIONS_PATH.to_string(),
        };

        let mut query = Vec::new();
        push_optional(
            &mut query,
            &plan.args,
            &[("isActive", "isActive"), ("type", "type"), ("lang", "lang")],
        );

        let fetched = self
            .fetch_cached(plan.action.as_str(), path, query)
            .await?;
        let disruptions = normalize::disruptions_from_payload(&fetched.value);
        let outcome = apply_hard_disruptions(&disruptions, hard);

        Ok(envelope(
            "disruptions",
            json!({"disruptions": outcome.filtered, "appliedHard": outcome.applied}),
            &fetched,
        ))
    }

    async fn disruptions_by_station(
        &self,
        plan: &Plan,
        hard: &Map<String, Value>,
    ) -> SkillResult<Value> {
        let station = arg_string(&plan.args, "station");
        let code = match self.resolve_station("station", &station).await? {
            Ok(code) => code,
            Err(reply) => return Ok(reply),
        };
        self.disruptions(plan, hard, Some(format!("station/{}", code)))
            .await
    }

    async fn disruptions_detail(&self, plan: &Plan) -> SkillResult<Value> {
        let id = arg_string(&plan.args, "id");
        let path = format!("{}/{}", DISRUPTIONS_PATH, id);

        let mut query = Vec::new();
        push_optional(&mut query, &plan.args, &[("lang", "lang")]);

        let fetched = self
            .fetch_cached(plan.action.as_str(), path, query)
            .await?;
        let disruption = normalize::disruption_from_json(&fetched.value).ok_or_else(|| {
            SkillError::invalid_response("Disruption detail response had no recognizable record")
        })?;

        Ok(envelope("disruption", json!({"disruption": disruption}), &fetched))
    }
}

/// Wrap an action payload with the shared envelope fields.
fn envelope(kind: &str, payload: Value, fetched: &Cached) -> Value {
    let mut body = json!({
        "kind": kind,
        "cached": fetched.cached,
    });
    if let Some(ttl) = fetched.ttl_seconds {
        body["ttlSeconds"] = json!(ttl);
    }
    if let (Some(target), Some(source)) = (body.as_object_mut(), payload.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    body
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn arg_string(args: &Map<String, Value>, key: &str) -> String {
    args.get(key).map(value_string).unwrap_or_default()
}

/// Copy optional arguments into the upstream query under their wire names.
fn push_optional(
    query: &mut Vec<(String, String)>,
    args: &Map<String, Value>,
    mapping: &[(&str, &str)],
) {
    for (field, param) in mapping {
        if let Some(value) = args.get(*field) {
            query.push(((*param).to_string(), value_string(value)));
        }
    }
}
