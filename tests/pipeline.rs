//! End-to-end pipeline tests driving [`Skill`] through a scripted transport.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spoorgids::config::{Config, GatewayConfig, ResolverConfig};
use spoorgids::gateway::{RawResponse, Transport};
use spoorgids::Skill;

/// Replays a scripted sequence of transport outcomes and records every URL
/// it was asked for.
struct MockTransport {
    responses: Mutex<VecDeque<Result<RawResponse, String>>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    fn new(responses: Vec<Result<RawResponse, String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<RawResponse, String> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}

fn ok(body: Value, max_age: Option<u64>) -> Result<RawResponse, String> {
    Ok(RawResponse {
        status: 200,
        body: body.to_string(),
        cache_control: max_age.map(|age| format!("max-age={}", age)),
    })
}

fn http(status: u16, body: Value) -> Result<RawResponse, String> {
    Ok(RawResponse {
        status,
        body: body.to_string(),
        cache_control: None,
    })
}

fn network_error() -> Result<RawResponse, String> {
    Err("connection refused".to_string())
}

fn config() -> Config {
    Config {
        gateway: GatewayConfig {
            base_urls: vec!["https://gateway.test".to_string()],
            timeout_ms: 1000,
            subscription_key: None,
            cache_max_ttl_seconds: 300,
        },
        resolver: ResolverConfig::default(),
    }
}

fn skill(transport: Arc<MockTransport>) -> Skill {
    Skill::with_transport(&config(), "test-key".to_string(), transport).unwrap()
}

/// An empty station search result: the precondition for code pass-through.
fn empty_stations() -> Value {
    json!({"payload": []})
}

fn stations_payload() -> Value {
    json!({
        "payload": [
            {"id": {"code": "ASD", "uicCode": "8400058"}, "names": {"long": "Amsterdam Centraal"}},
            {"id": {"code": "ASDZ"}, "names": {"long": "Amsterdam Zuid"}}
        ]
    })
}

fn trips_payload() -> Value {
    json!({
        "trips": [
            {"uid": "one-change", "transfers": 1, "plannedDurationInMinutes": 40, "legs": []},
            {"uid": "two-changes", "transfers": 2, "plannedDurationInMinutes": 35, "legs": []}
        ]
    })
}

#[tokio::test]
async fn network_error_retried_once_then_succeeds() {
    let transport = MockTransport::new(vec![
        network_error(),
        ok(stations_payload(), None),
    ]);
    let skill = skill(transport.clone());

    let envelope = skill
        .execute("stations.search", json!({"query": "amsterdam"}))
        .await;

    assert_eq!(envelope["kind"], "stations");
    assert_eq!(envelope["stations"].as_array().unwrap().len(), 2);
    // One failed attempt plus the same-mirror retry: exactly two calls.
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn client_error_never_retried() {
    let transport = MockTransport::new(vec![http(404, json!({"message": "unknown station"}))]);
    let skill = skill(transport.clone());

    let envelope = skill
        .execute("stations.search", json!({"query": "nergens"}))
        .await;

    assert_eq!(envelope["kind"], "error");
    assert_eq!(envelope["error"]["code"], "upstream_http_error");
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn cached_response_identical_except_cached_flag() {
    let transport = MockTransport::new(vec![ok(stations_payload(), Some(60))]);
    let skill = skill(transport.clone());
    let args = json!({"query": "amsterdam"});

    let first = skill.execute("stations.search", args.clone()).await;
    let second = skill.execute("stations.search", args).await;

    assert_eq!(first["cached"], false);
    assert_eq!(second["cached"], true);
    assert_eq!(first["ttlSeconds"], 60);

    let mut first_rest = first.clone();
    let mut second_rest = second.clone();
    first_rest.as_object_mut().unwrap().remove("cached");
    second_rest.as_object_mut().unwrap().remove("cached");
    assert_eq!(first_rest, second_rest);

    // The second execution never reached the transport.
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn unsupported_hard_key_fails_before_any_upstream_call() {
    let transport = MockTransport::new(vec![]);
    let skill = skill(transport.clone());

    let envelope = skill
        .execute(
            "stations.search",
            json!({"query": "utrecht", "hard": {"directOnly": true}}),
        )
        .await;

    assert_eq!(envelope["kind"], "error");
    assert_eq!(envelope["error"]["code"], "invalid_tool_input");
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn direct_only_with_no_direct_trips_returns_alternatives() {
    let transport = MockTransport::new(vec![
        ok(empty_stations(), None), // "ASD" name search
        ok(empty_stations(), None), // "UT" name search
        ok(trips_payload(), None),
    ]);
    let skill = skill(transport.clone());

    let envelope = skill
        .execute(
            "trips.search",
            json!({"from": "ASD", "to": "UT", "hard": {"directOnly": true}}),
        )
        .await;

    assert_eq!(envelope["kind"], "error");
    assert_eq!(envelope["error"]["code"], "constraint_no_match");

    // The alternatives block re-filters at the smallest transfer count
    // actually present, never replacing the (empty) primary result.
    let alternatives = &envelope["directOnlyAlternatives"];
    assert_eq!(alternatives["maxTransfers"], 1);
    let trips = alternatives["trips"].as_array().unwrap();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0]["uid"], "one-change");
}

#[tokio::test]
async fn departures_window_is_half_open() {
    let board = json!({
        "payload": {
            "departures": [
                {"name": "too early", "plannedDateTime": "2026-03-01T17:50:00+0100"},
                {"name": "at start", "plannedDateTime": "2026-03-01T18:00:00+0100"},
                {"name": "inside", "plannedDateTime": "2026-03-01T18:40:00+0100"},
                {"name": "at end", "plannedDateTime": "2026-03-01T19:00:00+0100"}
            ]
        }
    });
    let transport = MockTransport::new(vec![
        ok(empty_stations(), None), // "ASD" name search
        ok(board, None),
    ]);
    let skill = skill(transport);

    let envelope = skill
        .execute(
            "departures.window",
            json!({
                "station": "ASD",
                "date": "2026-03-01",
                "fromTime": "18:00",
                "toTime": "19:00"
            }),
        )
        .await;

    assert_eq!(envelope["kind"], "departures");
    let names: Vec<&str> = envelope["departures"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["at start", "inside"]);
}

#[tokio::test]
async fn ambiguous_station_name_asks_for_disambiguation() {
    let transport = MockTransport::new(vec![ok(stations_payload(), None)]);
    let skill = skill(transport.clone());

    let envelope = skill
        .execute("trips.search", json!({"from": "Amsterdam", "to": "UT"}))
        .await;

    assert_eq!(envelope["kind"], "disambiguation");
    assert_eq!(envelope["field"], "from");
    let options = envelope["options"].as_array().unwrap();
    assert_eq!(options.len(), 2);
    assert!(options[0]["confidence"].as_f64().unwrap() >= options[1]["confidence"].as_f64().unwrap());

    // Only the station search went upstream; no trip search was attempted.
    assert_eq!(transport.call_count(), 1);
    assert!(transport.calls()[0].contains("nsapp-stations"));
}

#[tokio::test]
async fn station_codes_pass_through_when_name_search_is_empty() {
    let transport = MockTransport::new(vec![
        ok(empty_stations(), None), // "ASD" name search
        ok(empty_stations(), None), // "8400621" name search
        ok(trips_payload(), None),
    ]);
    let skill = skill(transport.clone());

    let envelope = skill
        .execute("trips.search", json!({"from": "ASD", "to": "8400621"}))
        .await;

    assert_eq!(envelope["kind"], "trips");
    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[2].contains("fromStation=ASD"));
    assert!(calls[2].contains("toStation=8400621"));
}

#[tokio::test]
async fn missing_route_fields_become_a_clarification() {
    let transport = MockTransport::new(vec![]);
    let skill = skill(transport.clone());

    let envelope = skill
        .execute("trips.search", json!({"from": "ASD"}))
        .await;

    assert_eq!(envelope["kind"], "missing_required");
    assert_eq!(envelope["missing"], json!(["to"]));
    assert!(envelope["clarification"].as_str().unwrap().contains("to"));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn soft_ranking_and_recommendation_reported() {
    let transport = MockTransport::new(vec![
        ok(empty_stations(), None), // "ASD" name search
        ok(empty_stations(), None), // "UT" name search
        ok(trips_payload(), None),
    ]);
    let skill = skill(transport);

    let envelope = skill
        .execute(
            "trips.search",
            json!({"from": "ASD", "to": "UT", "soft": {"rankBy": ["fastest"]}}),
        )
        .await;

    assert_eq!(envelope["kind"], "trips");
    assert_eq!(envelope["appliedSoft"], json!(["fastest"]));
    let trips = envelope["trips"].as_array().unwrap();
    // Ranked fastest-first, but the recommendation still prefers fewer
    // transfers over raw speed.
    assert_eq!(trips[0]["uid"], "two-changes");
    assert_eq!(envelope["recommendedIndex"], 1);
}

#[tokio::test]
async fn unknown_action_is_a_renderable_error() {
    let transport = MockTransport::new(vec![]);
    let skill = skill(transport);

    let envelope = skill.execute("trains.teleport", json!({})).await;
    assert_eq!(envelope["kind"], "error");
    assert_eq!(envelope["error"]["code"], "invalid_tool_input");
}
