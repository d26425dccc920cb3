//! Route and time heuristics over free-form Dutch query text.
//!
//! `enrich` is a pure function: it reads the text, fills gaps in the
//! caller's argument map, and never performs I/O or consults a clock (the
//! reference date is injected). Every merge is additive — an explicit
//! caller-supplied value always wins over anything extracted here.

use chrono::{Duration, NaiveDate, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

lazy_static! {
    /// "van X naar Y", capturing the two station segments.
    static ref ROUTE_RE: Regex =
        Regex::new(r"(?i)\bvan\s+(.+?)\s+naar\s+(.+?)(?:[,.?!]|$)").unwrap();
    /// Trailing date/time clause to trim off a station segment.
    static ref TIME_CLAUSE_RE: Regex = Regex::new(
        r"(?i)\s+(vandaag|morgen|overmorgen|vanochtend|vanmiddag|vanavond|om\s+\d{1,2}(:\d{2})?|rond\s+\d{1,2}(:\d{2})?)\b.*$"
    )
    .unwrap();
    /// Explicit clock time, e.g. "om 10:05" or "om 9".
    static ref AT_TIME_RE: Regex = Regex::new(r"(?i)\bom\s+(\d{1,2})(?::(\d{2}))?\b").unwrap();
    /// Hard "no transfers" wording.
    static ref STRICT_DIRECT_RE: Regex = Regex::new(
        r"(?i)\b(directe?|rechtstreeks(e)?|zonder\s+overstap(pen)?)\b"
    )
    .unwrap();
    /// Soft "as few transfers as possible" wording.
    static ref PREFER_DIRECT_RE: Regex = Regex::new(
        r"(?i)\b(zo\s+(min|weinig)\s+mogelijk\s+overstappen|weinig\s+overstappen|liefst\s+geen\s+overstap(pen)?)\b"
    )
    .unwrap();
}

/// Enrich `args` with route, directness, and time hints extracted from
/// `free_text`. `today` anchors relative day phrases.
pub fn enrich(free_text: &str, args: &Map<String, Value>, today: NaiveDate) -> Map<String, Value> {
    let mut enriched = args.clone();

    apply_route(free_text, &mut enriched);
    apply_directness(free_text, &mut enriched);
    apply_datetime(free_text, &mut enriched, today);

    enriched
}

fn apply_route(text: &str, args: &mut Map<String, Value>) {
    let Some(captures) = ROUTE_RE.captures(text) else {
        return;
    };

    let from = trim_time_clauses(captures.get(1).map_or("", |m| m.as_str()));
    let to = trim_time_clauses(captures.get(2).map_or("", |m| m.as_str()));

    if !from.is_empty() && !args.contains_key("from") {
        args.insert("from".to_string(), Value::String(from));
    }
    if !to.is_empty() && !args.contains_key("to") {
        args.insert("to".to_string(), Value::String(to));
    }
}

/// Strip a trailing date/time clause so it does not pollute station search
/// queries ("Utrecht vandaag om 10:05" → "Utrecht").
pub fn trim_time_clauses(segment: &str) -> String {
    TIME_CLAUSE_RE.replace(segment, "").trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directness {
    Strict,
    Preferred,
    None,
}

fn classify_directness(text: &str) -> Directness {
    // Soft wording mentions transfers too, so check it before the strict
    // patterns claim "overstappen".
    if PREFER_DIRECT_RE.is_match(text) {
        Directness::Preferred
    } else if STRICT_DIRECT_RE.is_match(text) {
        Directness::Strict
    } else {
        Directness::None
    }
}

fn apply_directness(text: &str, args: &mut Map<String, Value>) {
    match classify_directness(text) {
        Directness::Strict => {
            let hard = hard_map(args);
            hard.entry("directOnly".to_string())
                .or_insert(Value::Bool(true));
            hard.entry("maxTransfers".to_string()).or_insert(json!(0));
        }
        Directness::Preferred => {
            // A soft preference never touches hard constraints.
            let soft = args
                .entry("soft".to_string())
                .or_insert_with(|| json!({}));
            if let Value::Object(soft) = soft {
                let rank_by = soft
                    .entry("rankBy".to_string())
                    .or_insert_with(|| json!([]));
                if let Value::Array(keys) = rank_by {
                    let already = keys.iter().any(|k| k == "fewest_transfers");
                    if !already {
                        keys.push(Value::String("fewest_transfers".to_string()));
                    }
                }
            }
        }
        Directness::None => {}
    }
}

fn hard_map(args: &mut Map<String, Value>) -> &mut Map<String, Value> {
    let hard = args.entry("hard".to_string()).or_insert_with(|| json!({}));
    if !hard.is_object() {
        *hard = json!({});
    }
    hard.as_object_mut().expect("just ensured object")
}

fn apply_datetime(text: &str, args: &mut Map<String, Value>, today: NaiveDate) {
    if args.contains_key("dateTime") {
        return;
    }

    let lowered = text.to_lowercase();
    let tomorrow = today + Duration::days(1);

    let anchored = if lowered.contains("morgen") && !lowered.contains("overmorgen") {
        let time = extract_clock_time(text).unwrap_or_else(|| nine_oclock());
        Some(tomorrow.and_time(time))
    } else if lowered.contains("vanmiddag") {
        Some(today.and_time(NaiveTime::from_hms_opt(15, 0, 0).expect("valid time")))
    } else if lowered.contains("vanavond") {
        Some(today.and_time(NaiveTime::from_hms_opt(19, 0, 0).expect("valid time")))
    } else if lowered.contains("vanochtend") {
        Some(today.and_time(nine_oclock()))
    } else {
        extract_clock_time(text).map(|time| today.and_time(time))
    };

    if let Some(date_time) = anchored {
        args.insert(
            "dateTime".to_string(),
            Value::String(date_time.format("%Y-%m-%dT%H:%M:00").to_string()),
        );
    }
}

fn nine_oclock() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).expect("valid time")
}

fn extract_clock_time(text: &str) -> Option<NaiveTime> {
    let captures = AT_TIME_RE.captures(text)?;
    let hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures
        .get(2)
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn test_route_extraction_trims_time_clauses() {
        let args = enrich(
            "Hoe kom ik van Amsterdam Centraal naar Utrecht vandaag om 10:05?",
            &Map::new(),
            day(),
        );
        assert_eq!(args["from"], "Amsterdam Centraal");
        assert_eq!(args["to"], "Utrecht");
        assert_eq!(args["dateTime"], "2026-03-02T10:05:00");
    }

    #[test]
    fn test_existing_route_not_overwritten() {
        let mut seed = Map::new();
        seed.insert("from".to_string(), Value::String("ASD".into()));
        let args = enrich("van Rotterdam naar Breda", &seed, day());
        assert_eq!(args["from"], "ASD");
        assert_eq!(args["to"], "Breda");
    }

    #[test]
    fn test_strict_directness_sets_hard_constraints() {
        let args = enrich("zonder overstap van Zwolle naar Leiden", &Map::new(), day());
        assert_eq!(args["hard"]["directOnly"], true);
        assert_eq!(args["hard"]["maxTransfers"], 0);
    }

    #[test]
    fn test_strict_directness_never_overwrites_caller_hard() {
        let mut seed = Map::new();
        seed.insert("hard".to_string(), json!({"maxTransfers": 2}));
        let args = enrich("directe trein naar huis", &seed, day());
        // Caller's explicit value survives; only the gap is filled.
        assert_eq!(args["hard"]["maxTransfers"], 2);
        assert_eq!(args["hard"]["directOnly"], true);
    }

    #[test]
    fn test_preferred_directness_is_soft_only() {
        let args = enrich(
            "van Utrecht naar Den Haag met zo min mogelijk overstappen",
            &Map::new(),
            day(),
        );
        assert!(args.get("hard").is_none());
        assert_eq!(args["soft"]["rankBy"], json!(["fewest_transfers"]));
    }

    #[test]
    fn test_preferred_directness_appends_once() {
        let mut seed = Map::new();
        seed.insert("soft".to_string(), json!({"rankBy": ["fastest"]}));
        let args = enrich("graag weinig overstappen", &seed, day());
        assert_eq!(args["soft"]["rankBy"], json!(["fastest", "fewest_transfers"]));
    }

    #[test]
    fn test_day_part_anchors() {
        let afternoon = enrich("vanmiddag naar Arnhem", &Map::new(), day());
        assert_eq!(afternoon["dateTime"], "2026-03-02T15:00:00");

        let evening = enrich("vanavond nog", &Map::new(), day());
        assert_eq!(evening["dateTime"], "2026-03-02T19:00:00");

        let tomorrow = enrich("morgen om 7 vertrekken", &Map::new(), day());
        assert_eq!(tomorrow["dateTime"], "2026-03-03T07:00:00");

        let tomorrow_minutes = enrich("morgen om 7:45", &Map::new(), day());
        assert_eq!(tomorrow_minutes["dateTime"], "2026-03-03T07:45:00");
    }

    #[test]
    fn test_explicit_datetime_passes_through() {
        let mut seed = Map::new();
        seed.insert(
            "dateTime".to_string(),
            Value::String("2026-04-01T08:30:00".into()),
        );
        let args = enrich("morgen om 10", &seed, day());
        assert_eq!(args["dateTime"], "2026-04-01T08:30:00");
    }
}
