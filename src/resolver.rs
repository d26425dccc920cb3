//! Fuzzy resolution of free-text station names to canonical stations.
//!
//! Candidates always come from the upstream free-text station search; the
//! resolver only ranks what upstream returned, it never guesses beyond it.
//! Both the query and every candidate name variant are normalized
//! (lowercased, diacritics folded away, punctuation collapsed) before
//! scoring. The decision rule needs both an absolute confidence and a clear
//! margin over the runner-up before it commits to a unique match.

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::ResolverConfig;
use crate::models::Station;

/// Confidence assigned to an exact normalized match.
const EXACT_CONFIDENCE: f64 = 1.0;
/// Base of the prefix tier; the length ratio adds up to 0.1 on top.
const PREFIX_BASE_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Raw string equality.
    Exact,
    /// Lowercased equality.
    CaseInsensitive,
    /// Exact and prefix tiers on folded text (default).
    Normalized,
    /// Adds the edit-distance tier on folded text.
    Fuzzy,
}

impl MatchMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "exact" => Some(MatchMode::Exact),
            "case_insensitive" => Some(MatchMode::CaseInsensitive),
            "normalized" => Some(MatchMode::Normalized),
            "fuzzy" => Some(MatchMode::Fuzzy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub mode: MatchMode,
    pub min_confidence: f64,
    pub min_gap: f64,
    pub max_candidates: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            mode: MatchMode::Normalized,
            min_confidence: 0.85,
            min_gap: 0.15,
            max_candidates: 10,
        }
    }
}

impl ResolveOptions {
    /// Build options from a validated config section.
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            mode: MatchMode::parse(&config.mode).unwrap_or(MatchMode::Normalized),
            min_confidence: config.min_confidence,
            min_gap: config.min_gap,
            max_candidates: config.max_candidates,
        }
    }
}

/// One disambiguation option.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStation {
    pub station: Station,
    pub label: String,
    pub confidence: f64,
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone)]
pub enum Resolution {
    Unique(Station),
    Disambiguate(Vec<RankedStation>),
    NoMatch,
}

/// Lowercase, fold diacritics (NFKD, combining marks dropped), collapse
/// non-alphanumerics to single spaces, trim.
pub fn normalize_name(raw: &str) -> String {
    let folded: String = raw.nfkd().filter(|c| !is_combining_mark(*c)).collect();

    let mut out = String::with_capacity(folded.len());
    for c in folded.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim_end().to_string()
}

fn score_pair(query: &str, candidate: &str, mode: MatchMode) -> f64 {
    match mode {
        MatchMode::Exact => {
            if query == candidate {
                EXACT_CONFIDENCE
            } else {
                0.0
            }
        }
        MatchMode::CaseInsensitive => {
            if query.to_lowercase() == candidate.to_lowercase() {
                EXACT_CONFIDENCE
            } else {
                0.0
            }
        }
        MatchMode::Normalized | MatchMode::Fuzzy => {
            let q = normalize_name(query);
            let c = normalize_name(candidate);
            if q.is_empty() || c.is_empty() {
                return 0.0;
            }
            if q == c {
                return EXACT_CONFIDENCE;
            }
            // Prefix on either side handles abbreviated name variants
            // ("Almere C" vs "Almere Centrum").
            if q.starts_with(&c) || c.starts_with(&q) {
                let (shorter, longer) = if q.len() <= c.len() { (&q, &c) } else { (&c, &q) };
                let ratio = shorter.len() as f64 / longer.len() as f64;
                return PREFIX_BASE_CONFIDENCE + 0.1 * ratio;
            }
            if mode == MatchMode::Fuzzy {
                strsim::normalized_levenshtein(&q, &c)
            } else {
                0.0
            }
        }
    }
}

/// Best score across a station's name variants.
pub fn score_station(query: &str, station: &Station, mode: MatchMode) -> f64 {
    station
        .name_variants()
        .map(|name| score_pair(query, name, mode))
        .fold(0.0, f64::max)
}

/// Rank candidates and apply the unique/disambiguate/no-match decision rule.
pub fn resolve(text: &str, candidates: &[Station], options: &ResolveOptions) -> Resolution {
    let mut ranked: Vec<RankedStation> = candidates
        .iter()
        .map(|station| RankedStation {
            confidence: score_station(text, station, options.mode),
            label: station.display_name().to_string(),
            station: station.clone(),
        })
        .collect();

    // Confidence descending, label ascending for a deterministic order.
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });

    let Some(top) = ranked.first() else {
        return Resolution::NoMatch;
    };
    let runner_up = ranked.get(1).map(|r| r.confidence).unwrap_or(0.0);

    if top.confidence >= options.min_confidence
        && top.confidence - runner_up >= options.min_gap
    {
        return Resolution::Unique(top.station.clone());
    }

    let qualified: Vec<RankedStation> = ranked
        .into_iter()
        .filter(|r| r.confidence >= options.min_confidence)
        .take(options.max_candidates)
        .collect();

    if qualified.is_empty() {
        Resolution::NoMatch
    } else {
        Resolution::Disambiguate(qualified)
    }
}

/// Whether raw caller input can pass through as a literal station or UIC
/// code when the upstream name search found nothing. Station codes are
/// short all-caps letter groups; UIC codes are all digits.
pub fn looks_like_station_code(text: &str) -> bool {
    let trimmed = text.trim();
    if !(2..=8).contains(&trimmed.len()) {
        return false;
    }
    trimmed.chars().all(|c| c.is_ascii_uppercase())
        || trimmed.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(code: &str, long: &str, short: Option<&str>) -> Station {
        Station {
            code: code.into(),
            uic_code: None,
            name_short: short.map(str::to_string),
            name_medium: None,
            name_long: Some(long.into()),
            country_code: Some("NL".into()),
            lat: None,
            lng: None,
            distance_meters: None,
        }
    }

    #[test]
    fn test_normalize_folds_diacritics_and_punctuation() {
        assert_eq!(normalize_name("'s-Hertogenbosch"), "s hertogenbosch");
        assert_eq!(normalize_name("Châtelet—Les Halles"), "chatelet les halles");
        assert_eq!(normalize_name("  Almere   Centrum  "), "almere centrum");
    }

    #[test]
    fn test_prefix_match_beats_unrelated_near_spellings() {
        let candidates = vec![
            station("AMF", "Amersfoort", None),
            station("ALMC", "Almere C", None),
            station("AML", "Almelo", None),
        ];
        let resolution = resolve("Almere Centrum", &candidates, &ResolveOptions::default());
        match resolution {
            Resolution::Unique(st) => assert_eq!(st.code, "ALMC"),
            other => panic!("expected unique match, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_normalized_match_is_confident() {
        let st = station("ASD", "Amsterdam Centraal", Some("A'dam C"));
        let score = score_station("amsterdam centraal", &st, MatchMode::Normalized);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_close_candidates_disambiguate() {
        let candidates = vec![
            station("ASD", "Amsterdam Centraal", None),
            station("ASDZ", "Amsterdam Zuid", None),
        ];
        // "Amsterdam" is a prefix of both; neither clears the gap.
        let resolution = resolve("Amsterdam", &candidates, &ResolveOptions::default());
        match resolution {
            Resolution::Disambiguate(options) => {
                assert_eq!(options.len(), 2);
                assert!(options[0].confidence >= options[1].confidence);
            }
            other => panic!("expected disambiguation, got {:?}", other),
        }
    }

    #[test]
    fn test_no_match_below_threshold() {
        let candidates = vec![station("GVC", "Den Haag Centraal", None)];
        let resolution = resolve("Groningen", &candidates, &ResolveOptions::default());
        assert!(matches!(resolution, Resolution::NoMatch));
    }

    #[test]
    fn test_fuzzy_mode_scores_near_spellings() {
        let st = station("AML", "Almelo", None);
        let normalized = score_station("Almeklo", &st, MatchMode::Normalized);
        let fuzzy = score_station("Almeklo", &st, MatchMode::Fuzzy);
        // "almeklo" is no prefix of "almelo" so normalized mode gives 0,
        // but it is one edit away.
        assert_eq!(normalized, 0.0);
        assert!(fuzzy > 0.8);
    }

    #[test]
    fn test_station_code_passthrough_shapes() {
        assert!(looks_like_station_code("ASD"));
        assert!(looks_like_station_code("8400058"));
        assert!(!looks_like_station_code("Almere"));
        assert!(!looks_like_station_code("A"));
        assert!(!looks_like_station_code("ASD12"));
    }
}
