//! Deterministic trip recommendation.
//!
//! Picks one trip out of the post-filter, post-rank list using a total
//! ordering, so the same input always yields the same recommendation:
//! upstream-flagged optimal first, then fewest transfers, then shortest
//! duration (actual when known), then earliest departure, then original
//! position as the final tiebreak.

use crate::models::TripSummary;

/// Index of the recommended trip, or `None` for an empty list.
pub fn pick_recommended(trips: &[TripSummary]) -> Option<usize> {
    trips
        .iter()
        .enumerate()
        .min_by_key(|(index, trip)| {
            (
                !trip.optimal,
                trip.transfers,
                trip.duration_minutes().unwrap_or(u32::MAX),
                trip.departure_time()
                    .map(|t| t.timestamp())
                    .unwrap_or(i64::MAX),
                *index,
            )
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};

    fn trip(
        uid: &str,
        optimal: bool,
        transfers: u32,
        planned: Option<u32>,
        departure: Option<&str>,
    ) -> TripSummary {
        TripSummary {
            uid: uid.into(),
            ctx_recon: None,
            status: None,
            source: None,
            transfers,
            planned_duration_minutes: planned,
            actual_duration_minutes: None,
            optimal,
            realtime: false,
            departure_name: None,
            arrival_name: None,
            departure_planned_date_time: departure
                .map(|d| DateTime::<FixedOffset>::parse_from_rfc3339(d).unwrap()),
            departure_actual_date_time: None,
            arrival_planned_date_time: None,
            arrival_actual_date_time: None,
            legs: vec![],
            primary_message: None,
        }
    }

    #[test]
    fn test_optimal_flag_wins_over_everything() {
        let trips = vec![
            trip("fast", false, 0, Some(25), None),
            trip("flagged", true, 2, Some(60), None),
        ];
        assert_eq!(pick_recommended(&trips), Some(1));
    }

    #[test]
    fn test_transfers_before_duration() {
        let trips = vec![
            trip("quick with transfer", false, 1, Some(25), None),
            trip("slow direct", false, 0, Some(40), None),
        ];
        assert_eq!(pick_recommended(&trips), Some(1));
    }

    #[test]
    fn test_actual_duration_preferred_over_planned() {
        let mut delayed = trip("delayed", false, 0, Some(30), None);
        delayed.actual_duration_minutes = Some(50);
        let trips = vec![delayed, trip("on time", false, 0, Some(35), None)];
        assert_eq!(pick_recommended(&trips), Some(1));
    }

    #[test]
    fn test_earlier_departure_breaks_duration_tie() {
        let trips = vec![
            trip("later", false, 0, Some(30), Some("2026-03-01T12:30:00+01:00")),
            trip("earlier", false, 0, Some(30), Some("2026-03-01T12:00:00+01:00")),
        ];
        assert_eq!(pick_recommended(&trips), Some(1));
    }

    #[test]
    fn test_full_tie_keeps_first() {
        let trips = vec![
            trip("first", false, 0, Some(30), None),
            trip("second", false, 0, Some(30), None),
        ];
        assert_eq!(pick_recommended(&trips), Some(0));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(pick_recommended(&[]), None);
    }

    #[test]
    fn test_missing_duration_sorts_last() {
        let trips = vec![
            trip("unknown", false, 0, None, None),
            trip("known", false, 0, Some(90), None),
        ];
        assert_eq!(pick_recommended(&trips), Some(1));
    }
}
