use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use tracing::{debug, warn};

use crate::config::ScoringConfig;
use crate::error::Result;
use crate::models::{
    ActivityEvent, ActivityWindow, IncidentRecord, MemberStatsBundle, Timestamp,
};

/// Where a timestamp falls on the working calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    pub after_hours: bool,
    pub weekend: bool,
}

pub fn classify(at: &Timestamp, config: &ScoringConfig) -> TimeSlot {
    let local = local_time(at, config);
    let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
    let hour = local.hour();
    let in_business_hours =
        hour >= config.business_start_hour && hour < config.business_end_hour;

    TimeSlot {
        after_hours: weekend || !in_business_hours,
        weekend,
    }
}

fn local_time(at: &Timestamp, config: &ScoringConfig) -> NaiveDateTime {
    match config.timezone.fixed_offset() {
        Some(offset) => at.with_timezone(&offset).naive_local(),
        None => at.naive_local(),
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[derive(Debug, Default)]
struct SlotCounts {
    total: usize,
    after_hours: usize,
    weekend: usize,
}

impl SlotCounts {
    fn tally<'a>(stamps: impl Iterator<Item = &'a Timestamp>, config: &ScoringConfig) -> Self {
        let mut counts = SlotCounts::default();
        for at in stamps {
            let slot = classify(at, config);
            counts.total += 1;
            counts.after_hours += usize::from(slot.after_hours);
            counts.weekend += usize::from(slot.weekend);
        }
        counts
    }

    fn after_hours_pct(&self) -> Option<f64> {
        (self.total > 0).then(|| percentage(self.after_hours, self.total))
    }

    fn weekend_pct(&self) -> Option<f64> {
        (self.total > 0).then(|| percentage(self.weekend, self.total))
    }
}

fn tally_events(
    events: Option<&[ActivityEvent]>,
    window: &ActivityWindow,
    config: &ScoringConfig,
) -> SlotCounts {
    match events {
        Some(events) => SlotCounts::tally(
            events
                .iter()
                .map(|event| &event.occurred_at)
                .filter(|at| window.contains(at)),
            config,
        ),
        None => SlotCounts::default(),
    }
}

/// Reduce one member's raw events into the stats bundle for `window`.
pub fn aggregate_member(
    config: &ScoringConfig,
    window: &ActivityWindow,
    incidents: &[IncidentRecord],
    commits: Option<&[ActivityEvent]>,
    messages: Option<&[ActivityEvent]>,
) -> Result<MemberStatsBundle> {
    let in_window: Vec<&IncidentRecord> = incidents
        .iter()
        .filter(|incident| window.contains(&incident.opened_at))
        .collect();

    let commit_slots = tally_events(commits, window, config);
    let message_slots = tally_events(messages, window, config);

    let mut stats = MemberStatsBundle {
        window_weeks: window.weeks(),
        after_hours_commit_pct: commit_slots.after_hours_pct(),
        weekend_commit_pct: commit_slots.weekend_pct(),
        after_hours_message_pct: message_slots.after_hours_pct(),
        ..MemberStatsBundle::default()
    };

    if in_window.is_empty() {
        debug!("no incidents in window; incident-derived stats stay at zero");
        return Ok(stats);
    }

    let incident_slots =
        SlotCounts::tally(in_window.iter().map(|incident| &incident.opened_at), config);

    let mut response_total = 0.0;
    let mut acknowledged = 0u32;
    for incident in &in_window {
        if let Some(minutes) = incident.response_minutes() {
            if minutes < 0.0 {
                warn!(
                    member_id = %incident.member_id,
                    opened_at = %incident.opened_at,
                    "incident acknowledged before it opened; counting as immediate"
                );
            }
            response_total += minutes.max(0.0);
            acknowledged += 1;
        }
    }

    stats.incident_count = in_window.len() as u32;
    stats.incidents_per_week = in_window.len() as f64 / window.weeks();
    stats.after_hours_incident_pct = incident_slots.after_hours_pct().unwrap_or(0.0);
    stats.weekend_incident_pct = incident_slots.weekend_pct().unwrap_or(0.0);
    stats.acknowledged_count = acknowledged;
    stats.avg_response_minutes = if acknowledged == 0 {
        0.0
    } else {
        response_total / acknowledged as f64
    };
    stats.severity_weighted_load = in_window
        .iter()
        .map(|incident| incident.severity.weight())
        .sum();

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimezonePolicy;
    use crate::models::{ActivityKind, Severity};
    use chrono::DateTime;

    fn ts(value: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(value).unwrap()
    }

    fn january() -> ActivityWindow {
        ActivityWindow::new(ts("2026-01-01T00:00:00Z"), ts("2026-01-29T00:00:00Z")).unwrap()
    }

    fn incident(opened: &str, ack_minutes: Option<i64>, severity: Severity) -> IncidentRecord {
        let opened_at = ts(opened);
        IncidentRecord {
            member_id: "u1".to_string(),
            opened_at,
            acknowledged_at: ack_minutes.map(|m| opened_at + chrono::Duration::minutes(m)),
            severity,
            resolved_at: None,
        }
    }

    fn commit(at: &str) -> ActivityEvent {
        ActivityEvent {
            member_id: "u1".to_string(),
            occurred_at: ts(at),
            kind: ActivityKind::Commit,
        }
    }

    #[test]
    fn classifies_business_hours_boundaries() {
        let config = ScoringConfig::default();
        // 2026-01-05 is a Monday.
        assert!(!classify(&ts("2026-01-05T09:00:00Z"), &config).after_hours);
        assert!(!classify(&ts("2026-01-05T17:59:59Z"), &config).after_hours);
        assert!(classify(&ts("2026-01-05T18:00:00Z"), &config).after_hours);
        assert!(classify(&ts("2026-01-05T08:59:00Z"), &config).after_hours);
    }

    #[test]
    fn weekends_count_as_after_hours() {
        let config = ScoringConfig::default();
        let slot = classify(&ts("2026-01-10T12:00:00Z"), &config);
        assert!(slot.weekend);
        assert!(slot.after_hours);
    }

    #[test]
    fn embedded_offset_decides_local_time() {
        let config = ScoringConfig::default();
        // 23:00 UTC on a Friday is 08:00 Saturday in Tokyo.
        let slot = classify(&ts("2026-01-10T08:00:00+09:00"), &config);
        assert!(slot.weekend);
        let same_instant_utc = classify(&ts("2026-01-09T23:00:00Z"), &config);
        assert!(!same_instant_utc.weekend);
    }

    #[test]
    fn organization_policy_overrides_event_offset() {
        let config = ScoringConfig {
            timezone: TimezonePolicy::Organization {
                utc_offset_minutes: -300,
            },
            ..ScoringConfig::default()
        };
        // 15:00 UTC is 10:00 in UTC-5.
        assert!(!classify(&ts("2026-01-05T15:00:00Z"), &config).after_hours);
        // 22:00 UTC is 17:00 in UTC-5 even when recorded as +02:00 wall time.
        assert!(!classify(&ts("2026-01-06T00:00:00+02:00"), &config).after_hours);
    }

    #[test]
    fn zero_incidents_leave_incident_fields_at_zero() {
        let stats = aggregate_member(
            &ScoringConfig::default(),
            &january(),
            &[],
            Some(&[commit("2026-01-05T22:00:00Z")]),
            None,
        )
        .unwrap();
        assert_eq!(stats.incident_count, 0);
        assert_eq!(stats.incidents_per_week, 0.0);
        assert_eq!(stats.avg_response_minutes, 0.0);
        assert_eq!(stats.severity_weighted_load, 0.0);
        assert_eq!(stats.after_hours_commit_pct, Some(100.0));
        assert_eq!(stats.after_hours_message_pct, None);
    }

    #[test]
    fn computes_rates_and_percentages() {
        let incidents = vec![
            incident("2026-01-05T10:00:00Z", Some(10), Severity::Critical),
            incident("2026-01-06T20:00:00Z", Some(30), Severity::Low),
            incident("2026-01-10T11:00:00Z", None, Severity::High),
            incident("2026-01-12T14:00:00Z", Some(20), Severity::Medium),
        ];
        let stats =
            aggregate_member(&ScoringConfig::default(), &january(), &incidents, None, None)
                .unwrap();

        assert_eq!(stats.incident_count, 4);
        assert!((stats.incidents_per_week - 1.0).abs() < 1e-12);
        assert_eq!(stats.after_hours_incident_pct, 50.0);
        assert_eq!(stats.weekend_incident_pct, 25.0);
        assert_eq!(stats.acknowledged_count, 3);
        assert!((stats.avg_response_minutes - 20.0).abs() < 1e-12);
        assert_eq!(stats.severity_weighted_load, 10.0);
        assert_eq!(stats.window_weeks, 4.0);
    }

    #[test]
    fn ignores_records_outside_window() {
        let incidents = vec![
            incident("2025-12-31T10:00:00Z", Some(5), Severity::Critical),
            incident("2026-01-05T10:00:00Z", Some(5), Severity::Low),
            incident("2026-01-29T00:00:00Z", Some(5), Severity::Critical),
        ];
        let commits = vec![commit("2025-12-01T10:00:00Z")];
        let stats = aggregate_member(
            &ScoringConfig::default(),
            &january(),
            &incidents,
            Some(&commits),
            None,
        )
        .unwrap();
        assert_eq!(stats.incident_count, 1);
        assert_eq!(stats.severity_weighted_load, 1.0);
        assert_eq!(stats.after_hours_commit_pct, None);
    }

    #[test]
    fn negative_response_times_count_as_zero() {
        let incidents = vec![incident("2026-01-05T10:00:00Z", Some(-15), Severity::Low)];
        let stats =
            aggregate_member(&ScoringConfig::default(), &january(), &incidents, None, None)
                .unwrap();
        assert_eq!(stats.avg_response_minutes, 0.0);
        assert_eq!(stats.acknowledged_count, 1);
    }

    #[test]
    fn critical_load_is_four_times_low() {
        let config = ScoringConfig::default();
        let critical = aggregate_member(
            &config,
            &january(),
            &[incident("2026-01-05T10:00:00Z", None, Severity::Critical)],
            None,
            None,
        )
        .unwrap();
        let low = aggregate_member(
            &config,
            &january(),
            &[incident("2026-01-05T10:00:00Z", None, Severity::Low)],
            None,
            None,
        )
        .unwrap();
        assert_eq!(critical.severity_weighted_load, 4.0 * low.severity_weighted_load);
    }

    #[test]
    fn commit_percentages_split_weekday_and_weekend() {
        // Mon 10:00, Tue 21:00, Sat 11:00, Sun 15:00.
        let commits = vec![
            commit("2026-01-05T10:00:00Z"),
            commit("2026-01-06T21:00:00Z"),
            commit("2026-01-10T11:00:00Z"),
            commit("2026-01-11T15:00:00Z"),
        ];
        let stats = aggregate_member(
            &ScoringConfig::default(),
            &january(),
            &[incident("2026-01-05T10:00:00Z", Some(5), Severity::Low)],
            Some(&commits),
            Some(&[]),
        )
        .unwrap();
        assert_eq!(stats.weekend_commit_pct, Some(50.0));
        assert_eq!(stats.after_hours_commit_pct, Some(75.0));
        assert_eq!(stats.after_hours_message_pct, None);
    }
}
