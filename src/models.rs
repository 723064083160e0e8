use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoringError};
use crate::sources::DataSource;

/// Timestamps keep the offset they were recorded with.
pub type Timestamp = DateTime<FixedOffset>;

/// Half-open analysis period `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct ActivityWindow {
    start: Timestamp,
    end: Timestamp,
}

#[derive(Deserialize)]
struct RawWindow {
    start: Timestamp,
    end: Timestamp,
}

impl TryFrom<RawWindow> for ActivityWindow {
    type Error = ScoringError;

    fn try_from(raw: RawWindow) -> Result<Self> {
        ActivityWindow::new(raw.start, raw.end)
    }
}

impl ActivityWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if end <= start {
            return Err(ScoringError::InvalidWindow(format!(
                "end {} is not after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Trailing window of `days` days that ends at `end`.
    pub fn ending_at(end: Timestamp, days: i64) -> Result<Self> {
        let start = Duration::try_days(days.max(1))
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                ScoringError::InvalidWindow(format!("a {days} day window is out of range"))
            })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn days(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 86_400.0
    }

    /// Length in weeks, never less than one day's worth.
    pub fn weeks(&self) -> f64 {
        self.days().max(1.0) / 7.0
    }

    pub fn contains(&self, at: &Timestamp) -> bool {
        *at >= self.start && *at < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 4.0,
            Severity::High => 3.0,
            Severity::Medium => 2.0,
            Severity::Low => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub member_id: String,
    pub opened_at: Timestamp,
    #[serde(default)]
    pub acknowledged_at: Option<Timestamp>,
    pub severity: Severity,
    #[serde(default)]
    pub resolved_at: Option<Timestamp>,
}

impl IncidentRecord {
    /// Minutes from open to acknowledgement, if acknowledged.
    pub fn response_minutes(&self) -> Option<f64> {
        self.acknowledged_at
            .map(|ack| (ack - self.opened_at).num_seconds() as f64 / 60.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Commit,
    Message,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Commit => "commit",
            ActivityKind::Message => "message",
        }
    }

    /// Upstream feed that produces this kind of event.
    pub fn source(&self) -> DataSource {
        match self {
            ActivityKind::Commit => DataSource::GitHub,
            ActivityKind::Message => DataSource::Slack,
        }
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "commit" => Ok(ActivityKind::Commit),
            "message" => Ok(ActivityKind::Message),
            other => Err(format!("unknown activity kind '{other}'")),
        }
    }
}

/// A GitHub commit or Slack message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub member_id: String,
    pub occurred_at: Timestamp,
    pub kind: ActivityKind,
}

/// Per-member aggregate fed to the factor calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberStatsBundle {
    pub incident_count: u32,
    pub incidents_per_week: f64,
    pub after_hours_incident_pct: f64,
    pub weekend_incident_pct: f64,
    pub avg_response_minutes: f64,
    #[serde(default)]
    pub acknowledged_count: u32,
    pub severity_weighted_load: f64,
    pub window_weeks: f64,
    #[serde(default)]
    pub after_hours_commit_pct: Option<f64>,
    #[serde(default)]
    pub weekend_commit_pct: Option<f64>,
    #[serde(default)]
    pub after_hours_message_pct: Option<f64>,
}

impl Default for MemberStatsBundle {
    fn default() -> Self {
        Self {
            incident_count: 0,
            incidents_per_week: 0.0,
            after_hours_incident_pct: 0.0,
            weekend_incident_pct: 0.0,
            avg_response_minutes: 0.0,
            acknowledged_count: 0,
            severity_weighted_load: 0.0,
            window_weeks: 1.0,
            after_hours_commit_pct: None,
            weekend_commit_pct: None,
            after_hours_message_pct: None,
        }
    }
}

impl MemberStatsBundle {
    /// Members without incidents are shown as "insufficient data".
    pub fn has_sufficient_data(&self) -> bool {
        self.incident_count > 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorScoreSet {
    pub workload: f64,
    pub after_hours: f64,
    pub weekend_work: f64,
    pub response_time_pressure: f64,
    pub incident_load: f64,
}

impl FactorScoreSet {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("workload", self.workload),
            ("after_hours", self.after_hours),
            ("weekend_work", self.weekend_work),
            ("response_time_pressure", self.response_time_pressure),
            ("incident_load", self.incident_load),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScoreSet {
    pub emotional_exhaustion: f64,
    pub depersonalization: f64,
    pub reduced_accomplishment: f64,
}

impl DimensionScoreSet {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("emotional exhaustion", self.emotional_exhaustion),
            ("depersonalization", self.depersonalization),
            ("reduced accomplishment", self.reduced_accomplishment),
        ]
        .into_iter()
    }

    /// Highest-scoring dimension, first one wins ties.
    pub fn dominant(&self) -> (&'static str, f64) {
        self.iter()
            .fold(("emotional exhaustion", f64::MIN), |best, next| {
                if next.1 > best.1 {
                    next
                } else {
                    best
                }
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// Closed-open bands: `[0,25)`, `[25,50)`, `[50,75)`, `[75,100]`.
    pub fn from_score(score: f64) -> Self {
        if score < 25.0 {
            RiskLevel::Low
        } else if score < 50.0 {
            RiskLevel::Moderate
        } else if score < 75.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn all() -> [RiskLevel; 4] {
        [
            RiskLevel::Critical,
            RiskLevel::High,
            RiskLevel::Moderate,
            RiskLevel::Low,
        ]
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurnoutResult {
    pub final_score: f64,
    pub risk_level: RiskLevel,
    pub dimensions: DimensionScoreSet,
    pub factors: FactorScoreSet,
}

impl BurnoutResult {
    pub fn display_score(&self) -> u8 {
        self.final_score.round().clamp(0.0, 100.0) as u8
    }

    /// Inverse of the burnout score, as charted on the dashboard.
    pub fn health_score(&self) -> f64 {
        100.0 - self.final_score
    }
}

/// Raw activity for one member, as supplied by the integration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberActivity {
    pub member_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub incidents: Vec<IncidentRecord>,
    #[serde(default)]
    pub commits: Option<Vec<ActivityEvent>>,
    #[serde(default)]
    pub messages: Option<Vec<ActivityEvent>>,
}

impl MemberActivity {
    pub fn new(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            name: None,
            incidents: Vec::new(),
            commits: None,
            messages: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.member_id)
    }
}

/// Offline input for a whole team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamActivity {
    pub window: ActivityWindow,
    #[serde(default)]
    pub sources: Option<Vec<DataSource>>,
    pub members: Vec<MemberActivity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAnalysis {
    pub member_id: String,
    pub name: Option<String>,
    pub stats: MemberStatsBundle,
    pub result: BurnoutResult,
    pub insufficient_data: bool,
}

impl MemberAnalysis {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.member_id)
    }
}

/// Result of scoring one member in a team run.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberOutcome {
    pub member_id: String,
    pub name: Option<String>,
    pub outcome: Result<MemberAnalysis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(value).unwrap()
    }

    #[test]
    fn window_rejects_inverted_range() {
        let err = ActivityWindow::new(ts("2026-02-01T00:00:00Z"), ts("2026-01-01T00:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, ScoringError::InvalidWindow(_)));
    }

    #[test]
    fn window_rejects_empty_range() {
        let at = ts("2026-02-01T00:00:00Z");
        assert!(ActivityWindow::new(at, at).is_err());
    }

    #[test]
    fn window_is_half_open_across_offsets() {
        let window =
            ActivityWindow::new(ts("2026-01-01T00:00:00Z"), ts("2026-01-31T00:00:00Z")).unwrap();
        assert_eq!(window.days(), 30.0);
        assert!(window.contains(&ts("2026-01-01T02:00:00+02:00")));
        assert!(!window.contains(&ts("2026-01-31T00:00:00Z")));
        assert!(!window.contains(&ts("2025-12-31T23:59:59Z")));
    }

    #[test]
    fn short_windows_count_as_one_day() {
        let window =
            ActivityWindow::new(ts("2026-01-01T00:00:00Z"), ts("2026-01-01T06:00:00Z")).unwrap();
        assert!((window.weeks() - 1.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn trailing_window_uses_at_least_one_day() {
        let end = ts("2026-01-10T00:00:00Z");
        let window = ActivityWindow::ending_at(end, 0).unwrap();
        assert_eq!(window.start(), ts("2026-01-09T00:00:00Z"));
    }

    #[test]
    fn oversized_trailing_window_is_rejected() {
        let end = ts("2026-01-10T00:00:00Z");
        let err = ActivityWindow::ending_at(end, 1_000_000_000_000).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidWindow(_)));
        assert!(ActivityWindow::ending_at(end, i64::MAX).is_err());
    }

    #[test]
    fn window_deserialization_validates() {
        let json = r#"{"start":"2026-02-01T00:00:00Z","end":"2026-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<ActivityWindow>(json).is_err());
    }

    #[test]
    fn severity_weights_are_ordered() {
        assert_eq!(Severity::Critical.weight(), 4.0 * Severity::Low.weight());
        assert_eq!(Severity::High.weight(), 3.0);
        assert_eq!(Severity::Medium.weight(), 2.0);
        assert_eq!("CRITICAL".parse::<Severity>(), Ok(Severity::Critical));
        assert!("sev1".parse::<Severity>().is_err());
    }

    #[test]
    fn risk_levels_follow_closed_open_bands() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(24.999), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25.0), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(49.999), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(50.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(74.999), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100.0), RiskLevel::Critical);
    }

    #[test]
    fn response_minutes_use_instants_not_wall_clock() {
        let incident = IncidentRecord {
            member_id: "u1".to_string(),
            opened_at: ts("2026-01-05T10:00:00+00:00"),
            acknowledged_at: Some(ts("2026-01-05T12:15:00+02:00")),
            severity: Severity::High,
            resolved_at: None,
        };
        assert_eq!(incident.response_minutes(), Some(15.0));
    }

    #[test]
    fn dominant_dimension_prefers_highest() {
        let dims = DimensionScoreSet {
            emotional_exhaustion: 20.0,
            depersonalization: 45.0,
            reduced_accomplishment: 30.0,
        };
        assert_eq!(dims.dominant(), ("depersonalization", 45.0));
    }
}
