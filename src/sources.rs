use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScoringError};
use crate::models::{ActivityEvent, MemberStatsBundle};

/// Share of the after-hours factor owned by incidents when any optional
/// source is connected.
pub const INCIDENT_AFTER_HOURS_SHARE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Incidents,
    GitHub,
    Slack,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Incidents => "incidents",
            DataSource::GitHub => "github",
            DataSource::Slack => "slack",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "incidents" | "pagerduty" | "rootly" => Ok(DataSource::Incidents),
            "github" => Ok(DataSource::GitHub),
            "slack" => Ok(DataSource::Slack),
            other => Err(format!("unknown data source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSet(BTreeSet<DataSource>);

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incidents_only() -> Self {
        [DataSource::Incidents].into_iter().collect()
    }

    /// Incidents plus every optional source that produced at least one event.
    pub fn detect(commits: Option<&[ActivityEvent]>, messages: Option<&[ActivityEvent]>) -> Self {
        let mut set = Self::incidents_only();
        for events in [commits, messages].into_iter().flatten() {
            for event in events {
                set.insert(event.kind.source());
            }
        }
        set
    }

    pub fn insert(&mut self, source: DataSource) -> bool {
        self.0.insert(source)
    }

    pub fn remove(&mut self, source: DataSource) -> bool {
        self.0.remove(&source)
    }

    pub fn contains(&self, source: DataSource) -> bool {
        self.0.contains(&source)
    }

    pub fn iter(&self) -> impl Iterator<Item = DataSource> + '_ {
        self.0.iter().copied()
    }

    pub fn extend(&mut self, other: &SourceSet) {
        self.0.extend(other.iter());
    }
}

impl FromIterator<DataSource> for SourceSet {
    fn from_iter<I: IntoIterator<Item = DataSource>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|source| source.as_str()).collect();
        f.write_str(&names.join(", "))
    }
}

/// After-hours weights for one run. Weights of connected sources sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConfig {
    pub sources: SourceSet,
    pub incident_after_hours: f64,
    pub commit_after_hours: Option<f64>,
    pub message_after_hours: Option<f64>,
}

impl WeightConfig {
    /// Weighted terms for the after-hours factor, skipping disconnected
    /// sources.
    pub fn after_hours_terms(&self) -> impl Iterator<Item = (DataSource, f64)> {
        [
            Some((DataSource::Incidents, self.incident_after_hours)),
            self.commit_after_hours.map(|w| (DataSource::GitHub, w)),
            self.message_after_hours.map(|w| (DataSource::Slack, w)),
        ]
        .into_iter()
        .flatten()
    }

    /// `(after-hours pct, weight)` pairs for one member. A connected source
    /// with no events for this member drops out and the remaining weights are
    /// scaled back up to 1.
    pub fn effective_for(&self, stats: &MemberStatsBundle) -> Vec<(f64, f64)> {
        let terms: Vec<(f64, f64)> = self
            .after_hours_terms()
            .filter_map(|(source, weight)| {
                let pct = match source {
                    DataSource::Incidents => Some(stats.after_hours_incident_pct),
                    DataSource::GitHub => stats.after_hours_commit_pct,
                    DataSource::Slack => stats.after_hours_message_pct,
                };
                pct.map(|pct| (pct, weight))
            })
            .collect();

        let total: f64 = terms.iter().map(|(_, weight)| weight).sum();
        if total <= 0.0 {
            return Vec::new();
        }
        terms
            .into_iter()
            .map(|(pct, weight)| (pct, weight / total))
            .collect()
    }
}

impl Default for WeightConfig {
    fn default() -> Self {
        WeightConfig {
            sources: SourceSet::incidents_only(),
            incident_after_hours: 1.0,
            commit_after_hours: None,
            message_after_hours: None,
        }
    }
}

/// Decide after-hours weights from the connected sources.
///
/// Incidents take 70% and the connected optional sources split the other 30%
/// evenly. With no optional source, incidents take the whole factor.
pub fn resolve_weights(sources: &SourceSet) -> Result<WeightConfig> {
    if !sources.contains(DataSource::Incidents) {
        return Err(ScoringError::NoIncidentSource);
    }

    let github = sources.contains(DataSource::GitHub);
    let slack = sources.contains(DataSource::Slack);
    let optional = [github, slack].iter().filter(|c| **c).count();

    let weights = if optional == 0 {
        WeightConfig {
            sources: sources.clone(),
            ..WeightConfig::default()
        }
    } else {
        let share = (1.0 - INCIDENT_AFTER_HOURS_SHARE) / optional as f64;
        WeightConfig {
            sources: sources.clone(),
            incident_after_hours: INCIDENT_AFTER_HOURS_SHARE,
            commit_after_hours: github.then_some(share),
            message_after_hours: slack.then_some(share),
        }
    };

    debug!(sources = %sources, ?weights, "resolved after-hours weights");
    Ok(weights)
}
