pub mod aggregate;
pub mod config;
pub mod db;
pub mod dimensions;
pub mod error;
pub mod factors;
pub mod models;
pub mod report;
pub mod risk;
pub mod sources;
pub mod telemetry;

pub use config::{ConfigError, ScoringConfig, TimezonePolicy};
pub use error::{Result, ScoringError};
pub use models::{
    ActivityEvent, ActivityKind, ActivityWindow, BurnoutResult, DimensionScoreSet,
    FactorScoreSet, IncidentRecord, MemberActivity, MemberAnalysis, MemberOutcome,
    MemberStatsBundle, RiskLevel, Severity, TeamActivity, Timestamp,
};
pub use sources::{resolve_weights, DataSource, SourceSet, WeightConfig};

use tracing::debug;

/// Stateless evaluator that applies one scoring configuration.
#[derive(Debug, Clone, Default)]
pub struct BurnoutEngine {
    config: ScoringConfig,
}

impl BurnoutEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn aggregate(
        &self,
        window: &ActivityWindow,
        incidents: &[IncidentRecord],
        commits: Option<&[ActivityEvent]>,
        messages: Option<&[ActivityEvent]>,
    ) -> Result<MemberStatsBundle> {
        aggregate::aggregate_member(&self.config, window, incidents, commits, messages)
    }

    pub fn score(
        &self,
        stats: &MemberStatsBundle,
        weights: &WeightConfig,
    ) -> Result<BurnoutResult> {
        let factors = factors::calculate_factors(stats, weights, &self.config)?;
        dimensions::compose(factors)
    }

    /// Aggregate and score one member.
    pub fn analyze(
        &self,
        window: &ActivityWindow,
        member: &MemberActivity,
        weights: &WeightConfig,
    ) -> Result<MemberAnalysis> {
        let stats = self.aggregate(
            window,
            &member.incidents,
            member.commits.as_deref(),
            member.messages.as_deref(),
        )?;
        let result = self.score(&stats, weights)?;

        debug!(
            member_id = %member.member_id,
            incidents = stats.incident_count,
            final_score = result.final_score,
            risk_level = %result.risk_level,
            "scored member"
        );

        Ok(MemberAnalysis {
            member_id: member.member_id.clone(),
            name: member.name.clone(),
            insufficient_data: !stats.has_sufficient_data(),
            stats,
            result,
        })
    }
}

/// Aggregate one member's activity with the default configuration.
pub fn aggregate(
    window: &ActivityWindow,
    incidents: &[IncidentRecord],
    commits: Option<&[ActivityEvent]>,
    messages: Option<&[ActivityEvent]>,
) -> Result<MemberStatsBundle> {
    BurnoutEngine::default().aggregate(window, incidents, commits, messages)
}

/// Score a stats bundle with the default configuration.
pub fn score(stats: &MemberStatsBundle, weights: &WeightConfig) -> Result<BurnoutResult> {
    BurnoutEngine::default().score(stats, weights)
}
