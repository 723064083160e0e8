use crate::config::ScoringConfig;
use crate::error::{Result, ScoringError};
use crate::models::{FactorScoreSet, MemberStatsBundle};
use crate::sources::WeightConfig;

pub const FACTOR_MAX: f64 = 10.0;

/// (incidents per week, factor) knots of the workload curve.
const WORKLOAD_CURVE: [(f64, f64); 4] = [(0.0, 0.0), (2.0, 3.0), (5.0, 7.0), (8.0, 10.0)];

/// Relative slack allowed between `incidents_per_week * window_weeks` and
/// `incident_count`.
const WEEKLY_RATE_TOLERANCE: f64 = 1e-6;

pub fn clamp_factor(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, FACTOR_MAX)
    }
}

fn check_pct(name: &str, value: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ScoringError::InvalidStatsBundle(format!(
            "{name} must be within [0, 100], got {value}"
        )));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ScoringError::InvalidStatsBundle(format!(
            "{name} must be a finite non-negative number, got {value}"
        )));
    }
    Ok(())
}

/// Reject bundles that could only come from an upstream data bug.
pub fn validate_stats(stats: &MemberStatsBundle) -> Result<()> {
    check_pct("after_hours_incident_pct", stats.after_hours_incident_pct)?;
    check_pct("weekend_incident_pct", stats.weekend_incident_pct)?;
    for (name, value) in [
        ("after_hours_commit_pct", stats.after_hours_commit_pct),
        ("weekend_commit_pct", stats.weekend_commit_pct),
        ("after_hours_message_pct", stats.after_hours_message_pct),
    ] {
        if let Some(value) = value {
            check_pct(name, value)?;
        }
    }

    check_non_negative("incidents_per_week", stats.incidents_per_week)?;
    check_non_negative("avg_response_minutes", stats.avg_response_minutes)?;
    check_non_negative("severity_weighted_load", stats.severity_weighted_load)?;
    check_non_negative("window_weeks", stats.window_weeks)?;
    if stats.window_weeks == 0.0 {
        return Err(ScoringError::InvalidStatsBundle(
            "window_weeks must be positive".to_string(),
        ));
    }

    let implied_count = stats.incidents_per_week * stats.window_weeks;
    let count = f64::from(stats.incident_count);
    if (implied_count - count).abs() > WEEKLY_RATE_TOLERANCE * count.max(1.0) {
        return Err(ScoringError::InvalidStatsBundle(format!(
            "incidents_per_week {} over {} weeks implies {implied_count:.2} incidents, \
             bundle reports {}",
            stats.incidents_per_week, stats.window_weeks, stats.incident_count
        )));
    }

    if stats.acknowledged_count > stats.incident_count {
        return Err(ScoringError::InvalidStatsBundle(format!(
            "acknowledged_count {} exceeds incident_count {}",
            stats.acknowledged_count, stats.incident_count
        )));
    }
    Ok(())
}

pub fn workload_score(incidents_per_week: f64) -> f64 {
    let mut previous = WORKLOAD_CURVE[0];
    for knot in WORKLOAD_CURVE.iter().skip(1) {
        if incidents_per_week <= knot.0 {
            let span = (incidents_per_week - previous.0) / (knot.0 - previous.0);
            return clamp_factor(previous.1 + span * (knot.1 - previous.1));
        }
        previous = *knot;
    }
    FACTOR_MAX
}

/// Weighted after-hours share across connected sources, mapped onto 0-10.
pub fn after_hours_score(
    stats: &MemberStatsBundle,
    weights: &WeightConfig,
    config: &ScoringConfig,
) -> f64 {
    let blended: f64 = weights
        .effective_for(stats)
        .iter()
        .map(|(pct, weight)| pct * weight)
        .sum();
    clamp_factor(blended / config.after_hours_saturation_pct * FACTOR_MAX)
}

pub fn weekend_score(weekend_pct: f64, config: &ScoringConfig) -> f64 {
    clamp_factor(weekend_pct / config.weekend_saturation_pct * FACTOR_MAX)
}

/// Fast acknowledgement means high pressure.
pub fn response_pressure_score(avg_minutes: f64, config: &ScoringConfig) -> f64 {
    let floor = config.response_pressure_floor_minutes;
    let ceiling = config.response_pressure_ceiling_minutes;
    if avg_minutes <= floor {
        return FACTOR_MAX;
    }
    clamp_factor((ceiling - avg_minutes) / (ceiling - floor) * FACTOR_MAX)
}

pub fn incident_load_score(weighted_load: f64, window_weeks: f64, config: &ScoringConfig) -> f64 {
    let weekly = weighted_load / window_weeks.max(f64::EPSILON);
    clamp_factor(weekly / config.incident_load_ceiling_per_week * FACTOR_MAX)
}

pub fn calculate_factors(
    stats: &MemberStatsBundle,
    weights: &WeightConfig,
    config: &ScoringConfig,
) -> Result<FactorScoreSet> {
    validate_stats(stats)?;

    if stats.incident_count == 0 {
        return Ok(FactorScoreSet::default());
    }

    let response_time_pressure = if stats.acknowledged_count == 0 {
        0.0
    } else {
        response_pressure_score(stats.avg_response_minutes, config)
    };

    Ok(FactorScoreSet {
        workload: workload_score(stats.incidents_per_week),
        after_hours: after_hours_score(stats, weights, config),
        weekend_work: weekend_score(stats.weekend_incident_pct, config),
        response_time_pressure,
        incident_load: incident_load_score(
            stats.severity_weighted_load,
            stats.window_weeks,
            config,
        ),
    })
}
