use crate::error::{Result, ScoringError};
use crate::factors::FACTOR_MAX;
use crate::models::{BurnoutResult, DimensionScoreSet, FactorScoreSet, RiskLevel};

pub const EMOTIONAL_EXHAUSTION_WEIGHT: f64 = 0.4;
pub const DEPERSONALIZATION_WEIGHT: f64 = 0.3;
pub const REDUCED_ACCOMPLISHMENT_WEIGHT: f64 = 0.3;

fn check_factors(factors: &FactorScoreSet) -> Result<()> {
    for (name, value) in factors.iter() {
        if !(0.0..=FACTOR_MAX).contains(&value) {
            return Err(ScoringError::InvalidStatsBundle(format!(
                "factor {name} must be within [0, {FACTOR_MAX}], got {value}"
            )));
        }
    }
    Ok(())
}

fn scaled(value: f64) -> f64 {
    (value * 10.0).clamp(0.0, 100.0)
}

pub fn compose_dimensions(factors: &FactorScoreSet) -> DimensionScoreSet {
    DimensionScoreSet {
        emotional_exhaustion: scaled(
            factors.workload * 0.5 + factors.after_hours * 0.3 + factors.incident_load * 0.2,
        ),
        depersonalization: scaled(
            factors.response_time_pressure * 0.5 + factors.weekend_work * 0.5,
        ),
        // Proxy for lost effectiveness.
        reduced_accomplishment: scaled(
            factors.response_time_pressure * 0.5 + factors.incident_load * 0.5,
        ),
    }
}

pub fn final_score(dimensions: &DimensionScoreSet) -> f64 {
    let score = dimensions.emotional_exhaustion * EMOTIONAL_EXHAUSTION_WEIGHT
        + dimensions.depersonalization * DEPERSONALIZATION_WEIGHT
        + dimensions.reduced_accomplishment * REDUCED_ACCOMPLISHMENT_WEIGHT;
    score.clamp(0.0, 100.0)
}

pub fn compose(factors: FactorScoreSet) -> Result<BurnoutResult> {
    check_factors(&factors)?;

    let dimensions = compose_dimensions(&factors);
    let final_score = final_score(&dimensions);

    Ok(BurnoutResult {
        final_score,
        risk_level: RiskLevel::from_score(final_score),
        dimensions,
        factors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn weights_match_cbi_mapping() {
        let factors = FactorScoreSet {
            workload: 8.0,
            after_hours: 5.0,
            weekend_work: 2.0,
            response_time_pressure: 6.0,
            incident_load: 4.0,
        };
        let dims = compose_dimensions(&factors);
        assert!(close(dims.emotional_exhaustion, 63.0));
        assert!(close(dims.depersonalization, 40.0));
        assert!(close(dims.reduced_accomplishment, 50.0));

        let result = compose(factors).unwrap();
        assert!(close(result.final_score, 25.2 + 12.0 + 15.0));
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.display_score(), 52);
    }

    #[test]
    fn zero_factors_are_low_risk() {
        let result = compose(FactorScoreSet::default()).unwrap();
        assert_eq!(result.final_score, 0.0);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.health_score(), 100.0);
    }

    #[test]
    fn maximum_factors_are_critical() {
        let result = compose(FactorScoreSet {
            workload: 10.0,
            after_hours: 10.0,
            weekend_work: 10.0,
            response_time_pressure: 10.0,
            incident_load: 10.0,
        })
        .unwrap();
        assert!(close(result.final_score, 100.0));
        assert_eq!(result.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn rejects_malformed_factors() {
        let err = compose(FactorScoreSet {
            workload: 11.0,
            ..FactorScoreSet::default()
        })
        .unwrap_err();
        assert!(matches!(err, ScoringError::InvalidStatsBundle(_)));
        assert!(compose(FactorScoreSet {
            incident_load: f64::NAN,
            ..FactorScoreSet::default()
        })
        .is_err());
    }

    #[test]
    fn composing_twice_is_bit_identical() {
        let factors = FactorScoreSet {
            workload: 3.444,
            after_hours: 1.7,
            weekend_work: 0.3,
            response_time_pressure: 9.1,
            incident_load: 2.2,
        };
        let first = compose(factors).unwrap();
        let second = compose(factors).unwrap();
        assert_eq!(first.final_score.to_bits(), second.final_score.to_bits());
        assert_eq!(first, second);
    }
}
