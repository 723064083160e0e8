use std::collections::HashMap;
use std::fmt::Write;

use crate::models::{ActivityWindow, MemberOutcome, RiskLevel};
use crate::risk;
use crate::sources::SourceSet;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskLevelSummary {
    pub risk_level: RiskLevel,
    pub count: usize,
    pub avg_score: f64,
}

/// Member counts per risk level, most severe first. Members flagged as
/// insufficient data are left out.
pub fn summarize_by_level(outcomes: &[MemberOutcome]) -> Vec<RiskLevelSummary> {
    let mut map: HashMap<RiskLevel, (usize, f64)> = HashMap::new();

    for analysis in outcomes.iter().filter_map(|o| o.outcome.as_ref().ok()) {
        if analysis.insufficient_data {
            continue;
        }
        let entry = map.entry(analysis.result.risk_level).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += analysis.result.final_score;
    }

    RiskLevel::all()
        .into_iter()
        .filter_map(|risk_level| {
            map.get(&risk_level).map(|(count, total)| RiskLevelSummary {
                risk_level,
                count: *count,
                avg_score: if *count == 0 {
                    0.0
                } else {
                    total / *count as f64
                },
            })
        })
        .collect()
}

pub fn build_report(
    scope: Option<&str>,
    window: &ActivityWindow,
    sources: &SourceSet,
    outcomes: &[MemberOutcome],
) -> String {
    let ranked: Vec<_> = risk::rank_members(outcomes)
        .into_iter()
        .filter(|analysis| !analysis.insufficient_data)
        .collect();
    let summaries = summarize_by_level(outcomes);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all teams");

    let _ = writeln!(output, "# On-call Burnout Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} to {}, sources: {})",
        scope_label,
        window.start().format("%Y-%m-%d"),
        window.end().format("%Y-%m-%d"),
        sources
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No members with incidents in this window.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} members (avg score {:.1})",
                summary.risk_level, summary.count, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Members");

    if ranked.is_empty() {
        let _ = writeln!(output, "No members with incidents in this window.");
    } else {
        for analysis in ranked.iter().take(10) {
            let (dimension, dimension_score) = analysis.result.dimensions.dominant();
            let _ = writeln!(
                output,
                "- {} ({}) score {} [{}], health {:.0}, {} incidents, driven by {} ({:.0})",
                analysis.display_name(),
                analysis.member_id,
                analysis.result.display_score(),
                analysis.result.risk_level,
                analysis.result.health_score(),
                analysis.stats.incident_count,
                dimension,
                dimension_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Factor Breakdown");

    if ranked.is_empty() {
        let _ = writeln!(output, "No factors to show.");
    } else {
        let _ = writeln!(
            output,
            "| member | workload | after hours | weekend | response pressure | incident load |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for analysis in ranked.iter().take(10) {
            let factors = &analysis.result.factors;
            let _ = writeln!(
                output,
                "| {} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} |",
                analysis.display_name(),
                factors.workload,
                factors.after_hours,
                factors.weekend_work,
                factors.response_time_pressure,
                factors.incident_load
            );
        }
    }

    let insufficient: Vec<_> = outcomes
        .iter()
        .filter_map(|o| o.outcome.as_ref().ok())
        .filter(|analysis| analysis.insufficient_data)
        .collect();
    if !insufficient.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Insufficient Data");
        for analysis in insufficient {
            let _ = writeln!(
                output,
                "- {} ({}): no incidents in this window",
                analysis.display_name(),
                analysis.member_id
            );
        }
    }

    let failures: Vec<_> = outcomes
        .iter()
        .filter_map(|o| o.outcome.as_ref().err().map(|err| (o, err)))
        .collect();
    if !failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Scoring Errors");
        for (outcome, err) in failures {
            let _ = writeln!(
                output,
                "- {}: {}",
                outcome.name.as_deref().unwrap_or(&outcome.member_id),
                err
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoringError;
    use crate::models::{
        BurnoutResult, DimensionScoreSet, FactorScoreSet, MemberAnalysis, MemberStatsBundle,
    };
    use chrono::DateTime;

    fn window() -> ActivityWindow {
        ActivityWindow::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap(),
            DateTime::parse_from_rfc3339("2026-01-31T00:00:00Z").unwrap(),
        )
        .unwrap()
    }

    fn outcome(id: &str, score: f64, incidents: u32) -> MemberOutcome {
        let analysis = MemberAnalysis {
            member_id: id.to_string(),
            name: Some(format!("Engineer {id}")),
            stats: MemberStatsBundle {
                incident_count: incidents,
                window_weeks: 30.0 / 7.0,
                ..MemberStatsBundle::default()
            },
            result: BurnoutResult {
                final_score: score,
                risk_level: RiskLevel::from_score(score),
                dimensions: DimensionScoreSet {
                    emotional_exhaustion: score,
                    depersonalization: score / 2.0,
                    reduced_accomplishment: score / 3.0,
                },
                factors: FactorScoreSet::default(),
            },
            insufficient_data: incidents == 0,
        };
        MemberOutcome {
            member_id: id.to_string(),
            name: analysis.name.clone(),
            outcome: Ok(analysis),
        }
    }

    #[test]
    fn summarizes_levels_most_severe_first() {
        let outcomes = vec![
            outcome("a", 10.0, 2),
            outcome("b", 80.0, 9),
            outcome("c", 20.0, 3),
            outcome("d", 0.0, 0),
        ];
        let summaries = summarize_by_level(&outcomes);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].risk_level, RiskLevel::Critical);
        assert_eq!(summaries[1].risk_level, RiskLevel::Low);
        assert_eq!(summaries[1].count, 2);
        assert!((summaries[1].avg_score - 15.0).abs() < 1e-9);
    }

    #[test]
    fn report_lists_ranked_members_and_flags() {
        let outcomes = vec![
            outcome("a", 30.0, 4),
            outcome("b", 62.4, 11),
            outcome("new", 0.0, 0),
            MemberOutcome {
                member_id: "broken".to_string(),
                name: None,
                outcome: Err(ScoringError::InvalidStatsBundle(
                    "weekend_incident_pct must be within [0, 100], got 140".to_string(),
                )),
            },
        ];
        let report = build_report(
            Some("platform"),
            &window(),
            &SourceSet::incidents_only(),
            &outcomes,
        );

        assert!(report.starts_with("# On-call Burnout Report"));
        assert!(report
            .contains("Generated for platform (2026-01-01 to 2026-01-31, sources: incidents)"));
        let b = report.find("Engineer b (b) score 62 [high]").unwrap();
        let a = report.find("Engineer a (a) score 30 [moderate]").unwrap();
        assert!(b < a);
        assert!(report.contains("health 38"));
        assert!(report.contains("## Insufficient Data"));
        assert!(report.contains("Engineer new (new): no incidents"));
        assert!(report.contains("## Scoring Errors"));
        assert!(report.contains("- broken: Invalid stats bundle"));
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(None, &window(), &SourceSet::incidents_only(), &[]);
        assert!(report.contains("all teams"));
        assert!(report.contains("No members with incidents in this window."));
        assert!(!report.contains("## Scoring Errors"));
    }
}
