use std::cmp::Ordering;

use chrono::{Offset, Utc};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{ActivityWindow, MemberActivity, MemberAnalysis, MemberOutcome};
use crate::sources::{resolve_weights, SourceSet};
use crate::BurnoutEngine;

/// Trailing window of `since_days` days ending now.
pub fn analysis_window(since_days: i64) -> Result<ActivityWindow> {
    let now = Utc::now().with_timezone(&Utc.fix());
    ActivityWindow::ending_at(now, since_days)
}

/// Sources for a team run: the declared set if any, otherwise whatever the
/// members' activity shows.
pub fn team_sources(members: &[MemberActivity], declared: Option<&SourceSet>) -> SourceSet {
    if let Some(declared) = declared {
        return declared.clone();
    }
    let mut sources = SourceSet::incidents_only();
    for member in members {
        sources.extend(&SourceSet::detect(
            member.commits.as_deref(),
            member.messages.as_deref(),
        ));
    }
    sources
}

/// Score every member in parallel. A failure for one member is recorded in
/// that member's outcome and does not affect the others.
pub fn analyze_team(
    engine: &BurnoutEngine,
    window: &ActivityWindow,
    members: &[MemberActivity],
    sources: &SourceSet,
) -> Result<Vec<MemberOutcome>> {
    let weights = resolve_weights(sources)?;

    let outcomes: Vec<MemberOutcome> = members
        .par_iter()
        .map(|member| MemberOutcome {
            member_id: member.member_id.clone(),
            name: member.name.clone(),
            outcome: engine.analyze(window, member, &weights),
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.outcome.is_err()).count();
    for outcome in &outcomes {
        if let Err(err) = &outcome.outcome {
            warn!(member_id = %outcome.member_id, error = %err, "member could not be scored");
        }
    }
    info!(
        members = outcomes.len(),
        failed,
        sources = %sources,
        "team analysis complete"
    );

    Ok(outcomes)
}

/// Successful analyses ordered by final score, highest first.
pub fn rank_members(outcomes: &[MemberOutcome]) -> Vec<&MemberAnalysis> {
    let mut ranked: Vec<&MemberAnalysis> = outcomes
        .iter()
        .filter_map(|outcome| outcome.outcome.as_ref().ok())
        .collect();
    ranked.sort_by(|a, b| {
        b.result
            .final_score
            .partial_cmp(&a.result.final_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.member_id.cmp(&b.member_id))
    });
    ranked
}
