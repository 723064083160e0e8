use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    ActivityEvent, ActivityKind, ActivityWindow, IncidentRecord, MemberActivity, MemberOutcome,
    Severity, Timestamp,
};
use crate::sources::SourceSet;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn offset_minutes(at: &Timestamp) -> i32 {
    at.offset().local_minus_utc() / 60
}

fn with_offset(at: DateTime<Utc>, minutes: i32) -> anyhow::Result<Timestamp> {
    let offset = FixedOffset::east_opt(minutes * 60)
        .with_context(|| format!("stored utc offset {minutes} minutes is out of range"))?;
    Ok(at.with_timezone(&offset))
}

async fn upsert_member(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    team: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO oncall_burnout.members (id, full_name, email, team)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, team = EXCLUDED.team
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(team)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn insert_incident(
    pool: &PgPool,
    member_id: Uuid,
    incident: &IncidentRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO oncall_burnout.incidents
        (id, member_id, opened_at, opened_offset_minutes, acknowledged_at,
         acknowledged_offset_minutes, resolved_at, resolved_offset_minutes, severity, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(member_id)
    .bind(incident.opened_at.with_timezone(&Utc))
    .bind(offset_minutes(&incident.opened_at))
    .bind(incident.acknowledged_at.map(|at| at.with_timezone(&Utc)))
    .bind(incident.acknowledged_at.as_ref().map(offset_minutes))
    .bind(incident.resolved_at.map(|at| at.with_timezone(&Utc)))
    .bind(incident.resolved_at.as_ref().map(offset_minutes))
    .bind(incident.severity.as_str())
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_event(
    pool: &PgPool,
    member_id: Uuid,
    kind: ActivityKind,
    occurred_at: &Timestamp,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO oncall_burnout.activity_events
        (id, member_id, kind, occurred_at, occurred_offset_minutes, source_key)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(member_id)
    .bind(kind.as_str())
    .bind(occurred_at.with_timezone(&Utc))
    .bind(offset_minutes(occurred_at))
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let members = vec![
        ("Avery Lee", "avery.lee@example.com", "platform", -300, 18, 9),
        ("Jules Moreno", "jules.moreno@example.com", "payments", 60, 6, 31),
        ("Kiara Patel", "kiara.patel@example.com", "platform", 330, 11, 17),
    ];
    let severities = [
        Severity::Critical,
        Severity::High,
        Severity::Low,
        Severity::Medium,
        Severity::Low,
    ];
    let now = Utc::now();

    for (name, email, team, offset, incident_count, step_hours) in members {
        let member_id = upsert_member(pool, name, email, team).await?;
        let zone = FixedOffset::east_opt(offset * 60).context("invalid seed offset")?;

        for i in 0..incident_count {
            let opened_at =
                (now - Duration::hours(3 + step_hours * i as i64)).with_timezone(&zone);
            let incident = IncidentRecord {
                member_id: email.to_string(),
                opened_at,
                acknowledged_at: (i % 4 != 3)
                    .then(|| opened_at + Duration::minutes(3 + 7 * (i as i64 % 5))),
                severity: severities[i % severities.len()],
                resolved_at: Some(opened_at + Duration::hours(2)),
            };
            insert_incident(pool, member_id, &incident, &format!("seed-{email}-incident-{i}"))
                .await?;
        }

        if team == "platform" {
            for i in 0..24i64 {
                let occurred_at = (now - Duration::hours(5 + 11 * i)).with_timezone(&zone);
                insert_event(
                    pool,
                    member_id,
                    ActivityKind::Commit,
                    &occurred_at,
                    &format!("seed-{email}-commit-{i}"),
                )
                .await?;
            }
        }
        if email.starts_with("kiara") {
            for i in 0..40i64 {
                let occurred_at = (now - Duration::hours(2 + 7 * i)).with_timezone(&zone);
                insert_event(
                    pool,
                    member_id,
                    ActivityKind::Message,
                    &occurred_at,
                    &format!("seed-{email}-message-{i}"),
                )
                .await?;
            }
        }
    }

    Ok(())
}

/// Which CSV export is being imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ImportKind {
    Incidents,
    Commits,
    Messages,
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path, kind: ImportKind) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct IncidentRow {
        full_name: String,
        email: String,
        team: String,
        opened_at: Timestamp,
        acknowledged_at: Option<Timestamp>,
        resolved_at: Option<Timestamp>,
        severity: Severity,
        source_key: Option<String>,
    }

    #[derive(serde::Deserialize)]
    struct EventRow {
        full_name: String,
        email: String,
        team: String,
        occurred_at: Timestamp,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    match kind {
        ImportKind::Incidents => {
            for (line, result) in reader.deserialize::<IncidentRow>().enumerate() {
                let row = result.with_context(|| format!("bad incident row {}", line + 1))?;
                let member_id = upsert_member(pool, &row.full_name, &row.email, &row.team).await?;
                let source_key = row
                    .source_key
                    .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
                let incident = IncidentRecord {
                    member_id: row.email,
                    opened_at: row.opened_at,
                    acknowledged_at: row.acknowledged_at,
                    severity: row.severity,
                    resolved_at: row.resolved_at,
                };
                if insert_incident(pool, member_id, &incident, &source_key).await? {
                    inserted += 1;
                }
            }
        }
        ImportKind::Commits | ImportKind::Messages => {
            let event_kind = if kind == ImportKind::Commits {
                ActivityKind::Commit
            } else {
                ActivityKind::Message
            };
            for (line, result) in reader.deserialize::<EventRow>().enumerate() {
                let row = result.with_context(|| format!("bad event row {}", line + 1))?;
                let member_id = upsert_member(pool, &row.full_name, &row.email, &row.team).await?;
                let source_key = row
                    .source_key
                    .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
                if insert_event(pool, member_id, event_kind, &row.occurred_at, &source_key).await? {
                    inserted += 1;
                }
            }
        }
    }

    info!(inserted, kind = ?kind, path = %csv_path.display(), "csv import finished");
    Ok(inserted)
}

fn scope_filter(
    column_prefix: &str,
    team: Option<&str>,
    email: Option<&str>,
    param: usize,
) -> String {
    if team.is_some() {
        format!(" AND {column_prefix}.team = ${param}")
    } else if email.is_some() {
        format!(" AND {column_prefix}.email = ${param}")
    } else {
        String::new()
    }
}

/// Load every member in scope with their incidents and events for `window`.
/// Members keyed by email; members without any incidents are still returned.
pub async fn fetch_member_activity(
    pool: &PgPool,
    window: &ActivityWindow,
    team: Option<&str>,
    email: Option<&str>,
) -> anyhow::Result<Vec<MemberActivity>> {
    let scope_value = team.or(email);
    let start = window.start().with_timezone(&Utc);
    let end = window.end().with_timezone(&Utc);

    let mut members: BTreeMap<String, MemberActivity> = BTreeMap::new();

    let mut member_query =
        String::from("SELECT m.full_name, m.email FROM oncall_burnout.members m WHERE TRUE");
    member_query.push_str(&scope_filter("m", team, email, 1));
    let mut rows = sqlx::query(&member_query);
    if let Some(value) = scope_value {
        rows = rows.bind(value);
    }
    for row in rows.fetch_all(pool).await? {
        let member_email: String = row.get("email");
        let mut activity = MemberActivity::new(member_email.clone());
        activity.name = Some(row.get("full_name"));
        members.insert(member_email, activity);
    }

    let mut incident_query = String::from(
        "SELECT m.email, i.opened_at, i.opened_offset_minutes, i.acknowledged_at, \
         i.acknowledged_offset_minutes, i.resolved_at, i.resolved_offset_minutes, i.severity \
         FROM oncall_burnout.incidents i \
         JOIN oncall_burnout.members m ON m.id = i.member_id \
         WHERE i.opened_at >= $1 AND i.opened_at < $2",
    );
    incident_query.push_str(&scope_filter("m", team, email, 3));
    let mut rows = sqlx::query(&incident_query).bind(start).bind(end);
    if let Some(value) = scope_value {
        rows = rows.bind(value);
    }
    for row in rows.fetch_all(pool).await? {
        let member_email: String = row.get("email");
        let severity: String = row.get("severity");
        let incident = IncidentRecord {
            member_id: member_email.clone(),
            opened_at: with_offset(row.get("opened_at"), row.get("opened_offset_minutes"))?,
            acknowledged_at: optional_stamp(
                row.get("acknowledged_at"),
                row.get("acknowledged_offset_minutes"),
            )?,
            severity: severity.parse().map_err(anyhow::Error::msg)?,
            resolved_at: optional_stamp(
                row.get("resolved_at"),
                row.get("resolved_offset_minutes"),
            )?,
        };
        members
            .entry(member_email.clone())
            .or_insert_with(|| MemberActivity::new(member_email))
            .incidents
            .push(incident);
    }

    let mut event_query = String::from(
        "SELECT m.email, e.kind, e.occurred_at, e.occurred_offset_minutes \
         FROM oncall_burnout.activity_events e \
         JOIN oncall_burnout.members m ON m.id = e.member_id \
         WHERE e.occurred_at >= $1 AND e.occurred_at < $2",
    );
    event_query.push_str(&scope_filter("m", team, email, 3));
    let mut rows = sqlx::query(&event_query).bind(start).bind(end);
    if let Some(value) = scope_value {
        rows = rows.bind(value);
    }
    for row in rows.fetch_all(pool).await? {
        let member_email: String = row.get("email");
        let kind: String = row.get("kind");
        let event = ActivityEvent {
            member_id: member_email.clone(),
            occurred_at: with_offset(row.get("occurred_at"), row.get("occurred_offset_minutes"))?,
            kind: kind.parse().map_err(anyhow::Error::msg)?,
        };
        let member = members
            .entry(member_email.clone())
            .or_insert_with(|| MemberActivity::new(member_email));
        let bucket = match event.kind {
            ActivityKind::Commit => &mut member.commits,
            ActivityKind::Message => &mut member.messages,
        };
        bucket.get_or_insert_with(Vec::new).push(event);
    }

    debug!(members = members.len(), "loaded member activity");
    Ok(members.into_values().collect())
}

fn optional_stamp(
    at: Option<DateTime<Utc>>,
    minutes: Option<i32>,
) -> anyhow::Result<Option<Timestamp>> {
    match at {
        Some(at) => with_offset(at, minutes.unwrap_or(0)).map(Some),
        None => Ok(None),
    }
}

/// Persist one analysis run and the score of every successfully scored
/// member. Returns the run id.
pub async fn save_analysis(
    pool: &PgPool,
    scope: Option<&str>,
    window: &ActivityWindow,
    sources: &SourceSet,
    outcomes: &[MemberOutcome],
) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let source_names: Vec<String> = sources.iter().map(|s| s.as_str().to_string()).collect();

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO oncall_burnout.analysis_runs (id, scope, window_start, window_end, sources)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(run_id)
    .bind(scope)
    .bind(window.start().with_timezone(&Utc))
    .bind(window.end().with_timezone(&Utc))
    .bind(source_names)
    .execute(&mut *tx)
    .await?;

    for analysis in outcomes.iter().filter_map(|o| o.outcome.as_ref().ok()) {
        let result = &analysis.result;
        sqlx::query(
            r#"
            INSERT INTO oncall_burnout.member_scores
            (run_id, member_id, final_score, risk_level, emotional_exhaustion, depersonalization,
             reduced_accomplishment, workload, after_hours, weekend_work, response_time_pressure,
             incident_load, incident_count, insufficient_data)
            SELECT $1, m.id, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
            FROM oncall_burnout.members m WHERE m.email = $2
            "#,
        )
        .bind(run_id)
        .bind(&analysis.member_id)
        .bind(result.final_score)
        .bind(result.risk_level.as_str())
        .bind(result.dimensions.emotional_exhaustion)
        .bind(result.dimensions.depersonalization)
        .bind(result.dimensions.reduced_accomplishment)
        .bind(result.factors.workload)
        .bind(result.factors.after_hours)
        .bind(result.factors.weekend_work)
        .bind(result.factors.response_time_pressure)
        .bind(result.factors.incident_load)
        .bind(analysis.stats.incident_count as i32)
        .bind(analysis.insufficient_data)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(%run_id, "analysis run saved");
    Ok(run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_survive_the_utc_round_trip() {
        let original = DateTime::parse_from_rfc3339("2026-01-05T23:30:00-05:00").unwrap();
        let minutes = offset_minutes(&original);
        assert_eq!(minutes, -300);

        let restored = with_offset(original.with_timezone(&Utc), minutes).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.to_rfc3339(), original.to_rfc3339());
    }

    #[test]
    fn rejects_impossible_offsets() {
        assert!(with_offset(Utc::now(), 24 * 60).is_err());
    }

    #[test]
    fn scope_filter_prefers_team() {
        assert_eq!(scope_filter("m", Some("platform"), None, 3), " AND m.team = $3");
        assert_eq!(scope_filter("m", None, Some("a@example.com"), 1), " AND m.email = $1");
        assert_eq!(scope_filter("m", None, None, 1), "");
    }
}
