use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use oncall_burnout::config::AppConfig;
use oncall_burnout::db::{self, ImportKind};
use oncall_burnout::models::{MemberOutcome, TeamActivity};
use oncall_burnout::{
    report, risk, telemetry, BurnoutEngine, DataSource, ScoringConfig, SourceSet,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

#[derive(Parser)]
#[command(name = "burnout-score")]
#[command(about = "Burnout risk scoring for on-call engineers", long_about = None)]
struct Cli {
    /// JSON file overriding the default scoring configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import incidents, commits, or messages from a CSV export
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum, default_value_t = ImportKind::Incidents)]
        kind: ImportKind,
    },
    /// Score burnout risk across members
    #[command(group(
        ArgGroup::new("scope")
            .args(["team", "email"])
            .multiple(false)
    ))]
    Score {
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Connected sources; detected from the data when omitted
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<DataSource>>,
        /// Persist the analysis run
        #[arg(long)]
        save: bool,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("scope")
            .args(["team", "email"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, value_delimiter = ',')]
        sources: Option<Vec<DataSource>>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Score a team activity JSON file without a database
    Analyze {
        #[arg(long)]
        input: PathBuf,
        /// Write a markdown report instead of printing the ranking
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print full results as JSON
        #[arg(long)]
        json: bool,
    },
}

async fn connect(app: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = app
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

fn load_engine(path: Option<&Path>) -> anyhow::Result<BurnoutEngine> {
    let config = match path {
        Some(path) => ScoringConfig::from_path(path)?,
        None => ScoringConfig::default(),
    };
    Ok(BurnoutEngine::new(config))
}

fn declared_sources(sources: Option<Vec<DataSource>>) -> Option<SourceSet> {
    sources.map(|list| list.into_iter().collect())
}

fn print_ranking(outcomes: &[MemberOutcome], limit: usize) {
    let ranked = risk::rank_members(outcomes);
    if ranked.is_empty() {
        println!("No members could be scored for this window.");
        return;
    }

    println!("Top members by burnout score:");
    for analysis in ranked.iter().take(limit) {
        if analysis.insufficient_data {
            println!(
                "- {} ({}): insufficient data",
                analysis.display_name(),
                analysis.member_id
            );
            continue;
        }
        println!(
            "- {} ({}) score {} [{}] across {} incidents",
            analysis.display_name(),
            analysis.member_id,
            analysis.result.display_score(),
            analysis.result.risk_level,
            analysis.stats.incident_count
        );
    }

    for outcome in outcomes {
        if let Err(err) = &outcome.outcome {
            println!("! {} could not be scored: {}", outcome.member_id, err);
        }
    }
}

fn outcomes_json(outcomes: &[MemberOutcome]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|outcome| match &outcome.outcome {
            Ok(analysis) => json!({ "member_id": outcome.member_id, "analysis": analysis }),
            Err(err) => json!({ "member_id": outcome.member_id, "error": err.to_string() }),
        })
        .collect();
    serde_json::Value::Array(entries)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app = AppConfig::load();
    telemetry::init(&app.log_level)?;

    let engine = load_engine(cli.config.as_deref())?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&app).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&app).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv, kind } => {
            let pool = connect(&app).await?;
            let inserted = db::import_csv(&pool, &csv, kind).await?;
            println!("Inserted {inserted} records from {}.", csv.display());
        }
        Commands::Score {
            team,
            email,
            since_days,
            limit,
            sources,
            save,
        } => {
            let pool = connect(&app).await?;
            let window = risk::analysis_window(since_days)?;
            let members =
                db::fetch_member_activity(&pool, &window, team.as_deref(), email.as_deref())
                    .await?;
            let sources = risk::team_sources(&members, declared_sources(sources).as_ref());
            let outcomes = risk::analyze_team(&engine, &window, &members, &sources)?;

            print_ranking(&outcomes, limit);

            if save {
                let run_id = db::save_analysis(
                    &pool,
                    team.as_deref().or(email.as_deref()),
                    &window,
                    &sources,
                    &outcomes,
                )
                .await?;
                println!("Saved analysis run {run_id}.");
            }
        }
        Commands::Report {
            team,
            email,
            since_days,
            sources,
            out,
        } => {
            let pool = connect(&app).await?;
            let window = risk::analysis_window(since_days)?;
            let members =
                db::fetch_member_activity(&pool, &window, team.as_deref(), email.as_deref())
                    .await?;
            let sources = risk::team_sources(&members, declared_sources(sources).as_ref());
            let outcomes = risk::analyze_team(&engine, &window, &members, &sources)?;
            let report = report::build_report(
                team.as_deref().or(email.as_deref()),
                &window,
                &sources,
                &outcomes,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Analyze { input, out, json } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let team: TeamActivity = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", input.display()))?;
            let declared = declared_sources(team.sources.clone());
            let sources = risk::team_sources(&team.members, declared.as_ref());
            info!(members = team.members.len(), sources = %sources, "analyzing team file");

            let outcomes = risk::analyze_team(&engine, &team.window, &team.members, &sources)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes_json(&outcomes))?);
            } else if let Some(out) = out {
                let report = report::build_report(None, &team.window, &sources, &outcomes);
                std::fs::write(&out, report)?;
                println!("Report written to {}.", out.display());
            } else {
                print_ranking(&outcomes, usize::MAX);
            }
        }
    }

    Ok(())
}
