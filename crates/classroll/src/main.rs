//! classroll - attendance status derivation and policy engine
//!
//! This is the main entry point for the classroll tool.
//! It wires together all the components:
//! - Configuration loading
//! - Batch replay through per-session trackers
//! - Policy thresholds and student standing reports

mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use classroll_api::{AttendanceTally, ScheduleInput, SessionOutcome};
use classroll_config::{Policy, ScheduleConfig, load_config};
use classroll_core::{PolicyEngine, tally_from_history};
use classroll_util::{SubjectId, default_config_path};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// classroll - Attendance tracking for online class meetings
#[derive(Parser, Debug)]
#[command(name = "classroll")]
#[command(about = "Attendance status derivation and policy engine", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/classroll/config.toml)
    #[arg(short, long, env = "CLASSROLL_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay captured batches (one JSON object per line) and print outcomes
    Replay {
        /// Batch file; reads stdin when omitted or "-"
        #[arg(short, long)]
        batches: Option<PathBuf>,

        /// Also print progress events
        #[arg(short, long)]
        events: bool,
    },

    /// Print policy thresholds for configured subjects
    Thresholds {
        /// Only this subject
        #[arg(short, long)]
        subject: Option<String>,

        /// Ad-hoc schedule as JSON instead of a configured subject
        #[arg(long, conflicts_with = "subject")]
        schedule_json: Option<String>,
    },

    /// Evaluate one student's standing in a subject
    Status {
        #[arg(short, long)]
        subject: String,

        #[arg(long, default_value_t = 0)]
        absences: u32,

        #[arg(long, default_value_t = 0)]
        tardies: u32,

        #[arg(long, default_value_t = 0)]
        consecutive_weeks: u32,

        /// JSON array of {date, status} session outcomes; replaces the counts
        #[arg(long, conflicts_with_all = ["absences", "tardies", "consecutive_weeks"])]
        history: Option<PathBuf>,
    },
}

fn load_policy(path: Option<&PathBuf>) -> Result<Policy> {
    let (path, explicit) = match path {
        Some(p) => (p.clone(), true),
        None => (default_config_path(), false),
    };

    if !explicit && !path.exists() {
        info!(
            config_path = %path.display(),
            "No configuration file, using institutional defaults"
        );
        return Ok(Policy::default());
    }

    let policy = load_config(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    info!(
        config_path = %path.display(),
        subject_count = policy.subjects.len(),
        "Configuration loaded"
    );
    Ok(policy)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn thresholds(policy: &Policy, subject: Option<String>, schedule_json: Option<String>) -> Result<()> {
    let engine = PolicyEngine::new(policy.constants);

    if let Some(json) = schedule_json {
        let input: ScheduleInput =
            serde_json::from_str(&json).context("Failed to parse schedule JSON")?;
        let schedule = ScheduleConfig::from_input(&input);
        return print_json(&engine.thresholds(&schedule));
    }

    let mut report = BTreeMap::new();
    for s in &policy.subjects {
        if subject.as_deref().is_some_and(|id| id != s.id.as_str()) {
            continue;
        }
        if !s.schedule.is_active {
            debug!(subject_id = %s.id, "Skipping inactive subject");
            continue;
        }
        report.insert(s.id.as_str(), engine.thresholds(&s.schedule));
    }

    if let Some(id) = subject
        && report.is_empty()
    {
        anyhow::bail!("Subject not found: {}", id);
    }

    print_json(&report)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StandingReport {
    subject_id: SubjectId,
    tally: AttendanceTally,
    thresholds: classroll_api::PolicyThresholds,
    status: classroll_api::StudentPolicyStatus,
    df: classroll_api::DfEligibility,
}

fn standing(policy: &Policy, subject: String, tally: AttendanceTally) -> Result<()> {
    let subject_id = SubjectId::new(subject);
    let subject = policy
        .get_subject(&subject_id)
        .with_context(|| format!("Subject not found: {}", subject_id))?;

    let engine = PolicyEngine::new(policy.constants);
    let thresholds = engine.thresholds(&subject.schedule);

    print_json(&StandingReport {
        status: engine.student_status(&thresholds, &tally),
        df: engine.evaluate_df(&thresholds, &tally),
        subject_id,
        tally,
        thresholds,
    })
}

fn read_history(path: &Path) -> Result<AttendanceTally> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history from {:?}", path))?;
    let history: Vec<SessionOutcome> =
        serde_json::from_str(&content).context("Failed to parse session history")?;
    Ok(tally_from_history(&history))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the JSON output
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "classroll starting");

    let policy = load_policy(args.config.as_ref())?;

    match args.command {
        Command::Replay { batches, events } => replay::run(policy, batches, events).await,
        Command::Thresholds {
            subject,
            schedule_json,
        } => thresholds(&policy, subject, schedule_json),
        Command::Status {
            subject,
            absences,
            tardies,
            consecutive_weeks,
            history,
        } => {
            let tally = match history {
                Some(path) => read_history(&path)?,
                None => AttendanceTally {
                    direct_absences: absences,
                    tardiness_count: tardies,
                    consecutive_weeks_absent: consecutive_weeks,
                },
            };
            standing(&policy, subject, tally)
        }
    }
}
