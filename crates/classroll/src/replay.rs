//! Batch replay with one tracker task per session
//!
//! Batches are read as newline-delimited JSON and routed by session key.
//! Each session gets its own task and queue, so batches for one meeting
//! are processed strictly in order while separate meetings run
//! concurrently.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use classroll_api::{Event, EventBatch, EventPayload};
use classroll_config::Policy;
use classroll_core::{BatchOutcome, CoreEvent, SessionRegistry, SessionTracker};
use classroll_util::{SessionKey, resolve_timestamp, try_parse_calendar_day};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Batches buffered per session before the reader waits
const SESSION_QUEUE_DEPTH: usize = 64;

/// One line of replay output
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutputLine {
    Outcome(BatchOutcome),
    Event(Event),
}

pub async fn run(policy: Policy, batches: Option<PathBuf>, emit_events: bool) -> Result<()> {
    let input: Box<dyn AsyncRead + Unpin + Send> = match batches {
        Some(path) if path.as_os_str() != "-" => Box::new(
            tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open batch file {:?}", path))?,
        ),
        _ => Box::new(tokio::io::stdin()),
    };

    let registry = SessionRegistry::new(policy);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutputLine>();

    let printer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => error!(error = %e, "Failed to serialize output"),
            }
        }
    });

    let mut sessions: HashMap<SessionKey, mpsc::Sender<EventBatch>> = HashMap::new();
    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(input).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read batch input")?
    {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let batch: EventBatch = match serde_json::from_str(line) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed batch");
                continue;
            }
        };

        let key = match SessionRegistry::session_key(&batch) {
            Ok(key) => key,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping batch");
                continue;
            }
        };

        if !sessions.contains_key(&key) {
            let tracker = registry.new_tracker(&batch)?;
            let (tx, rx) = mpsc::channel(SESSION_QUEUE_DEPTH);
            tasks.spawn(run_session(tracker, rx, out_tx.clone(), emit_events));
            sessions.insert(key.clone(), tx);
        }

        if let Some(tx) = sessions.get(&key)
            && tx.send(batch).await.is_err()
        {
            warn!(session = %key, "Session task stopped early");
        }
    }

    // Closing the queues lets each session task drain and exit
    let session_count = sessions.len();
    drop(sessions);
    drop(out_tx);

    let mut processed = 0;
    while let Some(joined) = tasks.join_next().await {
        processed += joined.context("Session task panicked")?;
    }
    printer.await.context("Output task failed")?;

    info!(sessions = session_count, batches = processed, "Replay complete");
    Ok(())
}

async fn run_session(
    mut tracker: SessionTracker,
    mut batches: mpsc::Receiver<EventBatch>,
    out: mpsc::UnboundedSender<OutputLine>,
    emit_events: bool,
) -> usize {
    let mut count = 0;

    while let Some(batch) = batches.recv().await {
        let now = batch_time(&batch);
        let outcome = tracker.process_batch(&batch, now);
        count += 1;

        let mut lines: Vec<OutputLine> = if emit_events {
            progress_events(&outcome, now)
                .into_iter()
                .map(OutputLine::Event)
                .collect()
        } else {
            Vec::new()
        };
        lines.push(OutputLine::Outcome(outcome));

        if lines.into_iter().any(|line| out.send(line).is_err()) {
            warn!(session = %tracker.key(), "Output closed, stopping session");
            break;
        }
    }

    debug!(
        session = %tracker.key(),
        batches = count,
        finalized = tracker.is_finalized(),
        "Session drained"
    );
    count
}

/// Capture time of a batch, falling back to the wall clock
fn batch_time(batch: &EventBatch) -> DateTime<Utc> {
    let now = classroll_util::now();
    let Some(captured) = batch.captured_at.as_deref() else {
        return now;
    };

    let base = batch
        .session_date
        .as_deref()
        .and_then(try_parse_calendar_day)
        .unwrap_or(now);

    resolve_timestamp(captured, base).unwrap_or_else(|| {
        debug!(value = %captured, "Unparseable capture time, using current time");
        now
    })
}

/// Progress events for one batch outcome
fn progress_events(outcome: &BatchOutcome, now: DateTime<Utc>) -> Vec<Event> {
    let session = &outcome.session;
    let mut events: Vec<Event> = outcome
        .events
        .iter()
        .filter_map(|event| match event {
            CoreEvent::ParticipantJoined {
                token,
                display_name,
            } => Some(EventPayload::ParticipantJoined {
                token: *token,
                display_name: display_name.clone(),
            }),
            CoreEvent::ParticipantLeft {
                token,
                display_name,
            } => Some(EventPayload::ParticipantLeft {
                token: *token,
                display_name: display_name.clone(),
            }),
            CoreEvent::StatusChanged { token, from, to } => Some(EventPayload::StatusChanged {
                token: *token,
                from: *from,
                to: *to,
            }),
            CoreEvent::MeetingFinalized { host_left_at } => Some(EventPayload::MeetingFinalized {
                host_left_at: *host_left_at,
            }),
            // Counted in the batch metadata
            CoreEvent::ParticipantEvicted { .. } | CoreEvent::DuplicatesCollapsed { .. } => None,
        })
        .map(|payload| Event::new(session.clone(), now, payload))
        .collect();

    events.push(Event::new(
        session.clone(),
        now,
        EventPayload::BatchProcessed {
            heartbeat: outcome.heartbeat,
            metadata: outcome.metadata.clone(),
        },
    ));
    events
}
