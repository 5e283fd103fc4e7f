// src/pipeline/scheduler.rs
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use once_cell::sync::OnceCell;
use regex::Regex;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::{Orchestrator, RunTrigger};
use crate::error::{SyncError, SyncResult};

pub const DEFAULT_CRON_SCHEDULE: &str = "0 */6 * * *";

fn five_field_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^\S+(\s+\S+){4}$").expect("valid cron shape regex"))
}

/// True when `expr` has the shape of a standard 5-field cron expression.
pub fn is_five_field(expr: &str) -> bool {
    five_field_re().is_match(expr.trim())
}

const DOW_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Standard cron numbers weekdays 0-7 with Sunday as 0 and 7; the job scheduler's parser
/// counts 1-7 from Sunday. Numeric weekdays are rewritten to names, which both agree on.
fn dow_index(raw: &str) -> SyncResult<Option<usize>> {
    match raw.parse::<usize>() {
        Ok(n) if n <= 7 => Ok(Some(n)),
        Ok(n) => Err(SyncError::Config(format!("day of week {n} is out of range 0-7"))),
        // a name such as MON, left to the parser
        Err(_) => Ok(None),
    }
}

fn dow_token(raw: &str) -> SyncResult<String> {
    Ok(match dow_index(raw)? {
        Some(n) => DOW_NAMES[n % 7].to_string(),
        None => raw.to_ascii_uppercase(),
    })
}

fn rewrite_dow_item(item: &str) -> SyncResult<String> {
    let (base, step) = match item.split_once('/') {
        Some((b, s)) => (b, Some(s)),
        None => (item, None),
    };
    let base = match base.split_once('-') {
        None if base == "*" || base == "?" => base.to_string(),
        None => dow_token(base)?,
        Some((lo, hi)) => match (dow_index(lo)?, dow_index(hi)?) {
            (Some(0), Some(7)) => "SUN-SAT".to_string(),
            (Some(7), Some(7)) => "SUN".to_string(),
            // names cannot wrap past Saturday, so a range ending on 7 lists Sunday separately
            (Some(lo), Some(7)) if step.is_none() => format!("{}-SAT,SUN", DOW_NAMES[lo]),
            (Some(_), Some(7)) => {
                return Err(SyncError::Config(format!(
                    "day-of-week range {item:?} with a step is not supported"
                )));
            }
            _ => format!("{}-{}", dow_token(lo)?, dow_token(hi)?),
        },
    };
    Ok(match step {
        Some(s) => format!("{base}/{s}"),
        None => base,
    })
}

/// The job scheduler wants a leading seconds field (fire at second 0) and its own weekday
/// numbering.
pub fn to_six_field(expr: &str) -> SyncResult<String> {
    let expr = expr.trim();
    if !is_five_field(expr) {
        return Err(SyncError::Config(format!(
            "cron schedule must have 5 fields (min hour dom month dow), got {expr:?}"
        )));
    }
    let mut fields: Vec<String> = expr.split_whitespace().map(str::to_string).collect();
    fields[4] = fields[4]
        .split(',')
        .map(rewrite_dow_item)
        .collect::<SyncResult<Vec<_>>>()?
        .join(",");
    Ok(format!("0 {}", fields.join(" ")))
}

/// Convert and parse `expr` with the scheduler's own cron parser.
pub fn parse_schedule(expr: &str) -> SyncResult<cron::Schedule> {
    let six = to_six_field(expr)?;
    cron::Schedule::from_str(&six)
        .map_err(|e| SyncError::Config(format!("invalid cron schedule {expr:?}: {e}")))
}

/// Register the recurring sync job and start ticking.
///
/// The returned scheduler must be kept alive and shut down on exit.
pub async fn start_scheduler(
    orchestrator: Arc<Orchestrator>,
    cron: &str,
) -> anyhow::Result<JobScheduler> {
    parse_schedule(cron)?;
    let schedule = to_six_field(cron)?;
    let scheduler = JobScheduler::new().await.context("creating scheduler")?;

    let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let orch = orchestrator.clone();
        Box::pin(async move {
            // Outcome is logged and recorded by the orchestrator.
            let _ = orch.trigger(RunTrigger::Schedule).await;
        })
    })
    .with_context(|| format!("creating sync job for cron {cron}"))?;

    scheduler.add(job).await.context("adding sync job")?;
    scheduler.start().await.context("starting scheduler")?;

    tracing::info!(target: "pipeline", cron, "sync schedule armed");
    Ok(scheduler)
}

/// One run at boot when enabled; spawned so it never delays the listener.
pub fn spawn_startup_run(orchestrator: Arc<Orchestrator>, enabled: bool) -> Option<JoinHandle<()>> {
    if !enabled {
        tracing::info!(target: "pipeline", "startup sync disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let outcome = orchestrator.trigger(RunTrigger::Startup).await;
        tracing::info!(target: "pipeline", outcome = outcome.label(), "startup sync finished");
    }))
}
