// src/sched/mod.rs
//! Recurring job scheduler driving the monitoring cycles.
//!
//! One background task per job computes the next firing, sleeps,
//! and starts runs. Per-job overlap control: a run still in flight
//! counts against `max_instances`; beyond the cap a firing is either
//! skipped or, with coalescing, collapsed into a single deferred run
//! that starts as soon as a slot frees.

pub mod cron;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub use cron::CronExpr;

/// When a job fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Every fixed duration from registration time, independent of
    /// how long runs take.
    Interval(Duration),
    /// Wall-clock instants matching a five-field cron spec.
    Cron(CronExpr),
    /// Every N minutes, but only while the wall-clock hour is inside
    /// [start_hour, end_hour]. Lowered to an hour-range cron rule, so
    /// firings anchor to minute boundaries, not to window entry.
    DailyRange {
        start_hour: u8,
        end_hour: u8,
        every_minutes: u32,
    },
}

impl Trigger {
    pub fn daily_range(start_hour: u8, end_hour: u8, every_minutes: u32) -> Result<Self> {
        // validate the lowering eagerly so registration fails loudly
        let expr = format!("*/{every_minutes} {start_hour}-{end_hour} * * *");
        CronExpr::parse(&expr)?;
        Ok(Trigger::DailyRange {
            start_hour,
            end_hour,
            every_minutes,
        })
    }

    fn lowered(&self) -> Result<Option<CronExpr>> {
        match self {
            Trigger::DailyRange {
                start_hour,
                end_hour,
                every_minutes,
            } => Ok(Some(CronExpr::parse(&format!(
                "*/{every_minutes} {start_hour}-{end_hour} * * *"
            ))?)),
            _ => Ok(None),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Trigger::Interval(d) => format!("interval[{}s]", d.as_secs()),
            Trigger::Cron(c) => format!("cron[{}]", c.expression()),
            Trigger::DailyRange {
                start_hour,
                end_hour,
                every_minutes,
            } => format!("daily[{start_hour:02}-{end_hour:02}h every {every_minutes}m]"),
        }
    }

    /// Next firing strictly after `after`. `anchor` is the
    /// registration instant used by interval triggers.
    fn next_after(
        &self,
        anchor: DateTime<Utc>,
        after: DateTime<Utc>,
        lowered: &Option<CronExpr>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval(d) => {
                let period = ChronoDuration::from_std(*d).ok()?;
                if period <= ChronoDuration::zero() {
                    return None;
                }
                let elapsed = after - anchor;
                let pms = period.num_milliseconds().max(1);
                let k = if elapsed < ChronoDuration::zero() {
                    0
                } else {
                    elapsed.num_milliseconds() / pms + 1
                };
                Some(anchor + period * (k as i32))
            }
            Trigger::Cron(c) => c.next_after(after),
            Trigger::DailyRange { .. } => lowered.as_ref().and_then(|c| c.next_after(after)),
        }
    }
}

/// Job registration: identity, firing policy, overlap control.
#[derive(Clone)]
pub struct JobSpec {
    pub id: String,
    pub trigger: Trigger,
    pub coalesce: bool,
    pub max_instances: usize,
}

impl JobSpec {
    pub fn new(id: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: id.into(),
            trigger,
            coalesce: true,
            max_instances: 3,
        }
    }

    pub fn coalesce(mut self, coalesce: bool) -> Self {
        self.coalesce = coalesce;
        self
    }

    pub fn max_instances(mut self, n: usize) -> Self {
        self.max_instances = n.max(1);
        self
    }
}

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

struct JobShared {
    next_run: Mutex<Option<DateTime<Utc>>>,
    running: AtomicUsize,
    runs_started: AtomicU64,
    runs_skipped: AtomicU64,
    /// A coalesced firing waiting for a free slot.
    pending: AtomicBool,
    slot_freed: Notify,
}

struct JobHandle {
    trigger_desc: String,
    coalesce: bool,
    max_instances: usize,
    shared: Arc<JobShared>,
    task: JoinHandle<()>,
}

/// Per-job view returned by the status query.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub trigger: String,
    pub next_run: Option<DateTime<Utc>>,
    pub running: usize,
    pub runs_started: u64,
    pub runs_skipped: u64,
    pub coalesce: bool,
    pub max_instances: usize,
}

/// Registry plus the background loops. Constructed explicitly and
/// passed around; tests instantiate isolated schedulers freely.
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JobHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and start its scheduling loop. An existing job
    /// with the same id is replaced.
    pub fn register<F, Fut>(&self, spec: JobSpec, f: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let lowered = spec.trigger.lowered()?;
        let job_fn: JobFn = Arc::new(move || Box::pin(f()) as JobFuture);

        let shared = Arc::new(JobShared {
            next_run: Mutex::new(None),
            running: AtomicUsize::new(0),
            runs_started: AtomicU64::new(0),
            runs_skipped: AtomicU64::new(0),
            pending: AtomicBool::new(false),
            slot_freed: Notify::new(),
        });

        let task = tokio::spawn(job_loop(
            spec.clone(),
            lowered,
            Arc::clone(&shared),
            job_fn,
        ));

        let handle = JobHandle {
            trigger_desc: spec.trigger.describe(),
            coalesce: spec.coalesce,
            max_instances: spec.max_instances,
            shared,
            task,
        };

        let mut jobs = self.jobs.lock().expect("scheduler mutex poisoned");
        if let Some(old) = jobs.insert(spec.id.clone(), handle) {
            old.task.abort();
            tracing::info!(job = %spec.id, "replaced existing job");
        } else {
            tracing::info!(job = %spec.id, trigger = %spec.trigger.describe(), "registered job");
        }
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().expect("scheduler mutex poisoned");
        if let Some(handle) = jobs.remove(id) {
            handle.task.abort();
            tracing::info!(job = %id, "unregistered job");
            true
        } else {
            false
        }
    }

    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().expect("scheduler mutex poisoned");
        for (id, handle) in jobs.drain() {
            handle.task.abort();
            tracing::debug!(job = %id, "stopped job");
        }
        tracing::info!("scheduler shut down");
    }

    pub fn status(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.lock().expect("scheduler mutex poisoned");
        let mut out: Vec<JobStatus> = jobs
            .iter()
            .map(|(id, h)| JobStatus {
                id: id.clone(),
                trigger: h.trigger_desc.clone(),
                next_run: *h.shared.next_run.lock().expect("job mutex poisoned"),
                running: h.shared.running.load(Ordering::SeqCst),
                runs_started: h.shared.runs_started.load(Ordering::SeqCst),
                runs_skipped: h.shared.runs_skipped.load(Ordering::SeqCst),
                coalesce: h.coalesce,
                max_instances: h.max_instances,
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(mut jobs) = self.jobs.lock() {
            for (_, handle) in jobs.drain() {
                handle.task.abort();
            }
        }
    }
}

async fn job_loop(
    spec: JobSpec,
    lowered: Option<CronExpr>,
    shared: Arc<JobShared>,
    job_fn: JobFn,
) {
    let anchor = Utc::now();
    loop {
        let Some(next) = spec.trigger.next_after(anchor, Utc::now(), &lowered) else {
            tracing::warn!(job = %spec.id, "trigger has no future firing, job idle");
            *shared.next_run.lock().expect("job mutex poisoned") = None;
            return;
        };
        *shared.next_run.lock().expect("job mutex poisoned") = Some(next);

        // Sleep until the firing, waking early whenever a slot frees
        // and a coalesced run is pending.
        loop {
            let remaining = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(remaining) => break,
                _ = shared.slot_freed.notified() => {
                    if shared.pending.load(Ordering::SeqCst)
                        && shared.running.load(Ordering::SeqCst) < spec.max_instances
                        && shared.pending.swap(false, Ordering::SeqCst)
                    {
                        start_run(&spec, &shared, &job_fn);
                    }
                }
            }
        }

        // Count ticks that are already due; lateness beyond one tick
        // means the loop was delayed.
        let now = Utc::now();
        let mut due = 1u32;
        let mut t = next;
        while let Some(following) = spec.trigger.next_after(anchor, t, &lowered) {
            if following > now || due >= 1000 {
                break;
            }
            due += 1;
            t = following;
        }
        let firings = if spec.coalesce { 1 } else { due };
        if spec.coalesce && due > 1 {
            tracing::debug!(job = %spec.id, missed = due - 1, "coalescing missed firings");
        }

        for _ in 0..firings {
            if shared.running.load(Ordering::SeqCst) < spec.max_instances {
                start_run(&spec, &shared, &job_fn);
            } else if spec.coalesce {
                // collapse everything blocked behind the cap into one
                // deferred run
                shared.pending.store(true, Ordering::SeqCst);
            } else {
                shared.runs_skipped.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    job = %spec.id,
                    max_instances = spec.max_instances,
                    "run skipped, concurrent instance cap reached"
                );
            }
        }
    }
}

fn start_run(spec: &JobSpec, shared: &Arc<JobShared>, job_fn: &JobFn) {
    shared.running.fetch_add(1, Ordering::SeqCst);
    shared.runs_started.fetch_add(1, Ordering::SeqCst);

    let fut = job_fn();
    let shared = Arc::clone(shared);
    let job_id = spec.id.clone();
    tokio::spawn(async move {
        // Inner spawn so a panicking run is contained and observed,
        // never taking the scheduling loop down with it.
        match tokio::spawn(fut).await {
            Ok(Ok(())) => tracing::debug!(job = %job_id, "run finished"),
            Ok(Err(e)) => tracing::error!(job = %job_id, error = ?e, "run failed"),
            Err(e) => tracing::error!(job = %job_id, error = %e, "run panicked"),
        }
        shared.running.fetch_sub(1, Ordering::SeqCst);
        shared.slot_freed.notify_one();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_next_fire_is_anchored_to_registration() {
        let anchor = Utc::now();
        let t = Trigger::Interval(Duration::from_secs(60));
        let next = t.next_after(anchor, anchor, &None).unwrap();
        assert_eq!(next, anchor + ChronoDuration::seconds(60));
        // three and a half periods later, the 4th tick is next
        let after = anchor + ChronoDuration::seconds(210);
        let next = t.next_after(anchor, after, &None).unwrap();
        assert_eq!(next, anchor + ChronoDuration::seconds(240));
    }

    #[test]
    fn daily_range_lowers_to_hour_restricted_cron() {
        let t = Trigger::daily_range(6, 22, 5).unwrap();
        assert_eq!(t.describe(), "daily[06-22h every 5m]");
        let lowered = t.lowered().unwrap().unwrap();
        assert_eq!(lowered.expression(), "*/5 6-22 * * *");
    }

    #[test]
    fn daily_range_validates_eagerly() {
        assert!(Trigger::daily_range(6, 25, 5).is_err());
    }
}
