//! Metrics collection and event recording for the control tasks.
//!
//! Two independent paths:
//! - **Metrics:** shared mutex-guarded counters per task (cycles, timeouts,
//!   rejected cycles, publishes) plus a bounded dt history.
//! - **EventRecorder:** lock-free queue drained by a background CSV exporter.
//!   `record()` never blocks; events are dropped when the queue is full.

use crossbeam_queue::ArrayQueue;
use log::{debug, error};
use serde::Serialize;
use std::{
    collections::{BTreeMap, VecDeque},
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Timeout,
    DtRejected,
    NonFinite,
    Published,
    Idle,
    Armed,
    Disarmed,
    ModeChanged,
    ModeRejected,
}

/// One row of the event log.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub ts_ns: u64,
    pub task: &'static str,
    pub kind: EventKind,
    pub dt_s: f64,
    pub detail: &'static str,
}

impl Event {
    pub fn new(ts_ns: u64, task: &'static str, kind: EventKind) -> Self {
        Self { ts_ns, task, kind, dt_s: 0.0, detail: "" }
    }

    pub fn with_dt(mut self, dt_s: f64) -> Self {
        self.dt_s = dt_s;
        self
    }

    pub fn with_detail(mut self, detail: &'static str) -> Self {
        self.detail = detail;
        self
    }
}

const EVENT_QUEUE_CAPACITY: usize = 16_384;

/// Non-blocking event recorder with background CSV export. Clones share the
/// same queue.
#[derive(Clone)]
pub struct EventRecorder {
    queue: Arc<ArrayQueue<Event>>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { queue: Arc::new(ArrayQueue::new(capacity)) }
    }

    /// Appends event to queue (lock-free). Silently drops if queue full.
    #[inline]
    pub fn record(&self, event: Event) {
        let _ = self.queue.push(event);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pop everything currently queued.
    pub fn drain(&self) -> Vec<Event> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop() {
            out.push(event);
        }
        out
    }

    /// Spawns a thread draining the queue into `output_csv` until `stop` is
    /// set and the queue is empty.
    pub fn start_exporter(&self, output_csv: PathBuf, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
        let queue = self.queue.clone();

        thread::spawn(move || {
            let mut writer = match csv::Writer::from_path(&output_csv) {
                Ok(w) => w,
                Err(e) => {
                    error!("failed to create event csv {:?}: {}", output_csv, e);
                    return;
                }
            };

            let mut written = 0u64;
            loop {
                match queue.pop() {
                    Some(event) => {
                        if let Err(e) = writer.serialize(&event) {
                            error!("event csv write failed: {}", e);
                            break;
                        }
                        written += 1;
                    }
                    None => {
                        if stop.load(Ordering::Acquire) && queue.is_empty() {
                            break;
                        }
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }

            if let Err(e) = writer.flush() {
                error!("event csv flush failed: {}", e);
            }
            debug!("event exporter wrote {} rows to {:?}", written, output_csv);
        })
    }
}

pub const MAX_POINTS: usize = 1_000;

/// Per-task cycle accounting.
#[derive(Debug, Default, Clone)]
pub struct TaskCounters {
    pub cycles: u64,
    pub timeouts: u64,
    pub dt_rejections: u64,
    pub numeric_rejections: u64,
    pub publishes: u64,
    pub idle: u64,
    /// Accepted dt values in seconds (last 1000)
    pub dt_history: VecDeque<f64>,
}

impl TaskCounters {
    pub fn mean_dt(&self) -> Option<f64> {
        if self.dt_history.is_empty() {
            return None;
        }
        Some(self.dt_history.iter().sum::<f64>() / self.dt_history.len() as f64)
    }

    pub fn max_dt(&self) -> Option<f64> {
        self.dt_history.iter().copied().reduce(f64::max)
    }
}

#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub tasks: BTreeMap<&'static str, TaskCounters>,
    pub arbiter_transitions: u64,
    pub arbiter_rejections: u64,
}

impl Metrics {
    pub fn task(&mut self, name: &'static str) -> &mut TaskCounters {
        self.tasks.entry(name).or_default()
    }
}

pub type SharedMetrics = Arc<Mutex<Metrics>>;

pub fn shared_metrics() -> SharedMetrics {
    Arc::new(Mutex::new(Metrics::default()))
}

/// Lock metrics; a panicked task must not take monitoring down with it.
pub fn lock(metrics: &SharedMetrics) -> MutexGuard<'_, Metrics> {
    match metrics.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Appends value to metrics buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}
