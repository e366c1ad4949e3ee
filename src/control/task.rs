//! task.rs
//! Periodic control-task pattern shared by every controller:
//!
//! wait on the drive subscription (bounded) -> check running flag ->
//! drain every pending subscription -> dt window check -> control step.
//!
//! A timed-out wait, an inadmissible dt and a non-finite step result all skip
//! the cycle; none of them end the task. Only clearing the running flag does.

use log::{debug, error, info};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::clock::SharedClock;
use crate::utils::metrics::{self, Event, EventKind, EventRecorder, SharedMetrics, push_capped};

/// Result of one control step once dt was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Published,
    /// Nothing to do in the current mode; downstream holds its last value.
    Idle,
    /// Output was not finite (or could not be published); last good value stays.
    Rejected,
}

/// What happened in one iteration of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    Stopped,
    Timeout,
    InvalidDt(f64),
    Step(StepOutcome),
}

/// A controller body plugged into [`PeriodicTask`].
pub trait ControlLoop: Send {
    fn name(&self) -> &'static str;

    /// Block until the drive source fires or `timeout` elapses.
    /// Returns false on timeout.
    fn wait_drive(&mut self, timeout: Duration) -> bool;

    /// Copy in the latest value of every subscription that has one.
    fn drain(&mut self);

    /// Run the control law for an admissible `dt` (seconds).
    fn step(&mut self, dt: f64) -> StepOutcome;
}

impl<T: ControlLoop + ?Sized> ControlLoop for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn wait_drive(&mut self, timeout: Duration) -> bool {
        (**self).wait_drive(timeout)
    }

    fn drain(&mut self) {
        (**self).drain()
    }

    fn step(&mut self, dt: f64) -> StepOutcome {
        (**self).step(dt)
    }
}

/// Drive-wait deadline and admissible dt ceiling of one loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTiming {
    pub wait_timeout: Duration,
    pub dt_max: f64,
}

impl LoopTiming {
    pub fn new(wait_timeout: Duration, dt_max: f64) -> Self {
        Self { wait_timeout, dt_max }
    }

    #[inline]
    pub fn admits(&self, dt: f64) -> bool {
        dt >= 0.0 && dt <= self.dt_max
    }
}

/// Fixed-rate release for timer-driven loops (no drive topic).
pub struct ReleaseTimer {
    period: Duration,
    sleeper: SpinSleeper,
    next_release: Instant,
}

impl ReleaseTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
            next_release: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep until the next release.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next_release > now {
            self.sleeper.sleep(self.next_release - now);
            self.next_release += self.period;
        } else {
            // overrun: re-phase instead of bursting to catch up
            self.next_release = now + self.period;
        }
    }
}

/// Everything a task needs besides its own subscriptions.
#[derive(Clone)]
pub struct TaskContext {
    pub clock: SharedClock,
    pub metrics: SharedMetrics,
    pub recorder: EventRecorder,
}

impl TaskContext {
    pub fn new(clock: SharedClock, metrics: SharedMetrics, recorder: EventRecorder) -> Self {
        Self { clock, metrics, recorder }
    }

    pub(crate) fn event(&self, task: &'static str, kind: EventKind) -> Event {
        Event::new(self.clock.now_ns(), task, kind)
    }
}

pub struct PeriodicTask<L: ControlLoop> {
    control: L,
    timing: LoopTiming,
    ctx: TaskContext,
    last_ns: u64,
}

impl<L: ControlLoop> PeriodicTask<L> {
    pub fn new(control: L, timing: LoopTiming, ctx: TaskContext) -> Self {
        let last_ns = ctx.clock.now_ns();
        Self { control, timing, ctx, last_ns }
    }

    pub fn control(&self) -> &L {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut L {
        &mut self.control
    }

    /// One loop iteration. `running` is checked right after the wait returns.
    pub fn run_once(&mut self, running: &AtomicBool) -> CycleOutcome {
        let name = self.control.name();
        let woke = self.control.wait_drive(self.timing.wait_timeout);

        if !running.load(Ordering::Acquire) {
            return CycleOutcome::Stopped;
        }

        if !woke {
            debug!("[{}] drive topic timed out after {:?}", name, self.timing.wait_timeout);
            metrics::lock(&self.ctx.metrics).task(name).timeouts += 1;
            self.ctx.recorder.record(self.ctx.event(name, EventKind::Timeout));
            return CycleOutcome::Timeout;
        }

        self.control.drain();

        // dt is measured between consecutive accepted wake-ups, so one long
        // gap costs exactly one cycle
        let now_ns = self.ctx.clock.now_ns();
        let dt = (now_ns as i128 - self.last_ns as i128) as f64 * 1e-9;
        self.last_ns = now_ns;

        if !self.timing.admits(dt) {
            debug!("[{}] rejecting dt {:.4} s (ceiling {} s)", name, dt, self.timing.dt_max);
            {
                let mut m = metrics::lock(&self.ctx.metrics);
                let c = m.task(name);
                c.cycles += 1;
                c.dt_rejections += 1;
            }
            self.ctx
                .recorder
                .record(self.ctx.event(name, EventKind::DtRejected).with_dt(dt));
            return CycleOutcome::InvalidDt(dt);
        }

        let outcome = self.control.step(dt);

        let kind = {
            let mut m = metrics::lock(&self.ctx.metrics);
            let c = m.task(name);
            c.cycles += 1;
            push_capped(&mut c.dt_history, dt);
            match outcome {
                StepOutcome::Published => {
                    c.publishes += 1;
                    EventKind::Published
                }
                StepOutcome::Idle => {
                    c.idle += 1;
                    EventKind::Idle
                }
                StepOutcome::Rejected => {
                    c.numeric_rejections += 1;
                    EventKind::NonFinite
                }
            }
        };
        if kind == EventKind::NonFinite {
            self.ctx.recorder.record(self.ctx.event(name, kind).with_dt(dt));
        }

        CycleOutcome::Step(outcome)
    }

    /// Loop until `running` is cleared; the controller (and its node) is
    /// dropped on return.
    pub fn run(mut self, running: Arc<AtomicBool>) {
        let name = self.control.name();
        info!("[{}] init", name);
        self.last_ns = self.ctx.clock.now_ns();

        while self.run_once(&running) != CycleOutcome::Stopped {}

        info!("[{}] fini", name);
        drop(self.control);
        running.store(false, Ordering::Release);
    }
}

/// Logs and counts a step that produced unusable output.
pub(crate) fn reject(task: &'static str, what: &dyn std::fmt::Display) -> StepOutcome {
    error!("[{}] {}", task, what);
    StepOutcome::Rejected
}
