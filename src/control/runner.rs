//! runner.rs
//! Task lifecycle and the start/stop/status command contract.
//!
//! Each runner owns one control task thread:
//! Idle -> Running -> StopRequested -> Joined -> (Running again on start).
//! Stopping only clears the running flag; the loop notices it after its
//! current bounded wait and tears its node down on the way out.

use log::{error, info, warn};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};
use thread_priority::{ThreadBuilderExt, ThreadPriority, ThreadPriorityValue};

use crate::error::{BusError, TaskError};

use super::task::{ControlLoop, LoopTiming, PeriodicTask, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running,
    StopRequested,
    Joined,
}

/// Builds a fresh controller (and node) for every start.
pub type LoopFactory = Box<dyn Fn() -> Result<Box<dyn ControlLoop>, BusError> + Send>;

/// Boxes a typed constructor into a [`LoopFactory`].
pub fn factory<L, F>(make: F) -> LoopFactory
where
    L: ControlLoop + 'static,
    F: Fn() -> Result<L, BusError> + Send + 'static,
{
    Box::new(move || -> Result<Box<dyn ControlLoop>, BusError> { Ok(Box::new(make()?)) })
}

/// Reply to a shell command: exit code plus the text shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellReply {
    pub code: i32,
    pub text: String,
}

impl ShellReply {
    fn ok(text: impl Into<String>) -> Self {
        Self { code: 0, text: text.into() }
    }
}

pub struct TaskRunner {
    name: &'static str,
    priority: u8,
    timing: LoopTiming,
    ctx: TaskContext,
    factory: LoopFactory,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    state: TaskState,
}

impl TaskRunner {
    pub fn new(
        name: &'static str,
        priority: u8,
        timing: LoopTiming,
        ctx: TaskContext,
        factory: LoopFactory,
    ) -> Self {
        Self {
            name,
            priority,
            timing,
            ctx,
            factory,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            state: TaskState::Idle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&mut self) -> TaskState {
        self.reap();
        self.state
    }

    /// Join a thread that already left its loop.
    fn reap(&mut self) {
        let finished = self.handle.as_ref().is_some_and(|h| h.is_finished());
        if finished {
            self.join();
        }
    }

    /// Ok(false) if the task was already running.
    pub fn start(&mut self) -> Result<bool, TaskError> {
        // a thread that died on a panic never cleared its flag
        self.reap();
        if self.is_running() {
            info!("[{}] already running", self.name);
            return Ok(false);
        }
        // a stop may still be draining its last wait
        self.join();

        let control = (self.factory)()?;
        let priority = match ThreadPriorityValue::try_from(self.priority) {
            Ok(value) => ThreadPriority::Crossplatform(value),
            Err(e) => {
                warn!("[{}] priority {} out of range ({}), using max", self.name, self.priority, e);
                ThreadPriority::Max
            }
        };

        self.running.store(true, Ordering::Release);
        let running = self.running.clone();
        let ctx = self.ctx.clone();
        let timing = self.timing;
        let name = self.name;

        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn_with_priority(priority, move |res| {
                if let Err(e) = res {
                    warn!("[{}] could not set thread priority: {:?}", name, e);
                }
                PeriodicTask::new(control, timing, ctx).run(running);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = TaskState::Running;
                Ok(true)
            }
            Err(source) => {
                self.running.store(false, Ordering::Release);
                error!("[{}] spawn failed: {}", name, source);
                Err(TaskError::Spawn { name, source })
            }
        }
    }

    /// Clear the running flag. Returns false if the task was not running.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            info!("[{}] not running", self.name);
            return false;
        }
        self.running.store(false, Ordering::Release);
        self.state = TaskState::StopRequested;
        true
    }

    /// Wait for the task thread to exit; bounded by the loop's wait timeout
    /// once a stop was requested.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[{}] task thread panicked", self.name);
            }
            self.running.store(false, Ordering::Release);
            self.state = TaskState::Joined;
        }
    }

    /// `start` / `stop` / `status`; exactly one argument.
    pub fn shell(&mut self, argv: &[&str]) -> ShellReply {
        if argv.len() != 1 {
            error!("[{}] must have one argument", self.name);
            return ShellReply { code: -1, text: "must have one argument".into() };
        }
        self.reap();

        match argv[0] {
            "start" => match self.start() {
                Ok(true) => ShellReply::ok("started"),
                Ok(false) => ShellReply::ok("already running"),
                Err(e) => ShellReply::ok(e.to_string()),
            },
            "stop" => {
                if self.stop() {
                    ShellReply::ok("stopping")
                } else {
                    ShellReply::ok("not running")
                }
            }
            "status" => ShellReply::ok(format!("running: {}", self.is_running() as i32)),
            other => {
                warn!("[{}] unknown command '{}'", self.name, other);
                ShellReply::ok(format!("unknown command: {}", other))
            }
        }
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}
