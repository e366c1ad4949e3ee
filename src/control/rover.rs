//! rover.rs
//! Ground-rover task: 50 Hz loop owning the mode arbiter.
//!
//! Consumes `joystick_input`, `cmd_vel` and `estimator_odometry`; publishes
//! `status` and the differential-drive `actuators` every cycle.

use std::{sync::Arc, time::Duration};

use crate::bus::{Node, Publication, Subscription, TopicBus, catalog};
use crate::config::{RoverConfig, VehicleKind};
use crate::error::BusError;
use crate::messages::{Actuators, Header, Joy, Odometry, Status, Twist};

use super::mixer::differential_drive;
use super::mode::{ModeArbiter, record_event};
use super::task::{ControlLoop, ReleaseTimer, StepOutcome, TaskContext, reject};

pub const TASK_NAME: &str = "rover";

pub struct RoverTask {
    joy: Subscription<Joy>,
    cmd_vel: Subscription<Twist>,
    odometry: Subscription<Odometry>,
    status: Publication<Status>,
    actuators: Publication<Actuators>,
    arbiter: ModeArbiter,
    config: RoverConfig,
    ctx: TaskContext,
    timer: ReleaseTimer,
    seq: u64,
    _node: Node,
}

impl RoverTask {
    pub fn new(bus: &Arc<TopicBus>, config: &RoverConfig, ctx: TaskContext) -> Result<Self, BusError> {
        let mut node = bus.create_node(TASK_NAME);
        let joy = node.subscribe(catalog::JOYSTICK_INPUT, Joy::default(), 10)?;
        let cmd_vel = node.subscribe(catalog::CMD_VEL, Twist::default(), 10)?;
        let odometry = node.subscribe(catalog::ESTIMATOR_ODOMETRY, Odometry::default(), 10)?;
        let status = node.advertise(catalog::STATUS)?;
        let actuators = node.advertise(catalog::ACTUATORS)?;

        Ok(Self {
            joy,
            cmd_vel,
            odometry,
            status,
            actuators,
            arbiter: ModeArbiter::new(VehicleKind::GroundRover, config.joy.clone()),
            config: config.clone(),
            ctx,
            timer: ReleaseTimer::new(config.period()),
            seq: 0,
            _node: node,
        })
    }

    pub fn arbiter(&self) -> &ModeArbiter {
        &self.arbiter
    }

    /// Last pose received from the estimator.
    pub fn odometry(&self) -> &Odometry {
        self.odometry.get()
    }
}

impl ControlLoop for RoverTask {
    fn name(&self) -> &'static str {
        TASK_NAME
    }

    /// Timer-driven: sleeps until the next release of the configured rate.
    fn wait_drive(&mut self, _timeout: Duration) -> bool {
        self.timer.wait();
        true
    }

    fn drain(&mut self) {
        if self.joy.update_if_available() {
            let joy = self.joy.get().clone();
            for event in self.arbiter.handle_joy(&joy) {
                record_event(&self.ctx, TASK_NAME, &event);
            }
        }
        if self.cmd_vel.update_if_available() {
            let twist = *self.cmd_vel.get();
            self.arbiter.handle_cmd_vel(&twist);
        }
        self.odometry.update_if_available();
    }

    fn step(&mut self, _dt: f64) -> StepOutcome {
        let status = self.arbiter.status();
        if let Err(e) = self.status.publish(status) {
            return reject(TASK_NAME, &e);
        }

        let (v, omega) = self.arbiter.velocity_command();
        let mut msg = differential_drive(&self.config.geometry, v, omega, status.armed);
        self.seq += 1;
        msg.header = Header { stamp_ns: self.ctx.clock.now_ns(), seq: self.seq, frame_id: "base_link" };

        match self.actuators.publish(msg) {
            Ok(_) => StepOutcome::Published,
            Err(e) => reject(TASK_NAME, &e),
        }
    }
}
