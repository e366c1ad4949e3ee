//! flight_mode.rs
//! Multirotor arbiter task: owns the vehicle's mode state, turns
//! `joystick_input` events into arm/mode transitions and publishes `status`
//! every cycle. It is the only writer of `status` on a rotor vehicle.

use std::{sync::Arc, time::Duration};

use crate::bus::{Node, Publication, Subscription, TopicBus, catalog};
use crate::config::{FlightModeConfig, VehicleKind};
use crate::error::BusError;
use crate::messages::{Joy, Status};

use super::mode::{ModeArbiter, record_event};
use super::task::{ControlLoop, ReleaseTimer, StepOutcome, TaskContext, reject};

pub const TASK_NAME: &str = "flight_mode";

pub struct FlightModeTask {
    joy: Subscription<Joy>,
    status: Publication<Status>,
    arbiter: ModeArbiter,
    ctx: TaskContext,
    timer: ReleaseTimer,
    _node: Node,
}

impl FlightModeTask {
    pub fn new(bus: &Arc<TopicBus>, config: &FlightModeConfig, ctx: TaskContext) -> Result<Self, BusError> {
        let mut node = bus.create_node(TASK_NAME);
        let joy = node.subscribe(catalog::JOYSTICK_INPUT, Joy::default(), 10)?;
        let status = node.advertise(catalog::STATUS)?;

        Ok(Self {
            joy,
            status,
            arbiter: ModeArbiter::new(VehicleKind::Multirotor, config.joy.clone()),
            ctx,
            timer: ReleaseTimer::new(config.period()),
            _node: node,
        })
    }

    pub fn arbiter(&self) -> &ModeArbiter {
        &self.arbiter
    }
}

impl ControlLoop for FlightModeTask {
    fn name(&self) -> &'static str {
        TASK_NAME
    }

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
    }

    fn step(&mut self, _dt: f64) -> StepOutcome {
        match self.status.publish(self.arbiter.status()) {
            Ok(_) => StepOutcome::Published,
            Err(e) => reject(TASK_NAME, &e),
        }
    }
}
