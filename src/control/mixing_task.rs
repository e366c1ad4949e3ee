//! mixing_task.rs
//! Quadrotor mixing task: driven by `moment_sp`, combines it with the thrust
//! in `force_sp` and publishes rotor velocities on `actuators`.
//! While disarmed the thrust and moments fed to the mixer are zero.

use std::{sync::Arc, time::Duration};

use crate::bus::{Node, Publication, Subscription, TopicBus, catalog};
use crate::clock::SharedClock;
use crate::config::MixerConfig;
use crate::error::BusError;
use crate::messages::{Actuators, Status, Vector3};

use super::mixer::QuadMixer;
use super::task::{ControlLoop, StepOutcome, reject};

pub const TASK_NAME: &str = "mixing";

pub struct QuadMixingTask {
    moment_sp: Subscription<Vector3>,
    force_sp: Subscription<Vector3>,
    status: Subscription<Status>,
    actuators: Publication<Actuators>,
    mixer: QuadMixer,
    clock: SharedClock,
    _node: Node,
}

impl QuadMixingTask {
    pub fn new(bus: &Arc<TopicBus>, config: &MixerConfig, clock: SharedClock) -> Result<Self, BusError> {
        let mut node = bus.create_node(TASK_NAME);
        let moment_sp = node
            .subscribe(catalog::MOMENT_SP, Vector3::default(), 10)?
            .with_event();
        let force_sp = node.subscribe(catalog::FORCE_SP, Vector3::default(), 10)?;
        let status = node.subscribe(catalog::STATUS, Status::default(), 10)?;
        let actuators = node.advertise(catalog::ACTUATORS)?;

        Ok(Self {
            moment_sp,
            force_sp,
            status,
            actuators,
            mixer: QuadMixer::new(config.gain),
            clock,
            _node: node,
        })
    }
}

impl ControlLoop for QuadMixingTask {
    fn name(&self) -> &'static str {
        TASK_NAME
    }

    fn wait_drive(&mut self, timeout: Duration) -> bool {
        self.moment_sp.wait(timeout)
    }

    fn drain(&mut self) {
        self.moment_sp.update_if_available();
        self.force_sp.update_if_available();
        self.status.update_if_available();
    }

    fn step(&mut self, _dt: f64) -> StepOutcome {
        let (thrust, moment) = if self.status.get().armed {
            (self.force_sp.get().z, *self.moment_sp.get())
        } else {
            (0.0, Vector3::default())
        };

        let msg = self.mixer.mix(self.clock.now_ns(), thrust, moment);
        match self.actuators.publish(msg) {
            Ok(_) => StepOutcome::Published,
            Err(e) => reject(TASK_NAME, &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::control::task::{CycleOutcome, LoopTiming, PeriodicTask, tests::manual_ctx};
    use crate::messages::Mode;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_disarm_zeroes_mixer_input() {
        let bus = TopicBus::new();
        let clock = ManualClock::new();
        let control = QuadMixingTask::new(&bus, &MixerConfig::default(), Arc::new(clock.clone())).unwrap();
        let mut task = PeriodicTask::new(control, LoopTiming::new(Duration::from_millis(10), 0.1), manual_ctx(&clock));
        let running = AtomicBool::new(true);

        let status = bus.topic(catalog::STATUS).unwrap();
        let moment = bus.topic(catalog::MOMENT_SP).unwrap();
        bus.topic(catalog::FORCE_SP).unwrap().publish(Vector3::new(0.0, 0.0, 1.0)).unwrap();

        status.publish(Status { mode: Mode::Position, armed: true }).unwrap();
        clock.advance_secs(0.005);
        moment.publish(Vector3::default()).unwrap();
        assert_eq!(task.run_once(&running), CycleOutcome::Step(StepOutcome::Published));
        let (out, _) = bus.peek(catalog::ACTUATORS).unwrap();
        assert_eq!(out.velocity, vec![10.0; 4]);
        assert_eq!(out.header.seq, 1);
        assert_eq!(out.header.stamp_ns, 5_000_000);

        status.publish(Status { mode: Mode::Init, armed: false }).unwrap();
        clock.advance_secs(0.005);
        moment.publish(Vector3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(task.run_once(&running), CycleOutcome::Step(StepOutcome::Published));
        let (out, _) = bus.peek(catalog::ACTUATORS).unwrap();
        assert_eq!(out.velocity, vec![0.0; 4]);
        assert_eq!(out.header.seq, 2);
    }
}
