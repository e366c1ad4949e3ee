//! Control tasks: the periodic loop pattern, the cascaded controllers, the
//! mode arbiter and its tasks, the actuator mixers and the runners that own
//! their threads.

pub mod angular_rate;
pub mod flight_mode;
pub mod mixer;
pub mod mixing_task;
pub mod mode;
pub mod position;
pub mod rover;
pub mod runner;
pub mod task;

use std::sync::Arc;

use crate::bus::TopicBus;
use crate::config::{ControlConfig, VehicleKind};

use angular_rate::AngularRateTask;
use flight_mode::FlightModeTask;
use mixing_task::QuadMixingTask;
use position::PositionTask;
use rover::RoverTask;
use runner::{TaskRunner, factory};
use task::{LoopTiming, TaskContext};

/// One runner per task of the configured vehicle, none started.
pub fn build_runners(bus: &Arc<TopicBus>, config: &ControlConfig, ctx: &TaskContext) -> Vec<TaskRunner> {
    match config.vehicle {
        VehicleKind::Multirotor => {
            let flight = {
                let bus = bus.clone();
                let cfg = config.flight.clone();
                let task_ctx = ctx.clone();
                TaskRunner::new(
                    flight_mode::TASK_NAME,
                    cfg.priority,
                    LoopTiming::new(cfg.period(), cfg.dt_max_s),
                    ctx.clone(),
                    factory(move || FlightModeTask::new(&bus, &cfg, task_ctx.clone())),
                )
            };
            let rate = {
                let bus = bus.clone();
                let cfg = config.rate.clone();
                TaskRunner::new(
                    angular_rate::TASK_NAME,
                    cfg.priority,
                    LoopTiming::new(cfg.wait_timeout(), cfg.dt_max_s),
                    ctx.clone(),
                    factory(move || AngularRateTask::new(&bus, &cfg)),
                )
            };
            let position = {
                let bus = bus.clone();
                let cfg = config.position.clone();
                TaskRunner::new(
                    position::TASK_NAME,
                    cfg.priority,
                    LoopTiming::new(cfg.wait_timeout(), cfg.dt_max_s),
                    ctx.clone(),
                    factory(move || PositionTask::new(&bus, &cfg)),
                )
            };
            let mixing = {
                let bus = bus.clone();
                let cfg = config.mixer.clone();
                let clock = ctx.clock.clone();
                TaskRunner::new(
                    mixing_task::TASK_NAME,
                    cfg.priority,
                    LoopTiming::new(cfg.wait_timeout(), cfg.dt_max_s),
                    ctx.clone(),
                    factory(move || QuadMixingTask::new(&bus, &cfg, clock.clone())),
                )
            };
            vec![flight, rate, position, mixing]
        }
        VehicleKind::GroundRover => {
            let bus = bus.clone();
            let cfg = config.rover.clone();
            let task_ctx = ctx.clone();
            vec![TaskRunner::new(
                rover::TASK_NAME,
                cfg.priority,
                // timer-driven: the wait never times out
                LoopTiming::new(cfg.period(), cfg.dt_max_s),
                ctx.clone(),
                factory(move || RoverTask::new(&bus, &cfg, task_ctx.clone())),
            )]
        }
    }
}
