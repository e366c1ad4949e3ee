//! angular_rate.rs
//! Inner loop: angular-velocity error -> moment command.
//!
//! The numeric law is injected through [`RateLaw`]; the controller owns the
//! per-axis integral and only commits it when every output is finite.

use log::debug;
use std::{sync::Arc, time::Duration};

use crate::bus::{Node, Publication, Subscription, TopicBus, catalog};
use crate::config::{IntegratorReset, RateGains, RateLoopConfig};
use crate::error::{BusError, NumericError};
use crate::messages::{Odometry, Status, Vector3};

use super::task::{ControlLoop, StepOutcome, reject};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLawInput {
    /// Estimated body rates
    pub omega: [f64; 3],
    /// Rate setpoint
    pub omega_r: [f64; 3],
    pub i_prev: [f64; 3],
    pub dt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLawOutput {
    pub moment: [f64; 3],
    pub i_next: [f64; 3],
}

/// `(kp, ki, i_max, omega, omega_r, i_prev, dt) -> (moment, i_next)`.
/// Finite inputs do not guarantee finite outputs.
pub trait RateLaw: Send {
    fn evaluate(&self, gains: &RateGains, input: &RateLawInput) -> RateLawOutput;
}

/// Proportional on error plus an integral clamped to `±i_max`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PiRateLaw;

impl RateLaw for PiRateLaw {
    #[inline]
    fn evaluate(&self, gains: &RateGains, input: &RateLawInput) -> RateLawOutput {
        let mut moment = [0.0; 3];
        let mut i_next = [0.0; 3];
        for axis in 0..3 {
            let err = input.omega_r[axis] - input.omega[axis];
            let limit = gains.i_max[axis];
            i_next[axis] = (input.i_prev[axis] + gains.ki[axis] * err * input.dt).clamp(-limit, limit);
            moment[axis] = gains.kp[axis] * err + i_next[axis];
        }
        RateLawOutput { moment, i_next }
    }
}

pub struct AngularRateController<L: RateLaw = PiRateLaw> {
    law: L,
    gains: RateGains,
    integral: [f64; 3],
}

impl AngularRateController<PiRateLaw> {
    pub fn new(gains: RateGains) -> Self {
        Self::with_law(gains, PiRateLaw)
    }
}

impl<L: RateLaw> AngularRateController<L> {
    pub fn with_law(gains: RateGains, law: L) -> Self {
        Self { law, gains, integral: [0.0; 3] }
    }

    /// Evaluate the law; the integral advances only if moment and integral
    /// are both finite.
    pub fn step(&mut self, omega: [f64; 3], omega_r: [f64; 3], dt: f64) -> Result<Vector3, NumericError> {
        let out = self.law.evaluate(
            &self.gains,
            &RateLawInput { omega, omega_r, i_prev: self.integral, dt },
        );
        NumericError::check("omega_i", &out.i_next)?;
        NumericError::check("M", &out.moment)?;
        self.integral = out.i_next;
        Ok(Vector3::from_array(out.moment))
    }

    pub fn integral(&self) -> [f64; 3] {
        self.integral
    }

    pub fn reset(&mut self) {
        self.integral = [0.0; 3];
    }
}

pub const TASK_NAME: &str = "angular_rate";

/// Rate loop bound to the bus: driven by `estimator_odometry`, publishes
/// `moment_sp`.
pub struct AngularRateTask<L: RateLaw = PiRateLaw> {
    status: Subscription<Status>,
    rate_sp: Subscription<Vector3>,
    odometry: Subscription<Odometry>,
    moment_sp: Publication<Vector3>,
    controller: AngularRateController<L>,
    reset: IntegratorReset,
    was_armed: bool,
    // dropped last: subscriptions above are released first
    _node: Node,
}

impl AngularRateTask<PiRateLaw> {
    pub fn new(bus: &Arc<TopicBus>, config: &RateLoopConfig) -> Result<Self, BusError> {
        Self::with_law(bus, config, PiRateLaw)
    }
}

impl<L: RateLaw> AngularRateTask<L> {
    pub fn with_law(bus: &Arc<TopicBus>, config: &RateLoopConfig, law: L) -> Result<Self, BusError> {
        let mut node = bus.create_node(TASK_NAME);
        let status = node.subscribe(catalog::STATUS, Status::default(), 10)?;
        let rate_sp = node.subscribe(catalog::ANGULAR_VELOCITY_SP, Vector3::default(), 50)?;
        let odometry = node
            .subscribe(catalog::ESTIMATOR_ODOMETRY, Odometry::default(), 50)?
            .with_event();
        let moment_sp = node.advertise(catalog::MOMENT_SP)?;

        Ok(Self {
            status,
            rate_sp,
            odometry,
            moment_sp,
            controller: AngularRateController::with_law(config.gains(), law),
            reset: config.integrator_reset,
            was_armed: false,
            _node: node,
        })
    }

    /// Armed -> disarmed edge seen on an accepted cycle; under `OnDisarm`
    /// the integrator is cleared.
    fn apply_reset_policy(&mut self) {
        let armed = self.status.get().armed;
        if self.was_armed && !armed && self.reset == IntegratorReset::OnDisarm {
            debug!("[{}] disarmed, clearing integrator", TASK_NAME);
            self.controller.reset();
        }
        self.was_armed = armed;
    }

    pub fn controller(&self) -> &AngularRateController<L> {
        &self.controller
    }
}

impl<L: RateLaw> ControlLoop for AngularRateTask<L> {
    fn name(&self) -> &'static str {
        TASK_NAME
    }

    fn wait_drive(&mut self, timeout: Duration) -> bool {
        self.odometry.wait(timeout)
    }

    fn drain(&mut self) {
        self.status.update_if_available();
        self.odometry.update_if_available();
        self.rate_sp.update_if_available();
    }

    fn step(&mut self, dt: f64) -> StepOutcome {
        self.apply_reset_policy();
        let omega = self.odometry.get().twist.angular.to_array();
        let omega_r = self.rate_sp.get().to_array();

        match self.controller.step(omega, omega_r, dt) {
            Ok(moment) => match self.moment_sp.publish(moment) {
                Ok(_) => StepOutcome::Published,
                Err(e) => reject(TASK_NAME, &e),
            },
            Err(e) => reject(TASK_NAME, &e),
        }
    }
}
