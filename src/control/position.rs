//! position.rs
//! Outer loop: position/velocity/acceleration/orientation targets ->
//! normalized thrust + attitude setpoint.
//!
//! Runs only in the position-family modes; in any other mode the cycle idles
//! and downstream keeps whatever was last published.

use log::debug;
use nalgebra::{Matrix3, Quaternion as NQuaternion, Rotation3, UnitQuaternion, Vector3 as NVector3};
use std::{sync::Arc, time::Duration};

use crate::bus::{Node, Publication, Subscription, TopicBus, catalog};
use crate::config::{IntegratorReset, PositionLoopConfig};
use crate::error::{BusError, NumericError};
use crate::messages::{Odometry, Quaternion, Status, Vector3};

use super::task::{ControlLoop, StepOutcome, reject};

const GRAVITY: f64 = 9.81;

/// `(thrust_trim, pt_w, vt_w, at_w, qc_wb, p_w, v_b, q_wb, z_i, dt)`.
/// Quaternions are `[w, x, y, z]`; `v_b` is body-frame velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionLawInput {
    pub thrust_trim: f64,
    pub pt_w: [f64; 3],
    pub vt_w: [f64; 3],
    pub at_w: [f64; 3],
    pub qc_wb: [f64; 4],
    pub p_w: [f64; 3],
    pub v_b: [f64; 3],
    pub q_wb: [f64; 4],
    pub z_i: f64,
    pub dt: f64,
}

/// `(nT, qr_wb, z_i)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionLawOutput {
    pub n_t: f64,
    pub qr_wb: [f64; 4],
    pub z_i: f64,
}

pub trait PositionLaw: Send {
    fn evaluate(&self, input: &PositionLawInput) -> PositionLawOutput;
}

/// PD on position and velocity with acceleration feed-forward and an
/// altitude integral. The body z axis is aligned with the desired force and
/// the heading follows the commanded orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricPositionLaw {
    pub kp: f64,
    pub kv: f64,
    pub ki_z: f64,
    pub z_i_max: f64,
}

impl GeometricPositionLaw {
    pub fn from_config(config: &PositionLoopConfig) -> Self {
        Self {
            kp: config.kp,
            kv: config.kv,
            ki_z: config.ki_z,
            z_i_max: config.z_i_max,
        }
    }
}

fn unit(q: [f64; 4]) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(NQuaternion::new(q[0], q[1], q[2], q[3]))
}

impl PositionLaw for GeometricPositionLaw {
    fn evaluate(&self, input: &PositionLawInput) -> PositionLawOutput {
        let q_wb = unit(input.q_wb);
        let v_w = q_wb * NVector3::from(input.v_b);

        let e_p = NVector3::from(input.pt_w) - NVector3::from(input.p_w);
        let e_v = NVector3::from(input.vt_w) - v_w;
        let z_i = (input.z_i + e_p.z * input.dt).clamp(-self.z_i_max, self.z_i_max);

        let a_des = self.kp * e_p
            + self.kv * e_v
            + NVector3::from(input.at_w)
            + NVector3::new(0.0, 0.0, GRAVITY + self.ki_z * z_i);

        // zero desired force leaves the attitude undefined: NaN propagates
        // and the caller drops the cycle
        let norm = a_des.norm();
        let b3 = a_des / norm;

        let heading = unit(input.qc_wb) * NVector3::x();
        let psi = heading.y.atan2(heading.x);
        let c1 = NVector3::new(psi.cos(), psi.sin(), 0.0);
        let b2 = b3.cross(&c1).normalize();
        let b1 = b2.cross(&b3);

        let rot = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[b1, b2, b3]));
        let qr = UnitQuaternion::from_rotation_matrix(&rot).into_inner();

        PositionLawOutput {
            n_t: input.thrust_trim * norm / GRAVITY,
            qr_wb: [qr.w, qr.i, qr.j, qr.k],
            z_i,
        }
    }
}

/// Targets read from the setpoint topics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionTargets {
    pub position: Vector3,
    pub velocity: Vector3,
    pub accel_ff: Vector3,
    pub orientation: Quaternion,
}

pub struct PositionController<L: PositionLaw = GeometricPositionLaw> {
    law: L,
    thrust_trim: f64,
    z_i: f64,
}

impl<L: PositionLaw> PositionController<L> {
    pub fn new(law: L, thrust_trim: f64) -> Self {
        Self { law, thrust_trim, z_i: 0.0 }
    }

    /// Returns `(thrust ratio, attitude setpoint)`; the altitude integral is
    /// committed only if every output is finite.
    pub fn step(
        &mut self,
        targets: &PositionTargets,
        odom: &Odometry,
        dt: f64,
    ) -> Result<(f64, Quaternion), NumericError> {
        let out = self.law.evaluate(&PositionLawInput {
            thrust_trim: self.thrust_trim,
            pt_w: targets.position.to_array(),
            vt_w: targets.velocity.to_array(),
            at_w: targets.accel_ff.to_array(),
            qc_wb: targets.orientation.to_array(),
            p_w: odom.pose.position.to_array(),
            v_b: odom.twist.linear.to_array(),
            q_wb: odom.pose.orientation.to_array(),
            z_i: self.z_i,
            dt,
        });

        NumericError::check("qr_wb", &out.qr_wb)?;
        NumericError::check("nT", &[out.n_t])?;
        NumericError::check("z_i", &[out.z_i])?;

        self.z_i = out.z_i;
        Ok((out.n_t, Quaternion::from_array(out.qr_wb)))
    }

    pub fn altitude_integral(&self) -> f64 {
        self.z_i
    }

    pub fn reset(&mut self) {
        self.z_i = 0.0;
    }
}

pub const TASK_NAME: &str = "position";

pub struct PositionTask<L: PositionLaw = GeometricPositionLaw> {
    status: Subscription<Status>,
    position_sp: Subscription<Vector3>,
    velocity_sp: Subscription<Vector3>,
    accel_ff: Subscription<Vector3>,
    orientation_sp: Subscription<Quaternion>,
    odometry: Subscription<Odometry>,
    force_sp: Publication<Vector3>,
    attitude_sp: Publication<Quaternion>,
    controller: PositionController<L>,
    reset: IntegratorReset,
    was_armed: bool,
    _node: Node,
}

impl PositionTask<GeometricPositionLaw> {
    pub fn new(bus: &Arc<TopicBus>, config: &PositionLoopConfig) -> Result<Self, BusError> {
        Self::with_law(bus, config, GeometricPositionLaw::from_config(config))
    }
}

impl<L: PositionLaw> PositionTask<L> {
    pub fn with_law(bus: &Arc<TopicBus>, config: &PositionLoopConfig, law: L) -> Result<Self, BusError> {
        let mut node = bus.create_node(TASK_NAME);
        let status = node.subscribe(catalog::STATUS, Status::default(), 10)?;
        let position_sp = node.subscribe(catalog::POSITION_SP, Vector3::default(), 100)?;
        let velocity_sp = node.subscribe(catalog::VELOCITY_SP, Vector3::default(), 100)?;
        let accel_ff = node.subscribe(catalog::ACCEL_FF, Vector3::default(), 100)?;
        let orientation_sp = node.subscribe(catalog::ORIENTATION_SP, Quaternion::IDENTITY, 100)?;
        let odometry = node
            .subscribe(catalog::ESTIMATOR_ODOMETRY, Odometry::default(), 10)?
            .with_event();
        let force_sp = node.advertise(catalog::FORCE_SP)?;
        let attitude_sp = node.advertise(catalog::ATTITUDE_SP)?;

        Ok(Self {
            status,
            position_sp,
            velocity_sp,
            accel_ff,
            orientation_sp,
            odometry,
            force_sp,
            attitude_sp,
            controller: PositionController::new(law, config.thrust_trim()),
            reset: config.integrator_reset,
            was_armed: false,
            _node: node,
        })
    }

    /// Armed -> disarmed edge seen on an accepted cycle; under `OnDisarm`
    /// the altitude integral is cleared.
    fn apply_reset_policy(&mut self) {
        let armed = self.status.get().armed;
        if self.was_armed && !armed && self.reset == IntegratorReset::OnDisarm {
            debug!("[{}] disarmed, clearing altitude integral", TASK_NAME);
            self.controller.reset();
        }
        self.was_armed = armed;
    }

    pub fn controller(&self) -> &PositionController<L> {
        &self.controller
    }

    fn targets(&self) -> PositionTargets {
        PositionTargets {
            position: *self.position_sp.get(),
            velocity: *self.velocity_sp.get(),
            accel_ff: *self.accel_ff.get(),
            orientation: *self.orientation_sp.get(),
        }
    }
}

impl<L: PositionLaw> ControlLoop for PositionTask<L> {
    fn name(&self) -> &'static str {
        TASK_NAME
    }

    fn wait_drive(&mut self, timeout: Duration) -> bool {
        self.odometry.wait(timeout)
    }

    fn drain(&mut self) {
        self.status.update_if_available();
        self.position_sp.update_if_available();
        self.velocity_sp.update_if_available();
        self.accel_ff.update_if_available();
        self.orientation_sp.update_if_available();
        self.odometry.update_if_available();
    }

    fn step(&mut self, dt: f64) -> StepOutcome {
        self.apply_reset_policy();
        if !self.status.get().mode.is_position_family() {
            return StepOutcome::Idle;
        }

        let targets = self.targets();
        let (n_t, attitude) = match self.controller.step(&targets, self.odometry.get(), dt) {
            Ok(out) => out,
            Err(e) => return reject(TASK_NAME, &e),
        };

        if let Err(e) = self.attitude_sp.publish(attitude) {
            return reject(TASK_NAME, &e);
        }
        match self.force_sp.publish(Vector3::new(0.0, 0.0, n_t)) {
            Ok(_) => StepOutcome::Published,
            Err(e) => reject(TASK_NAME, &e),
        }
    }
}
