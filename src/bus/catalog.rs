//! Topic catalog: every name on the bus is bound to one message type here.

use std::marker::PhantomData;

use crate::messages::{Actuators, Joy, Odometry, Quaternion, Status, Twist, Vector3};

/// Typed handle naming a topic.
pub struct TopicDef<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TopicDef<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, _marker: PhantomData }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for TopicDef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TopicDef<T> {}

impl<T> std::fmt::Debug for TopicDef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TopicDef({})", self.name)
    }
}

pub const STATUS: TopicDef<Status> = TopicDef::new("status");
pub const ANGULAR_VELOCITY_SP: TopicDef<Vector3> = TopicDef::new("angular_velocity_sp");
pub const ESTIMATOR_ODOMETRY: TopicDef<Odometry> = TopicDef::new("estimator_odometry");
pub const MOMENT_SP: TopicDef<Vector3> = TopicDef::new("moment_sp");
pub const POSITION_SP: TopicDef<Vector3> = TopicDef::new("position_sp");
pub const VELOCITY_SP: TopicDef<Vector3> = TopicDef::new("velocity_sp");
pub const ACCEL_FF: TopicDef<Vector3> = TopicDef::new("accel_ff");
pub const ORIENTATION_SP: TopicDef<Quaternion> = TopicDef::new("orientation_sp");
pub const ATTITUDE_SP: TopicDef<Quaternion> = TopicDef::new("attitude_sp");
/// Only `z` is meaningful: normalized thrust ratio.
pub const FORCE_SP: TopicDef<Vector3> = TopicDef::new("force_sp");
pub const JOYSTICK_INPUT: TopicDef<Joy> = TopicDef::new("joystick_input");
pub const CMD_VEL: TopicDef<Twist> = TopicDef::new("cmd_vel");
pub const ACTUATORS: TopicDef<Actuators> = TopicDef::new("actuators");
