//! messages.rs
//! Message schemas exchanged over the topic bus (see `bus::catalog`).
//!
//! Every schema implements [`Finite`]; the bus refuses to store a message
//! carrying NaN or infinity, so a topic value is always a complete, finite,
//! previously-published message.

use serde::Serialize;

/// Numeric validity check applied before any publish.
pub trait Finite {
    fn all_finite(&self) -> bool;
}

impl Finite for f64 {
    #[inline]
    fn all_finite(&self) -> bool {
        self.is_finite()
    }
}

impl<const N: usize> Finite for [f64; N] {
    fn all_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

impl Finite for Vec<f64> {
    fn all_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

/// Stamp carried by produced messages: monotonic nanoseconds + sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Header {
    pub stamp_ns: u64,
    pub seq: u64,
    pub frame_id: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Self { x: v[0], y: v[1], z: v[2] }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Finite for Vector3 {
    fn all_finite(&self) -> bool {
        self.to_array().all_finite()
    }
}

/// Orientation quaternion, scalar first. Defaults to identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    pub fn from_array(q: [f64; 4]) -> Self {
        Self { w: q[0], x: q[1], y: q[2], z: q[3] }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }
}

impl Finite for Quaternion {
    fn all_finite(&self) -> bool {
        self.to_array().all_finite()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose {
    pub position: Vector3,
    pub orientation: Quaternion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Finite for Twist {
    fn all_finite(&self) -> bool {
        self.linear.all_finite() && self.angular.all_finite()
    }
}

/// Estimator output. Linear velocity is expressed in the body frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Odometry {
    pub header: Header,
    pub pose: Pose,
    pub twist: Twist,
}

impl Finite for Odometry {
    fn all_finite(&self) -> bool {
        self.pose.position.all_finite()
            && self.pose.orientation.all_finite()
            && self.twist.all_finite()
    }
}

/// Vehicle modes. Ground vehicles use the first four; rotor vehicles add the
/// position-family modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Init,
    Manual,
    Auto,
    CmdVel,
    Position,
    Velocity,
    Acceleration,
    Bezier,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Init => "init",
            Mode::Manual => "manual",
            Mode::Auto => "auto",
            Mode::CmdVel => "cmd_vel",
            Mode::Position => "position",
            Mode::Velocity => "velocity",
            Mode::Acceleration => "acceleration",
            Mode::Bezier => "bezier",
        }
    }

    /// Modes in which the outer position loop produces output.
    pub fn is_position_family(&self) -> bool {
        matches!(
            self,
            Mode::Position | Mode::Velocity | Mode::Acceleration | Mode::Bezier
        )
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub mode: Mode,
    pub armed: bool,
}

impl Finite for Status {
    fn all_finite(&self) -> bool {
        true
    }
}

/// Input-device snapshot: button levels and axis positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Joy {
    pub buttons: Vec<i32>,
    pub axes: Vec<f64>,
}

impl Joy {
    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(0) == 1
    }

    pub fn axis(&self, index: usize) -> f64 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }
}

impl Finite for Joy {
    fn all_finite(&self) -> bool {
        self.axes.all_finite()
    }
}

/// Per-actuator command array. Counts are the lengths of each kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Actuators {
    pub header: Header,
    pub velocity: Vec<f64>,
    pub normalized: Vec<f64>,
    pub position: Vec<f64>,
}

impl Actuators {
    pub fn velocity_count(&self) -> usize {
        self.velocity.len()
    }

    pub fn normalized_count(&self) -> usize {
        self.normalized.len()
    }

    pub fn position_count(&self) -> usize {
        self.position.len()
    }
}

impl Finite for Actuators {
    fn all_finite(&self) -> bool {
        self.velocity.all_finite() && self.normalized.all_finite() && self.position.all_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odometry_finiteness() {
        let mut odom = Odometry::default();
        assert!(odom.all_finite());
        odom.twist.angular.y = f64::NAN;
        assert!(!odom.all_finite());
    }

    #[test]
    fn test_joy_missing_entries_read_as_released() {
        let joy = Joy { buttons: vec![0, 1], axes: vec![0.5] };
        assert!(joy.button(1));
        assert!(!joy.button(7));
        assert_eq!(joy.axis(0), 0.5);
        assert_eq!(joy.axis(3), 0.0);
    }

    #[test]
    fn test_actuator_counts_follow_lengths() {
        let act = Actuators {
            velocity: vec![1.0; 4],
            normalized: vec![0.1; 4],
            ..Default::default()
        };
        assert_eq!(act.velocity_count(), 4);
        assert_eq!(act.normalized_count(), 4);
        assert_eq!(act.position_count(), 0);
    }

    #[test]
    fn test_position_family_modes() {
        assert!(Mode::Bezier.is_position_family());
        assert!(!Mode::Manual.is_position_family());
        assert_eq!(Mode::CmdVel.to_string(), "cmd_vel");
    }
}
