//! mixer.rs
//! Pure actuator mixers: command -> per-actuator values.
//!
//! - quadrotor: normalized thrust/roll/pitch/yaw -> four rotor velocities
//! - differential drive: forward speed + yaw rate -> four wheel velocities
//! - two-channel RC: thrust + yaw -> two hard-clamped actuator values

use crate::config::DiffDriveGeometry;
use crate::messages::{Actuators, Header, Mode, Vector3};

pub const DEFAULT_QUAD_GAIN: f64 = 10.0;

/// `k(T+P-R+Y), k(T-P+R+Y), k(T+P+R-Y), k(T-P-R-Y)`; no saturation.
#[inline]
pub fn quadrotor(k: f64, thrust: f64, roll: f64, pitch: f64, yaw: f64) -> [f64; 4] {
    [
        k * (thrust + pitch - roll + yaw),
        k * (thrust - pitch + roll + yaw),
        k * (thrust + pitch + roll - yaw),
        k * (thrust - pitch - roll - yaw),
    ]
}

/// Quadrotor mixer that stamps each output with a time and sequence number.
pub struct QuadMixer {
    gain: f64,
    seq: u64,
}

impl QuadMixer {
    pub fn new(gain: f64) -> Self {
        Self { gain, seq: 0 }
    }

    pub fn mix(&mut self, stamp_ns: u64, thrust: f64, moment: Vector3) -> Actuators {
        self.seq += 1;
        Actuators {
            header: Header { stamp_ns, seq: self.seq, frame_id: "odom" },
            velocity: quadrotor(self.gain, thrust, moment.x, moment.y, moment.z).to_vec(),
            normalized: Vec::new(),
            position: Vec::new(),
        }
    }
}

/// Tangential wheel speed needed for yaw rate `omega` on a skid-steer base
/// with wheel base `l` and track `w` (wheel slip grows with `l / w`).
#[inline]
pub fn differential_steering(l: f64, omega: f64, w: f64) -> f64 {
    let ratio = l / w;
    omega * w / 2.0 * (1.0 + ratio * ratio)
}

/// Four-wheel differential drive. Wheels 0 and 3 take `fwd + turn`, wheels 1
/// and 2 take `fwd - turn`. Everything is zero while disarmed.
pub fn differential_drive(geometry: &DiffDriveGeometry, v: f64, omega: f64, armed: bool) -> Actuators {
    let (omega_fwd, omega_turn) = if armed {
        let vw = differential_steering(geometry.wheel_base, omega, geometry.wheel_separation);
        (v / geometry.wheel_radius, vw / geometry.wheel_radius)
    } else {
        (0.0, 0.0)
    };

    let velocity = vec![
        omega_fwd + omega_turn,
        omega_fwd - omega_turn,
        omega_fwd - omega_turn,
        omega_fwd + omega_turn,
    ];
    let normalized = velocity.iter().map(|w| w / geometry.max_omega).collect();

    Actuators {
        header: Header::default(),
        velocity,
        normalized,
        position: Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RcInput {
    pub mode: Mode,
    pub armed: bool,
    pub thrust: f64,
    pub yaw: f64,
}

/// Physical travel `[min, max]` of each RC channel.
pub const RC_RANGES: [[f64; 2]; 2] = [[-1048.0, 1048.0], [-0.3, 0.3]];

/// Rows: actuators, columns: (thrust, yaw).
pub const RC_MIX: [[f64; 2]; 2] = [[1.0, 0.0], [0.0, 1.0]];

/// Two-actuator RC mixer. In manual mode the inputs are scaled by half of
/// each channel's travel, otherwise passed at unit scale; outputs are clamped
/// to the travel.
pub fn rc_two_channel(input: &RcInput) -> [f64; 2] {
    let (thrust, yaw) = if input.armed { (input.thrust, input.yaw) } else { (0.0, 0.0) };

    let mut out = [0.0; 2];
    for (i, [lo, hi]) in RC_RANGES.iter().copied().enumerate() {
        let scale = if input.mode == Mode::Manual { (hi - lo) / 2.0 } else { 1.0 };
        let raw = RC_MIX[i][0] * thrust * scale + RC_MIX[i][1] * yaw * scale;
        out[i] = raw.clamp(lo, hi);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_pure_thrust() {
        assert_eq!(quadrotor(10.0, 1.0, 0.0, 0.0, 0.0), [10.0; 4]);
    }

    #[test]
    fn test_quad_pure_roll() {
        assert_eq!(quadrotor(10.0, 0.0, 1.0, 0.0, 0.0), [-10.0, 10.0, 10.0, -10.0]);
    }

    #[test]
    fn test_quad_pitch_and_yaw_signs() {
        assert_eq!(quadrotor(10.0, 0.0, 0.0, 1.0, 0.0), [10.0, -10.0, 10.0, -10.0]);
        assert_eq!(quadrotor(10.0, 0.0, 0.0, 0.0, 1.0), [10.0, 10.0, -10.0, -10.0]);
    }

    #[test]
    fn test_quad_mixer_stamps_and_counts() {
        let mut mixer = QuadMixer::new(DEFAULT_QUAD_GAIN);
        let a = mixer.mix(100, 1.0, Vector3::default());
        let b = mixer.mix(200, 0.0, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(a.header.seq, 1);
        assert_eq!(b.header.seq, 2);
        assert_eq!(b.header.stamp_ns, 200);
        assert_eq!(b.velocity, vec![-10.0, 10.0, 10.0, -10.0]);
        assert_eq!(b.velocity_count(), 4);
        assert_eq!(b.normalized_count(), 0);
    }

    #[test]
    fn test_diff_drive_zero_command() {
        let g = DiffDriveGeometry::default();
        let a = differential_drive(&g, 0.0, 0.0, true);
        assert_eq!(a.velocity, vec![0.0; 4]);
        assert_eq!(a.normalized, vec![0.0; 4]);
    }

    #[test]
    fn test_diff_drive_disarmed_is_zero() {
        let g = DiffDriveGeometry::default();
        for (v, w) in [(1.0, 0.0), (0.0, 2.0), (-3.0, 5.0)] {
            let a = differential_drive(&g, v, w, false);
            assert_eq!(a.velocity, vec![0.0; 4]);
            assert_eq!(a.normalized, vec![0.0; 4]);
        }
    }

    #[test]
    fn test_diff_drive_forward_and_turn() {
        let g = DiffDriveGeometry { wheel_base: 0.0, wheel_separation: 0.2, wheel_radius: 0.1, max_omega: 20.0 };
        let a = differential_drive(&g, 1.0, 0.0, true);
        assert_eq!(a.velocity, vec![10.0; 4]);
        assert_eq!(a.normalized, vec![0.5; 4]);

        // zero wheel base: Vw = omega * w / 2
        let a = differential_drive(&g, 0.0, 1.0, true);
        let turn = 0.1 / 0.1;
        assert_eq!(a.velocity, vec![turn, -turn, -turn, turn]);
    }

    #[test]
    fn test_rc_manual_scale_and_clamp() {
        let out = rc_two_channel(&RcInput { mode: Mode::Manual, armed: true, thrust: 0.5, yaw: 2.0 });
        assert_eq!(out[0], 524.0);
        assert_eq!(out[1], 0.3);
    }

    #[test]
    fn test_rc_unit_scale_outside_manual() {
        let out = rc_two_channel(&RcInput { mode: Mode::CmdVel, armed: true, thrust: 0.5, yaw: -0.1 });
        assert_eq!(out, [0.5, -0.1]);
        let out = rc_two_channel(&RcInput { mode: Mode::CmdVel, armed: true, thrust: 5000.0, yaw: -1.0 });
        assert_eq!(out, [1048.0, -0.3]);
    }

    #[test]
    fn test_rc_disarmed_is_zero() {
        let out = rc_two_channel(&RcInput { mode: Mode::Manual, armed: false, thrust: 1.0, yaw: 1.0 });
        assert_eq!(out, [0.0, 0.0]);
    }
}
