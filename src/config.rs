//! config.rs
//! Read-only runtime configuration. Gains and thrust trim are stored in
//! milli-units (integers-as-floats, as tuned on the bench) and scaled by 1e-3
//! when handed to the control laws.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::error::ConfigError;
use crate::messages::Mode;

const MILLI: f64 = 1e-3;

/// Accepted range for timer-driven task rates.
pub const MIN_RATE_HZ: f64 = 0.1;
pub const MAX_RATE_HZ: f64 = 1000.0;

/// Whether the inner/outer loop integrators survive a disarm.
///
/// `Never` keeps the accumulated integral across disarm and mode changes
/// (bumpless re-arm); `OnDisarm` zeroes it when the vehicle disarms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorReset {
    #[default]
    Never,
    OnDisarm,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    #[default]
    Multirotor,
    GroundRover,
}

impl VehicleKind {
    pub fn supported_modes(&self) -> &'static [Mode] {
        match self {
            VehicleKind::Multirotor => &[
                Mode::Manual,
                Mode::Position,
                Mode::Velocity,
                Mode::Acceleration,
                Mode::Bezier,
            ],
            VehicleKind::GroundRover => &[Mode::Manual, Mode::CmdVel],
        }
    }
}

/// Inner angular-rate loop. Per-axis arrays are [roll, pitch, yaw].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLoopConfig {
    pub kp_milli: [f64; 3],
    pub ki_milli: [f64; 3],
    pub i_max_milli: [f64; 3],
    pub wait_timeout_ms: u64,
    pub dt_max_s: f64,
    pub priority: u8,
    pub integrator_reset: IntegratorReset,
}

impl Default for RateLoopConfig {
    fn default() -> Self {
        Self {
            kp_milli: [300.0, 300.0, 200.0],
            ki_milli: [50.0, 50.0, 20.0],
            i_max_milli: [100.0, 100.0, 100.0],
            wait_timeout_ms: 100,
            dt_max_s: 0.1,
            priority: 80,
            integrator_reset: IntegratorReset::Never,
        }
    }
}

/// Scaled gains handed to the rate law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateGains {
    pub kp: [f64; 3],
    pub ki: [f64; 3],
    pub i_max: [f64; 3],
}

impl RateLoopConfig {
    pub fn gains(&self) -> RateGains {
        RateGains {
            kp: self.kp_milli.map(|v| v * MILLI),
            ki: self.ki_milli.map(|v| v * MILLI),
            i_max: self.i_max_milli.map(|v| v * MILLI),
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Outer position loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionLoopConfig {
    pub thrust_trim_milli: f64,
    pub kp: f64,
    pub kv: f64,
    pub ki_z: f64,
    pub z_i_max: f64,
    pub wait_timeout_ms: u64,
    pub dt_max_s: f64,
    pub priority: u8,
    pub integrator_reset: IntegratorReset,
}

impl Default for PositionLoopConfig {
    fn default() -> Self {
        Self {
            thrust_trim_milli: 500.0,
            kp: 1.0,
            kv: 2.0,
            ki_z: 0.2,
            z_i_max: 2.0,
            wait_timeout_ms: 1000,
            dt_max_s: 0.5,
            priority: 70,
            integrator_reset: IntegratorReset::Never,
        }
    }
}

impl PositionLoopConfig {
    pub fn thrust_trim(&self) -> f64 {
        self.thrust_trim_milli * MILLI
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Quadrotor mixing task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub gain: f64,
    pub wait_timeout_ms: u64,
    pub dt_max_s: f64,
    pub priority: u8,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self { gain: 10.0, wait_timeout_ms: 100, dt_max_s: 0.1, priority: 85 }
    }
}

impl MixerConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Wheel geometry of a skid-steer / differential-drive base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffDriveGeometry {
    pub wheel_base: f64,
    pub wheel_separation: f64,
    pub wheel_radius: f64,
    pub max_omega: f64,
}

impl Default for DiffDriveGeometry {
    fn default() -> Self {
        Self {
            wheel_base: 0.2,
            wheel_separation: 0.25,
            wheel_radius: 0.05,
            max_omega: 120.0,
        }
    }
}

/// Button/axis indices on the input device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoyMapping {
    pub arm_button: usize,
    pub disarm_button: usize,
    pub mode_buttons: Vec<(usize, Mode)>,
    pub linear_axis: usize,
    pub angular_axis: usize,
}

impl Default for JoyMapping {
    fn default() -> Self {
        Self {
            arm_button: 7,
            disarm_button: 6,
            mode_buttons: vec![(0, Mode::Manual), (1, Mode::Auto), (2, Mode::CmdVel)],
            linear_axis: 1,
            angular_axis: 3,
        }
    }
}

impl JoyMapping {
    /// Rotor layout: the first buttons select the flight modes.
    pub fn multirotor() -> Self {
        Self {
            mode_buttons: vec![
                (0, Mode::Manual),
                (1, Mode::Position),
                (2, Mode::Velocity),
                (3, Mode::Acceleration),
                (4, Mode::Bezier),
            ],
            ..Self::default()
        }
    }
}

fn period_from_hz(rate_hz: f64) -> Duration {
    let hz = if rate_hz.is_nan() { MIN_RATE_HZ } else { rate_hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ) };
    Duration::from_secs_f64(1.0 / hz)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub geometry: DiffDriveGeometry,
    pub rate_hz: f64,
    pub dt_max_s: f64,
    pub priority: u8,
    pub joy: JoyMapping,
}

impl Default for RoverConfig {
    fn default() -> Self {
        Self {
            geometry: DiffDriveGeometry::default(),
            rate_hz: 50.0,
            dt_max_s: 0.5,
            priority: 60,
            joy: JoyMapping::default(),
        }
    }
}

impl RoverConfig {
    pub fn period(&self) -> Duration {
        period_from_hz(self.rate_hz)
    }
}

/// Multirotor arbiter task: reads the input device, publishes `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightModeConfig {
    pub rate_hz: f64,
    pub dt_max_s: f64,
    pub priority: u8,
    pub joy: JoyMapping,
}

impl Default for FlightModeConfig {
    fn default() -> Self {
        Self {
            rate_hz: 50.0,
            dt_max_s: 0.5,
            priority: 75,
            joy: JoyMapping::multirotor(),
        }
    }
}

impl FlightModeConfig {
    pub fn period(&self) -> Duration {
        period_from_hz(self.rate_hz)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub vehicle: VehicleKind,
    pub rate: RateLoopConfig,
    pub position: PositionLoopConfig,
    pub mixer: MixerConfig,
    pub flight: FlightModeConfig,
    pub rover: RoverConfig,
}

impl ControlConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: ControlConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.rate.i_max_milli.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return invalid("rate.i_max_milli must be finite and non-negative".into());
        }
        for (name, dt) in [
            ("rate", self.rate.dt_max_s),
            ("position", self.position.dt_max_s),
            ("mixer", self.mixer.dt_max_s),
            ("flight", self.flight.dt_max_s),
            ("rover", self.rover.dt_max_s),
        ] {
            if !(dt.is_finite() && dt > 0.0) {
                return invalid(format!("{}.dt_max_s must be positive, got {}", name, dt));
            }
        }
        for (name, hz) in [("flight", self.flight.rate_hz), ("rover", self.rover.rate_hz)] {
            if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&hz) {
                return invalid(format!(
                    "{}.rate_hz must be within {}..={} Hz, got {}",
                    name, MIN_RATE_HZ, MAX_RATE_HZ, hz
                ));
            }
        }
        let g = &self.rover.geometry;
        for (name, value) in [
            ("wheel_separation", g.wheel_separation),
            ("wheel_radius", g.wheel_radius),
            ("max_omega", g.max_omega),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("rover.geometry.{} must be positive, got {}", name, value));
            }
        }
        if !(g.wheel_base.is_finite() && g.wheel_base >= 0.0) {
            return invalid(format!("rover.geometry.wheel_base must be non-negative, got {}", g.wheel_base));
        }
        if self.position.z_i_max < 0.0 {
            return invalid("position.z_i_max must be non-negative".into());
        }
        Ok(())
    }
}
