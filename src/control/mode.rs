//! mode.rs
//! Arm/disarm and mode-select state machine.
//!
//! The arbiter owns the single [`ModeState`] of the vehicle; tasks that need
//! the mode read it from the `status` topic the owner publishes. Input-device
//! buttons act on rising edges; an arm/disarm edge is handled before a
//! mode-select edge in the same message.

use log::{info, warn};

use crate::config::{JoyMapping, VehicleKind};
use crate::error::ArbiterError;
use crate::messages::{Joy, Mode, Status, Twist};
use crate::utils::metrics::{self, EventKind};

use super::task::TaskContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeState {
    pub mode: Mode,
    pub armed: bool,
    pub prev_mode: Mode,
}

/// Transition notifications produced by the arbiter.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterEvent {
    Armed(Mode),
    Disarmed,
    ModeChanged { from: Mode, to: Mode },
    Rejected(ArbiterError),
}

pub struct ModeArbiter {
    vehicle: VehicleKind,
    mapping: JoyMapping,
    state: ModeState,
    prev_buttons: Vec<i32>,
    cmd_vel: Twist,
}

impl ModeArbiter {
    pub fn new(vehicle: VehicleKind, mapping: JoyMapping) -> Self {
        Self {
            vehicle,
            mapping,
            state: ModeState::default(),
            prev_buttons: Vec::new(),
            cmd_vel: Twist::default(),
        }
    }

    pub fn state(&self) -> ModeState {
        self.state
    }

    pub fn status(&self) -> Status {
        Status { mode: self.state.mode, armed: self.state.armed }
    }

    pub fn supports(&self, mode: Mode) -> bool {
        self.vehicle.supported_modes().contains(&mode)
    }

    /// Ok(true) if the vehicle armed, Ok(false) if it already was.
    pub fn arm(&mut self) -> Result<bool, ArbiterError> {
        if self.state.armed {
            return Ok(false);
        }
        if self.state.mode == Mode::Init {
            warn!("[arbiter] cannot arm until mode selected");
            return Err(ArbiterError::ArmWithoutMode);
        }
        self.state.armed = true;
        info!("[arbiter] armed in mode: {}", self.state.mode);
        Ok(true)
    }

    /// Always permitted; forces the mode back to init. Returns whether
    /// anything changed.
    pub fn disarm(&mut self) -> bool {
        let changed = self.state.armed || self.state.mode != Mode::Init;
        if self.state.armed {
            info!("[arbiter] disarmed");
        }
        self.state.armed = false;
        self.state.prev_mode = self.state.mode;
        self.state.mode = Mode::Init;
        self.cmd_vel = Twist::default();
        changed
    }

    /// Ok(true) if the mode changed.
    pub fn request_mode(&mut self, mode: Mode) -> Result<bool, ArbiterError> {
        if !self.supports(mode) {
            warn!("[arbiter] {} mode rejected: unsupported for this vehicle", mode);
            return Err(ArbiterError::UnsupportedMode(mode));
        }
        self.state.prev_mode = self.state.mode;
        self.state.mode = mode;
        let changed = self.state.prev_mode != mode;
        if changed {
            info!("[arbiter] mode changed to: {}", mode);
        }
        Ok(changed)
    }

    fn rising(&self, joy: &Joy, index: usize) -> bool {
        let was = self.prev_buttons.get(index).copied().unwrap_or(0) == 1;
        joy.button(index) && !was
    }

    /// Process one input-device message; runs to completion.
    pub fn handle_joy(&mut self, joy: &Joy) -> Vec<ArbiterEvent> {
        let mut events = Vec::new();

        let arm_edge = self.rising(joy, self.mapping.arm_button);
        let disarm_edge = self.rising(joy, self.mapping.disarm_button);
        let mode_edge = self
            .mapping
            .mode_buttons
            .iter()
            .find(|(button, _)| self.rising(joy, *button))
            .map(|(_, mode)| *mode);
        self.prev_buttons.clone_from(&joy.buttons);

        if arm_edge && !self.state.armed {
            match self.arm() {
                Ok(_) => events.push(ArbiterEvent::Armed(self.state.mode)),
                Err(e) => {
                    // nothing else in a rejected arm message is acted on
                    events.push(ArbiterEvent::Rejected(e));
                    return events;
                }
            }
        } else if disarm_edge {
            let before = self.state;
            if self.disarm() {
                if before.armed {
                    events.push(ArbiterEvent::Disarmed);
                } else {
                    events.push(ArbiterEvent::ModeChanged { from: before.mode, to: Mode::Init });
                }
            }
        }

        if let Some(mode) = mode_edge {
            let from = self.state.mode;
            match self.request_mode(mode) {
                Ok(true) => events.push(ArbiterEvent::ModeChanged { from, to: mode }),
                Ok(false) => {}
                Err(e) => events.push(ArbiterEvent::Rejected(e)),
            }
        }

        if self.state.mode == Mode::Manual {
            self.cmd_vel.linear.x = joy.axis(self.mapping.linear_axis);
            self.cmd_vel.angular.z = joy.axis(self.mapping.angular_axis);
        }

        events
    }

    /// External velocity command; accepted only in `CmdVel` mode.
    pub fn handle_cmd_vel(&mut self, twist: &Twist) -> bool {
        if self.state.mode != Mode::CmdVel {
            return false;
        }
        self.cmd_vel = *twist;
        true
    }

    /// `(V, omega)` handed to the mixer; zero while disarmed.
    pub fn velocity_command(&self) -> (f64, f64) {
        if !self.state.armed {
            return (0.0, 0.0);
        }
        (self.cmd_vel.linear.x, self.cmd_vel.angular.z)
    }
}

/// Counts `event` in the shared metrics and appends it to the event log.
pub(crate) fn record_event(ctx: &TaskContext, task: &'static str, event: &ArbiterEvent) {
    let (kind, detail) = match event {
        ArbiterEvent::Armed(mode) => (EventKind::Armed, mode.name()),
        ArbiterEvent::Disarmed => (EventKind::Disarmed, ""),
        ArbiterEvent::ModeChanged { to, .. } => (EventKind::ModeChanged, to.name()),
        ArbiterEvent::Rejected(_) => (EventKind::ModeRejected, ""),
    };
    {
        let mut m = metrics::lock(&ctx.metrics);
        if kind == EventKind::ModeRejected {
            m.arbiter_rejections += 1;
        } else {
            m.arbiter_transitions += 1;
        }
    }
    ctx.recorder.record(ctx.event(task, kind).with_detail(detail));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Vector3;

    fn rover() -> ModeArbiter {
        ModeArbiter::new(VehicleKind::GroundRover, JoyMapping::default())
    }

    fn joy(pressed: &[usize], axes: &[f64]) -> Joy {
        let mut buttons = vec![0; 8];
        for &b in pressed {
            buttons[b] = 1;
        }
        Joy { buttons, axes: axes.to_vec() }
    }

    #[test]
    fn test_arm_rejected_in_init() {
        let mut arb = rover();
        assert_eq!(arb.arm(), Err(ArbiterError::ArmWithoutMode));
        assert!(!arb.state().armed);
    }

    #[test]
    fn test_arm_after_mode_selected_and_disarm_resets_mode() {
        let mut arb = rover();
        assert_eq!(arb.request_mode(Mode::Manual), Ok(true));
        assert_eq!(arb.arm(), Ok(true));
        assert_eq!(arb.arm(), Ok(false));
        assert!(arb.state().armed);

        assert!(arb.disarm());
        assert_eq!(arb.state(), ModeState { mode: Mode::Init, armed: false, prev_mode: Mode::Manual });
    }

    #[test]
    fn test_disarm_always_permitted() {
        let mut arb = rover();
        arb.request_mode(Mode::CmdVel).unwrap();
        assert!(arb.disarm());
        assert_eq!(arb.state().mode, Mode::Init);
        assert!(!arb.disarm());
    }

    #[test]
    fn test_unsupported_mode_leaves_state() {
        let mut arb = rover();
        arb.request_mode(Mode::Manual).unwrap();
        let before = arb.state();
        assert_eq!(arb.request_mode(Mode::Auto), Err(ArbiterError::UnsupportedMode(Mode::Auto)));
        assert_eq!(arb.request_mode(Mode::Position), Err(ArbiterError::UnsupportedMode(Mode::Position)));
        assert_eq!(arb.state(), before);
    }

    #[test]
    fn test_joy_edges_drive_transitions() {
        let mut arb = rover();

        // arm press while in init: rejected, mode button in same message ignored
        let events = arb.handle_joy(&joy(&[7, 0], &[]));
        assert_eq!(events, vec![ArbiterEvent::Rejected(ArbiterError::ArmWithoutMode)]);
        assert_eq!(arb.state().mode, Mode::Init);

        // holding the same buttons is not a new edge
        assert!(arb.handle_joy(&joy(&[7, 0], &[])).is_empty());
        arb.handle_joy(&joy(&[], &[]));

        let events = arb.handle_joy(&joy(&[0], &[]));
        assert_eq!(events, vec![ArbiterEvent::ModeChanged { from: Mode::Init, to: Mode::Manual }]);

        let events = arb.handle_joy(&joy(&[7], &[]));
        assert_eq!(events, vec![ArbiterEvent::Armed(Mode::Manual)]);

        let events = arb.handle_joy(&joy(&[1], &[]));
        assert_eq!(events, vec![ArbiterEvent::Rejected(ArbiterError::UnsupportedMode(Mode::Auto))]);
        assert_eq!(arb.status(), Status { mode: Mode::Manual, armed: true });

        let events = arb.handle_joy(&joy(&[6], &[]));
        assert_eq!(events, vec![ArbiterEvent::Disarmed]);
        assert_eq!(arb.status(), Status { mode: Mode::Init, armed: false });
    }

    #[test]
    fn test_disarm_button_returns_disarmed_vehicle_to_init() {
        let mut arb = rover();
        arb.handle_joy(&joy(&[2], &[]));
        assert_eq!(arb.status(), Status { mode: Mode::CmdVel, armed: false });

        let events = arb.handle_joy(&joy(&[6], &[]));
        assert_eq!(events, vec![ArbiterEvent::ModeChanged { from: Mode::CmdVel, to: Mode::Init }]);
        assert_eq!(arb.status(), Status::default());

        // already in init: nothing to report
        arb.handle_joy(&joy(&[], &[]));
        assert!(arb.handle_joy(&joy(&[6], &[])).is_empty());
    }

    #[test]
    fn test_manual_axes_and_cmd_vel_gating() {
        let mut arb = rover();
        arb.handle_joy(&joy(&[0], &[]));
        arb.handle_joy(&joy(&[7], &[0.0, 0.4, 0.0, -0.2]));
        assert_eq!(arb.velocity_command(), (0.4, -0.2));

        let twist = Twist { linear: Vector3::new(1.0, 0.0, 0.0), angular: Vector3::new(0.0, 0.0, 0.5) };
        assert!(!arb.handle_cmd_vel(&twist));
        assert_eq!(arb.velocity_command(), (0.4, -0.2));

        arb.handle_joy(&joy(&[2], &[]));
        assert!(arb.handle_cmd_vel(&twist));
        assert_eq!(arb.velocity_command(), (1.0, 0.5));
    }

    #[test]
    fn test_velocity_zero_when_disarmed() {
        let mut arb = rover();
        arb.request_mode(Mode::CmdVel).unwrap();
        let twist = Twist { linear: Vector3::new(2.0, 0.0, 0.0), angular: Vector3::new(0.0, 0.0, 1.0) };
        assert!(arb.handle_cmd_vel(&twist));
        assert_eq!(arb.velocity_command(), (0.0, 0.0));
        arb.arm().unwrap();
        assert_eq!(arb.velocity_command(), (2.0, 1.0));
    }

    #[test]
    fn test_multirotor_profile_accepts_position_modes() {
        let mut arb = ModeArbiter::new(VehicleKind::Multirotor, JoyMapping::default());
        assert_eq!(arb.request_mode(Mode::Bezier), Ok(true));
        assert_eq!(arb.request_mode(Mode::CmdVel), Err(ArbiterError::UnsupportedMode(Mode::CmdVel)));
    }
}
