//! Real-time vehicle control stack.
//!
//! Independent periodic control tasks exchange vehicle state over a
//! latest-value publish/subscribe bus, run the cascaded rate/position loops,
//! and turn commands into per-actuator outputs gated by the arm/mode arbiter.

pub mod bus;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod messages;
pub mod utils;
