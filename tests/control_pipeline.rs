//! Threaded runs of the task runners over a real bus.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use rts_control::bus::{TopicBus, catalog};
use rts_control::clock::MonotonicClock;
use rts_control::config::{ControlConfig, VehicleKind};
use rts_control::control::{
    build_runners,
    runner::{TaskRunner, TaskState},
    task::TaskContext,
};
use rts_control::messages::{Actuators, Header, Joy, Mode, Odometry, Status, Vector3};
use rts_control::utils::metrics::{self, EventRecorder, SharedMetrics, shared_metrics};

fn context() -> (TaskContext, SharedMetrics) {
    let metrics = shared_metrics();
    let ctx = TaskContext::new(MonotonicClock::shared(), metrics.clone(), EventRecorder::new());
    (ctx, metrics)
}

fn start_all(runners: &mut [TaskRunner]) {
    for r in runners.iter_mut() {
        assert!(r.start().unwrap(), "{} did not start", r.name());
    }
}

fn stop_all(runners: &mut [TaskRunner]) {
    for r in runners.iter_mut() {
        r.stop();
    }
    for r in runners.iter_mut() {
        r.join();
    }
}

fn joy(pressed: &[usize], axes: &[f64]) -> Joy {
    let mut buttons = vec![0; 8];
    for &b in pressed {
        buttons[b] = 1;
    }
    Joy { buttons, axes: axes.to_vec() }
}

#[test]
fn test_multirotor_estimator_to_actuators() {
    let bus = TopicBus::new();
    let (ctx, metrics) = context();
    let config = ControlConfig::default();
    let mut runners = build_runners(&bus, &config, &ctx);
    assert_eq!(runners.len(), 4);

    bus.topic(catalog::POSITION_SP).unwrap().publish(Vector3::new(0.0, 0.0, 1.0)).unwrap();
    bus.topic(catalog::ANGULAR_VELOCITY_SP).unwrap().publish(Vector3::new(0.1, 0.0, 0.0)).unwrap();
    start_all(&mut runners);

    // the operator selects position flight, then arms
    let input = bus.topic(catalog::JOYSTICK_INPUT).unwrap();
    let hold = Duration::from_millis(80);
    input.publish(joy(&[1], &[])).unwrap();
    thread::sleep(hold);
    input.publish(joy(&[], &[])).unwrap();
    thread::sleep(hold);
    input.publish(joy(&[7], &[])).unwrap();
    thread::sleep(hold);
    assert_eq!(bus.peek(catalog::STATUS).unwrap().0, Status { mode: Mode::Position, armed: true });

    let odom = bus.topic(catalog::ESTIMATOR_ODOMETRY).unwrap();
    for seq in 1..=60 {
        odom.publish(Odometry {
            header: Header { stamp_ns: 0, seq, frame_id: "odom" },
            ..Odometry::default()
        })
        .unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    stop_all(&mut runners);

    let (moment, moment_seq) = bus.peek(catalog::MOMENT_SP).unwrap();
    assert!(moment_seq > 0);
    assert!(moment.x > 0.0);
    assert_eq!(moment.y, 0.0);

    let (force, _) = bus.peek(catalog::FORCE_SP).unwrap();
    // below the target: more than the hover trim
    assert!(force.z > config.position.thrust_trim());
    let (attitude, _) = bus.peek(catalog::ATTITUDE_SP).unwrap();
    assert!((attitude.w.abs() - 1.0).abs() < 1e-9);

    let (out, seq): (Actuators, u64) = bus.peek(catalog::ACTUATORS).unwrap();
    assert!(seq > 0);
    assert_eq!(out.velocity_count(), 4);
    assert!(out.velocity.iter().all(|w| w.is_finite()));
    assert!(out.velocity.iter().sum::<f64>() > 0.0);

    let m = metrics::lock(&metrics);
    assert!(m.tasks["angular_rate"].publishes > 0);
    assert!(m.tasks["position"].publishes > 0);
    assert!(m.tasks["mixing"].publishes > 0);
    assert!(m.tasks["flight_mode"].publishes > 0);
    assert_eq!(m.arbiter_transitions, 2);
}

#[test]
fn test_multirotor_arm_in_init_keeps_motors_stopped() {
    let bus = TopicBus::new();
    let (ctx, metrics) = context();
    let mut runners = build_runners(&bus, &ControlConfig::default(), &ctx);
    start_all(&mut runners);

    bus.topic(catalog::ANGULAR_VELOCITY_SP).unwrap().publish(Vector3::new(0.1, 0.0, 0.0)).unwrap();
    bus.topic(catalog::JOYSTICK_INPUT).unwrap().publish(joy(&[7], &[])).unwrap();
    let odom = bus.topic(catalog::ESTIMATOR_ODOMETRY).unwrap();
    for _ in 0..30 {
        odom.publish(Odometry::default()).unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    stop_all(&mut runners);

    assert_eq!(bus.peek(catalog::STATUS).unwrap().0, Status::default());
    let (out, seq) = bus.peek(catalog::ACTUATORS).unwrap();
    assert!(seq > 0);
    assert!(out.velocity.iter().all(|&w| w == 0.0));
    assert_eq!(metrics::lock(&metrics).arbiter_rejections, 1);
}

#[test]
fn test_rover_joystick_to_wheels() {
    let bus = TopicBus::new();
    let (ctx, metrics) = context();
    let config = ControlConfig { vehicle: VehicleKind::GroundRover, ..ControlConfig::default() };
    let mut runners = build_runners(&bus, &config, &ctx);
    assert_eq!(runners.len(), 1);
    start_all(&mut runners);

    let input = bus.topic(catalog::JOYSTICK_INPUT).unwrap();
    let hold = Duration::from_millis(80);
    input.publish(joy(&[0], &[])).unwrap();
    thread::sleep(hold);
    input.publish(joy(&[], &[])).unwrap();
    thread::sleep(hold);
    input.publish(joy(&[7], &[0.0, 0.5, 0.0, 0.0])).unwrap();
    thread::sleep(hold);

    assert_eq!(bus.peek(catalog::STATUS).unwrap().0, Status { mode: Mode::Manual, armed: true });
    let (out, _) = bus.peek(catalog::ACTUATORS).unwrap();
    let fwd = 0.5 / config.rover.geometry.wheel_radius;
    assert!(out.velocity.iter().all(|w| (w - fwd).abs() < 1e-9));
    assert_eq!(out.header.frame_id, "base_link");

    input.publish(joy(&[6], &[0.0, 0.5, 0.0, 0.0])).unwrap();
    thread::sleep(hold);
    stop_all(&mut runners);

    assert_eq!(bus.peek(catalog::STATUS).unwrap().0, Status::default());
    assert_eq!(bus.peek(catalog::ACTUATORS).unwrap().0.velocity, vec![0.0; 4]);
    assert_eq!(metrics::lock(&metrics).arbiter_transitions, 3);
}

#[test]
fn test_stop_and_restart_rate_task() {
    let bus = TopicBus::new();
    let (ctx, metrics) = context();
    let mut runners = build_runners(&bus, &ControlConfig::default(), &ctx);
    let rate = runners
        .iter_mut()
        .find(|r| r.name() == "angular_rate")
        .unwrap();

    assert_eq!(rate.shell(&["start"]).code, 0);
    // no estimator: every wait times out
    thread::sleep(Duration::from_millis(350));
    assert_eq!(rate.shell(&["stop"]).text, "stopping");
    rate.join();
    assert_eq!(rate.state(), TaskState::Joined);
    assert!(metrics::lock(&metrics).tasks["angular_rate"].timeouts >= 2);
    assert_eq!(bus.peek(catalog::MOMENT_SP).unwrap().1, 0);

    // a fresh node after restart drives the loop again
    assert_eq!(rate.shell(&["start"]).text, "started");
    let odom = bus.topic(catalog::ESTIMATOR_ODOMETRY).unwrap();
    for _ in 0..10 {
        odom.publish(Odometry::default()).unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    rate.stop();
    rate.join();
    assert!(bus.peek(catalog::MOMENT_SP).unwrap().1 > 0);
}

#[test]
fn test_readers_never_see_torn_messages() {
    let bus = TopicBus::new();
    let topic = bus.topic(catalog::ACTUATORS).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let topic = topic.clone();
        let done = done.clone();
        thread::spawn(move || {
            for i in 0..20_000u64 {
                let v = i as f64;
                topic
                    .publish(Actuators {
                        header: Header { stamp_ns: i, seq: i, frame_id: "odom" },
                        velocity: vec![v; 4],
                        normalized: vec![v; 4],
                        position: Vec::new(),
                    })
                    .unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let bus = bus.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut last_seq = 0;
                while !done.load(Ordering::Acquire) {
                    let (msg, seq) = bus.peek(catalog::ACTUATORS).unwrap();
                    assert!(seq >= last_seq);
                    last_seq = seq;
                    if let Some(&first) = msg.velocity.first() {
                        assert!(msg.velocity.iter().all(|&w| w == first));
                        assert_eq!(msg.normalized, msg.velocity);
                        assert_eq!(msg.header.stamp_ns as f64, first);
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(bus.peek(catalog::ACTUATORS).unwrap().1, 20_000);
}
