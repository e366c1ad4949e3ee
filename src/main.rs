//! Demo binary: runs the control stack of the configured vehicle against a
//! simulated estimator and a scripted operator, with a line shell on stdin.
//!
//! Usage: `rts_control [config.json]`
//! Shell: `<task> <start|stop|status>`, `tasks`, `exit`.

use std::{
    fs::create_dir_all,
    io::{BufRead, Write, stdin, stdout},
    path::PathBuf,
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{error, info, warn};
use rand::random_range;
use spin_sleep::{SpinSleeper, SpinStrategy};

use rts_control::bus::{TopicBus, catalog};
use rts_control::clock::{MonotonicClock, SharedClock};
use rts_control::config::{ControlConfig, VehicleKind};
use rts_control::control::{build_runners, runner::TaskRunner, task::TaskContext};
use rts_control::messages::{Header, Joy, Odometry, Vector3};
use rts_control::utils::{
    export::export_summary_csv,
    metrics::{EventRecorder, shared_metrics},
};

const LOG_DIR: &str = "data/logs";
const ESTIMATOR_PERIOD: Duration = Duration::from_millis(5);
const SCRIPT_PERIOD: Duration = Duration::from_millis(20);
const RATE_NOISE: f64 = 0.01;

fn main() -> ExitCode {
    env_logger::init();
    info!("=== CONTROL STACK START ===");

    let config = match std::env::args().nth(1) {
        Some(path) => match ControlConfig::from_json_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("cannot load config {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => ControlConfig::default(),
    };
    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    info!("vehicle: {:?}", config.vehicle);

    if let Err(e) = create_dir_all(LOG_DIR) {
        error!("failed to create log directory {}: {}", LOG_DIR, e);
        return ExitCode::FAILURE;
    }

    let bus = TopicBus::new();
    let clock = MonotonicClock::shared();
    let metrics = shared_metrics();
    let recorder = EventRecorder::new();
    let ctx = TaskContext::new(clock.clone(), metrics.clone(), recorder.clone());

    let exporter_stop = Arc::new(AtomicBool::new(false));
    let exporter = recorder.start_exporter(PathBuf::from(LOG_DIR).join("events.csv"), exporter_stop.clone());

    let mut runners = build_runners(&bus, &config, &ctx);
    for runner in runners.iter_mut() {
        if let Err(e) = runner.start() {
            error!("[{}] {}", runner.name(), e);
        }
    }

    let sim_running = Arc::new(AtomicBool::new(true));
    let estimator = spawn_estimator(bus.clone(), clock.clone(), sim_running.clone());
    let operator = spawn_operator(bus.clone(), config.vehicle, sim_running.clone());

    run_shell(&mut runners);

    info!("[Main] shutting down...");
    for runner in runners.iter_mut() {
        runner.stop();
    }
    for runner in runners.iter_mut() {
        runner.join();
    }
    sim_running.store(false, Ordering::Release);
    for (name, handle) in [("estimator", estimator), ("operator", operator)] {
        if handle.join().is_err() {
            error!("[Main] {} thread panicked", name);
        }
    }

    match export_summary_csv(&metrics, &PathBuf::from(LOG_DIR).join("summary.csv")) {
        Ok(rows) => info!("[Main] summary: {} task rows", rows),
        Err(e) => error!("[Main] summary export failed: {}", e),
    }
    exporter_stop.store(true, Ordering::Release);
    if exporter.join().is_err() {
        error!("[Main] event exporter panicked");
    }

    info!("=== CONTROL STACK FINISHED ===");
    ExitCode::SUCCESS
}

/// Reads commands until `exit` or end of input.
fn run_shell(runners: &mut [TaskRunner]) {
    let names: Vec<&str> = runners.iter().map(|r| r.name()).collect();
    println!("tasks: {}", names.join(", "));
    println!("commands: <task> <start|stop|status>, tasks, exit");

    let mut lines = stdin().lock().lines();
    loop {
        print!("> ");
        let _ = stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                warn!("stdin: {}", e);
                break;
            }
            None => break,
        };
        let mut words = line.split_whitespace();
        let Some(target) = words.next() else { continue };
        let argv: Vec<&str> = words.collect();

        match target {
            "exit" | "quit" => break,
            "tasks" => {
                for runner in runners.iter_mut() {
                    println!("{:<14} {:?}", runner.name(), runner.state());
                }
            }
            name => match runners.iter_mut().find(|r| r.name() == name) {
                Some(runner) => {
                    let reply = runner.shell(&argv);
                    println!("[{}] {} ({})", name, reply.text, reply.code);
                }
                None => println!("unknown task '{}'", name),
            },
        }
    }
}

/// Simulated estimator: hovering at the origin with noisy body rates.
fn spawn_estimator(bus: Arc<TopicBus>, clock: SharedClock, running: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        let topic = match bus.topic(catalog::ESTIMATOR_ODOMETRY) {
            Ok(t) => t,
            Err(e) => {
                error!("[estimator] {}", e);
                return;
            }
        };
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut next_deadline = Instant::now() + ESTIMATOR_PERIOD;
        let mut seq = 0u64;

        while running.load(Ordering::Acquire) {
            seq += 1;
            let mut odom = Odometry {
                header: Header { stamp_ns: clock.now_ns(), seq, frame_id: "odom" },
                ..Odometry::default()
            };
            odom.twist.angular = Vector3::new(
                random_range(-RATE_NOISE..RATE_NOISE),
                random_range(-RATE_NOISE..RATE_NOISE),
                random_range(-RATE_NOISE..RATE_NOISE),
            );
            if let Err(e) = topic.publish(odom) {
                warn!("[estimator] {}", e);
            }

            let now = Instant::now();
            if next_deadline > now {
                sleeper.sleep(next_deadline - now);
            }
            next_deadline += ESTIMATOR_PERIOD;
        }
        info!("[estimator] stopped after {} samples", seq);
    })
}

/// Scripted operator: arms the vehicle and keeps feeding setpoints.
fn spawn_operator(bus: Arc<TopicBus>, vehicle: VehicleKind, running: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        let result = match vehicle {
            VehicleKind::Multirotor => fly_hover(&bus, &running),
            VehicleKind::GroundRover => drive_manual(&bus, &running),
        };
        if let Err(e) = result {
            error!("[operator] {}", e);
        }
    })
}

fn fly_hover(bus: &TopicBus, running: &AtomicBool) -> Result<(), rts_control::error::BusError> {
    let joy = bus.topic(catalog::JOYSTICK_INPUT)?;
    let position_sp = bus.topic(catalog::POSITION_SP)?;
    let rate_sp = bus.topic(catalog::ANGULAR_VELOCITY_SP)?;
    let press = |button: usize| {
        let mut buttons = vec![0; 8];
        buttons[button] = 1;
        Joy { buttons, axes: Vec::new() }
    };
    let release = Joy { buttons: vec![0; 8], axes: Vec::new() };
    let hold = Duration::from_millis(100);

    position_sp.publish(Vector3::new(0.0, 0.0, 1.0))?;
    // select position, then arm
    joy.publish(press(1))?;
    thread::sleep(hold);
    joy.publish(release.clone())?;
    thread::sleep(hold);
    joy.publish(press(7))?;
    thread::sleep(hold);
    joy.publish(release)?;

    while running.load(Ordering::Acquire) {
        rate_sp.publish(Vector3::default())?;
        thread::sleep(SCRIPT_PERIOD);
    }
    joy.publish(press(6))?;
    Ok(())
}

fn drive_manual(bus: &TopicBus, running: &AtomicBool) -> Result<(), rts_control::error::BusError> {
    let joy = bus.topic(catalog::JOYSTICK_INPUT)?;
    let press = |button: usize, axes: Vec<f64>| {
        let mut buttons = vec![0; 8];
        buttons[button] = 1;
        Joy { buttons, axes }
    };
    let release = Joy { buttons: vec![0; 8], axes: Vec::new() };
    let hold = Duration::from_millis(100);

    // select manual, then arm
    joy.publish(press(0, Vec::new()))?;
    thread::sleep(hold);
    joy.publish(release.clone())?;
    thread::sleep(hold);
    joy.publish(press(7, Vec::new()))?;
    thread::sleep(hold);

    let started = Instant::now();
    while running.load(Ordering::Acquire) {
        // slow forward arc
        let turn = (started.elapsed().as_secs_f64() * 0.5).sin() * 0.5;
        joy.publish(Joy { buttons: vec![0; 8], axes: vec![0.0, 0.3, 0.0, turn] })?;
        thread::sleep(SCRIPT_PERIOD);
    }
    joy.publish(press(6, Vec::new()))?;
    Ok(())
}
