//! # Boost Supply Simulation Entry Point
//!
//! Closed-loop run of the digitally-regulated boost converter: a simulated
//! power stage feeds the sampling loop, the feedback controller regulates
//! voltage/current, and status text flows through the byte relay the way a
//! device streams it to a polling host.
//!
//! ## Modes
//! - **Scripted (default):** calibrate, command 5 V / 300 mA through the
//!   buffered console path, run, then step the load down until the current
//!   limit takes over (CC), and export the run telemetry.
//! - **Interactive (`--interactive`):** stdin drives the console key
//!   protocol (`0 + - c v 1..9`, `q` quits).
//!
//! ## Outputs
//! - `data/telemetry.csv` — per-tick trace (microsecond timestamps).
//! - `data/run_summary.csv` — aggregated stats.

use std::{
    fs::create_dir_all,
    io::{Read, stdin, stdout},
    path::Path,
    sync::{Arc, Mutex, atomic::{AtomicBool, Ordering}},
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, bounded};
use log::{error, info, warn};

use boost_supply::acquisition::{Plant, PlantConfig, Sampler, SamplerConfig, SupplyEvent};
use boost_supply::console::{CommandConsole, parse_key};
use boost_supply::regulator::{FeedbackController, RegulatorHandle, RegulatorShared};
use boost_supply::relay::{FramePoller, PrintSink, SharedRing, take_line};
use boost_supply::utils::export::run_exports;
use boost_supply::utils::telemetry::{Metrics, SharedMetrics, TelemetryRecorder};

const DEFAULT_RUN_SECS: u64 = 6;
const PRINT_RING_BYTES: usize = 256;
const COMMAND_RING_BYTES: usize = 64;
const POLL_INTERVAL_MS: u64 = 5;

/// Load steps used by the scripted scenario, in milliohms.
const LOAD_NOMINAL_MOHM: u32 = 50_000; // 50 Ohm: ~100 mA at 5 V (CV)
const LOAD_HEAVY_MOHM: u32 = 12_000; // 12 Ohm: would draw ~416 mA, forces CC

fn main() {
    env_logger::init();
    info!("=== BOOST SUPPLY START ===");

    let interactive = std::env::args().any(|arg| arg == "--interactive");
    let run_secs = std::env::var("BOOST_RUN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_RUN_SECS);

    // Regulator state: one shared instance, handles everywhere else.
    let shared = RegulatorShared::new();
    let handle = RegulatorHandle::new(shared.clone());
    let controller = FeedbackController::new(shared);

    let plant = Plant::new(PlantConfig::default());
    let load = plant.load_control();

    let metrics: SharedMetrics = Arc::new(Mutex::new(Metrics::default()));
    let recorder = TelemetryRecorder::new();
    create_dir_all("data").ok();
    let exporter_handle = recorder.start_exporter("data/telemetry.csv".into());

    // Print relay: sampling context produces status text, a polled consumer
    // forwards it to the host in 8-byte frames.
    let print_ring = Arc::new(
        SharedRing::thread_safe(vec![0u8; PRINT_RING_BYTES]).expect("print ring storage"),
    );
    let sink = PrintSink::new(print_ring.clone());

    let (event_tx, event_rx) = bounded::<SupplyEvent>(64);
    let running = Arc::new(AtomicBool::new(true));

    let sampler = Sampler::new(
        SamplerConfig::default(),
        plant,
        controller,
        handle.clone(),
        running.clone(),
        metrics.clone(),
        recorder.clone(),
        Some(sink.clone()),
        Some(event_tx),
    );
    let sampler_handle = sampler.spawn().expect("failed to spawn sampler thread");

    // Polled consumer draining the print relay, the way the host polls the
    // report endpoint.
    let poller_handle = {
        let ring = print_ring.clone();
        let running = running.clone();
        thread::spawn(move || {
            let mut poller = FramePoller::new(ring, stdout());
            while running.load(Ordering::Acquire) {
                if let Err(e) = poller.poll() {
                    error!("print relay poll failed: {}", e);
                    break;
                }
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
            let _ = poller.drain();
        })
    };

    // The loop calibrates before regulation is allowed on.
    match event_rx.recv_timeout(Duration::from_secs(5)) {
        Ok(SupplyEvent::CalibrationDone { offset }) => {
            info!("calibration complete, zero-current offset {}", offset);
        }
        other => warn!("calibration event not seen: {:?}", other),
    }

    let mut console = CommandConsole::new(handle.clone());
    if interactive {
        run_interactive(&mut console, &event_rx, running.clone());
    } else {
        run_scripted(&mut console, &event_rx, &load, run_secs);
    }

    info!("shutting down...");
    console.apply(boost_supply::console::Command::AllOff);
    thread::sleep(Duration::from_millis(50));
    running.store(false, Ordering::Release);

    let _ = sampler_handle.join();
    let _ = poller_handle.join();
    recorder.finish();
    let _ = exporter_handle.join();

    let state = handle.state();
    info!(
        "final state: {} mV, {} mA, duty {}, cc {}",
        state.voltage_mv, state.current_ma, state.duty, state.cc_mode
    );
    if sink.dropped_bytes() > 0 {
        warn!("print relay dropped {} bytes", sink.dropped_bytes());
    }

    run_exports(metrics, Path::new("data"));
    info!("=== BOOST SUPPLY FINISHED ===");
}

/// Scripted scenario: command the targets through the buffered console path,
/// let the loop settle in CV, then step the load into the current limit.
fn run_scripted(
    console: &mut CommandConsole,
    events: &Receiver<SupplyEvent>,
    load: &Arc<std::sync::atomic::AtomicU32>,
    run_secs: u64,
) {
    // Operator input arrives as buffered key bytes: 5 V target, then switch
    // the adjustment axis and set a 300 mA limit.
    let command_ring =
        SharedRing::thread_safe(vec![0u8; COMMAND_RING_BYTES]).expect("command ring storage");
    command_ring.put(b"5c3").expect("command bytes fit");
    let applied = console.pump(&command_ring);
    info!(
        "scripted targets applied ({} commands): {} mV, {} mA limit",
        applied,
        console.voltage_target_mv(),
        console.current_limit_ma()
    );

    load.store(LOAD_NOMINAL_MOHM, Ordering::Relaxed);
    info!("load connected: {} mOhm", LOAD_NOMINAL_MOHM);
    watch_events(events, Duration::from_secs(run_secs / 2));

    load.store(LOAD_HEAVY_MOHM, Ordering::Relaxed);
    info!("load step: {} mOhm (expect CC)", LOAD_HEAVY_MOHM);
    watch_events(events, Duration::from_secs(run_secs - run_secs / 2));
}

/// Interactive console loop: one key per command, status printed by the relay.
fn run_interactive(
    console: &mut CommandConsole,
    events: &Receiver<SupplyEvent>,
    running: Arc<AtomicBool>,
) {
    info!("interactive mode: 0 + - c v 1..9, q quits");
    let command_ring = Arc::new(
        SharedRing::thread_safe(vec![0u8; COMMAND_RING_BYTES]).expect("command ring storage"),
    );

    // Reader thread buffers raw stdin bytes into the command ring.
    let reader_handle = {
        let ring = command_ring.clone();
        let running = running.clone();
        thread::spawn(move || {
            for byte in stdin().bytes() {
                match byte {
                    Ok(b'q') | Err(_) => break,
                    Ok(b) => {
                        // A full ring drops the key; the operator retypes it.
                        let _ = ring.put(&[b]);
                    }
                }
                if !running.load(Ordering::Acquire) {
                    break;
                }
            }
            running.store(false, Ordering::Release);
        })
    };

    // Terminal input is line-buffered: consume whole lines from the command
    // ring and apply each key in order.
    let mut line = [0u8; COMMAND_RING_BYTES];
    while running.load(Ordering::Acquire) {
        while let Ok(Some(count)) = take_line(&command_ring, &mut line) {
            for &byte in &line[..count] {
                if let Some(command) = parse_key(byte) {
                    console.apply(command);
                }
            }
        }
        watch_events(events, Duration::from_millis(100));
    }
    let _ = reader_handle.join();
}

/// Drains loop events for `window`, logging mode transitions.
fn watch_events(events: &Receiver<SupplyEvent>, window: Duration) {
    let deadline = Instant::now() + window;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()).filter(|d| !d.is_zero()) {
        match events.recv_timeout(remaining) {
            Ok(SupplyEvent::ModeChange { cc_mode }) => {
                info!("mode change: {}", if cc_mode { "CC" } else { "CV" });
            }
            Ok(SupplyEvent::CalibrationDone { offset }) => {
                info!("recalibrated, offset {}", offset);
            }
            Err(_) => break,
        }
    }
}
