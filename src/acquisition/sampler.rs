//! Periodic sampling loop — the host-side stand-in for the ADC
//! end-of-conversion interrupt.
//!
//! Owns the plant and the controller: once per control period it advances the
//! plant with the last duty command, feeds the fresh triple to the
//! controller, and publishes telemetry. Runs on a max-priority thread;
//! scheduling misses and period jitter are tracked per tick.
//!
//! Startup performs the zero-current calibration: the loop runs with
//! regulation disabled for a settling window, then commits the stable
//! current-sense reading as the zero offset.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use log::debug;
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::acquisition::plant::Plant;
use crate::regulator::{AdcTriple, FeedbackController, RegulatorHandle};
use crate::relay::PrintSink;
use crate::utils::telemetry::{
    DeadlineComponent, SharedMetrics, TelemetryRecorder, TickRow, push_capped, push_capped_u64,
};

/// Loop notifications for the supervising context, sent without blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplyEvent {
    CalibrationDone { offset: i32 },
    ModeChange { cc_mode: bool },
}

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Control period in microseconds.
    pub period_us: u64,
    /// Ticks to run with regulation disabled before committing calibration.
    pub settle_ticks: u32,
    /// Emit one status line into the print relay every N ticks; 0 disables.
    pub status_every: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            period_us: 1_000,
            settle_ticks: 100,
            status_every: 250,
        }
    }
}

pub struct Sampler {
    cfg: SamplerConfig,
    plant: Plant,
    controller: FeedbackController,
    handle: RegulatorHandle,
    running: Arc<AtomicBool>,
    metrics: SharedMetrics,
    recorder: TelemetryRecorder,
    sink: Option<PrintSink>,
    events: Option<Sender<SupplyEvent>>,
}

impl Sampler {
    pub fn new(
        cfg: SamplerConfig,
        plant: Plant,
        controller: FeedbackController,
        handle: RegulatorHandle,
        running: Arc<AtomicBool>,
        metrics: SharedMetrics,
        recorder: TelemetryRecorder,
        sink: Option<PrintSink>,
        events: Option<Sender<SupplyEvent>>,
    ) -> Self {
        Self {
            cfg,
            plant,
            controller,
            handle,
            running,
            metrics,
            recorder,
            sink,
            events,
        }
    }

    /// Spawns the loop on a dedicated max-priority thread. Falls back to the
    /// default priority when the OS refuses elevation.
    pub fn spawn(mut self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("sampler".into())
            .spawn_with_priority(ThreadPriority::Max, move |priority| {
                if priority.is_err() {
                    debug!("sampler running without elevated priority");
                }
                self.run();
            })
    }

    fn emit(&self, event: SupplyEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }

    /// The sampling loop. Blocks until `running` clears.
    pub fn run(&mut self) {
        let period = Duration::from_micros(self.cfg.period_us);
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

        // Calibration settle: both targets are still zero, so every tick
        // floors the duty while the sense path stabilizes.
        let mut sample = AdcTriple::default();
        for _ in 0..self.cfg.settle_ticks {
            sleeper.sleep(period);
            sample = self.plant.step(self.controller.duty());
            self.controller.tick(sample);
        }
        self.controller.calibrate(sample);
        self.emit(SupplyEvent::CalibrationDone {
            offset: sample.current as i32,
        });

        let mut next_deadline = Instant::now() + period;
        let mut last_tick = Instant::now();
        let mut tick: u64 = 0;
        let mut was_cc = self.controller.cc_mode();

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
            } else {
                // Woke up late: the control period was stretched.
                let mut m = match self.metrics.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                m.record_deadline_miss(DeadlineComponent::Sampler);
            }

            let actual_tick = Instant::now();
            let actual_period_us = actual_tick.duration_since(last_tick).as_micros() as u64;
            let jitter_us = actual_period_us.abs_diff(self.cfg.period_us);
            last_tick = actual_tick;

            // The new sample reflects the previous duty command, exactly as
            // the hardware pipeline does.
            let sample = self.plant.step(self.controller.duty());
            self.controller.tick(sample);

            if self.controller.cc_mode() != was_cc {
                was_cc = self.controller.cc_mode();
                self.emit(SupplyEvent::ModeChange { cc_mode: was_cc });
                let mut m = match self.metrics.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                m.cc_transitions += 1;
            }

            let state = self.handle.state();
            self.recorder.record(TickRow {
                tick,
                ts_us: self.recorder.now_us(),
                voltage_mv: state.voltage_mv,
                current_ma: state.current_ma,
                duty: state.duty,
                cc_mode: state.cc_mode,
                jitter_us,
            });

            {
                let mut m = match self.metrics.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                push_capped(&mut m.voltage_mv, state.voltage_mv as f64);
                push_capped(&mut m.current_ma, state.current_ma as f64);
                push_capped(&mut m.duty, state.duty as f64);
                push_capped_u64(&mut m.jitter_us, jitter_us);
                m.total_ticks += 1;
            }

            if self.cfg.status_every > 0 && tick % self.cfg.status_every == 0 {
                if let Some(sink) = &mut self.sink {
                    let power_mw = state.voltage_mv as u64 * state.current_ma as u64 / 1000;
                    let _ = writeln!(
                        sink,
                        "CC: {}, Voltage: {}mV, Current: {}mA, Power: {}mW",
                        state.cc_mode as u8, state.voltage_mv, state.current_ma, power_mw
                    );
                }
            }

            next_deadline += period;
            tick += 1;
        }

        debug!("sampler stopped after {} ticks", tick);
    }
}
