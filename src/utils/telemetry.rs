//! Telemetry collection for the supply run.
//!
//! Two independent paths, so the sampling loop never blocks on disk:
//! - **TelemetryRecorder:** lock-free queue of per-tick rows drained by a
//!   background CSV exporter thread.
//! - **Metrics:** shared mutex buffer with capped histories for the end-of-run
//!   summary (bounded to 1000 points per series).

use std::{
    collections::VecDeque,
    fs::File,
    io::BufWriter,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;
use log::error;
use serde::Serialize;

const TICK_QUEUE_CAPACITY: usize = 16_384;

/// One exported row per control tick.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickRow {
    pub tick: u64,
    pub ts_us: u64,
    pub voltage_mv: u32,
    pub current_ma: u32,
    pub duty: u8,
    pub cc_mode: bool,
    pub jitter_us: u64,
}

/// Non-blocking per-tick recorder with background CSV export.
///
/// `record` appends to a lock-free queue and returns immediately; rows are
/// dropped silently once the queue is full so the sampling loop never stalls.
pub struct TelemetryRecorder {
    queue: Arc<ArrayQueue<TickRow>>,
    run_start: Instant,
    done: Arc<std::sync::atomic::AtomicBool>,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(TICK_QUEUE_CAPACITY)),
            run_start: Instant::now(),
            done: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn record(&self, row: TickRow) {
        let _ = self.queue.push(row);
    }

    /// Microseconds since recorder creation.
    #[inline]
    pub fn now_us(&self) -> u64 {
        self.run_start.elapsed().as_micros() as u64
    }

    /// Tells the exporter no further rows are coming; it drains and exits.
    pub fn finish(&self) {
        self.done.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Spawns the drain thread writing one CSV row per tick.
    pub fn start_exporter(&self, output_csv: String) -> thread::JoinHandle<()> {
        let queue = self.queue.clone();
        let done = self.done.clone();

        thread::spawn(move || {
            let file = match File::create(&output_csv) {
                Ok(f) => f,
                Err(e) => {
                    error!("failed to create {}: {}", output_csv, e);
                    return;
                }
            };
            let mut writer = csv::Writer::from_writer(BufWriter::new(file));

            loop {
                match queue.pop() {
                    Some(row) => {
                        let _ = writer.serialize(row);
                    }
                    None => {
                        if done.load(std::sync::atomic::Ordering::Acquire) {
                            break;
                        }
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }
            let _ = writer.flush();
        })
    }
}

impl Clone for TelemetryRecorder {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            run_start: self.run_start,
            done: self.done.clone(),
        }
    }
}

/// Live run metrics: output histories, loop jitter, deadline misses.
/// Updated by the sampling loop; read for the end-of-run summary.
#[derive(Default, Clone)]
pub struct Metrics {
    /// Output histories (last 1000 ticks)
    pub voltage_mv: VecDeque<f64>,
    pub current_ma: VecDeque<f64>,
    pub duty: VecDeque<f64>,

    /// Sampling period jitter (microseconds)
    pub jitter_us: VecDeque<u64>,

    /// Deadline miss counters per component
    pub miss_sampler: u64,
    pub miss_poller: u64,
    pub deadline_miss: u64,

    pub cc_transitions: u64,
    pub total_ticks: u64,
}

/// Component identifier for deadline miss attribution.
pub enum DeadlineComponent {
    Sampler,
    Poller,
}

impl Metrics {
    pub fn record_deadline_miss(&mut self, component: DeadlineComponent) {
        match component {
            DeadlineComponent::Sampler => self.miss_sampler += 1,
            DeadlineComponent::Poller => self.miss_poller += 1,
        }
        self.deadline_miss += 1;
    }
}

pub type SharedMetrics = Arc<Mutex<Metrics>>;

pub const MAX_POINTS: usize = 1_000;

/// Appends value to a history buffer; drops the oldest point at capacity.
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Statistics summary for a dataset.
#[derive(Debug, Clone)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

pub fn calculate_stats(data: &VecDeque<f64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in data {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    Some(Stats {
        min,
        max,
        mean: sum / data.len() as f64,
        count: data.len(),
    })
}

pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }
    let mut min = u64::MAX;
    let mut max = 0u64;
    let mut sum = 0u64;
    for &v in data {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    Some(Stats {
        min: min as f64,
        max: max as f64,
        mean: sum as f64 / data.len() as f64,
        count: data.len(),
    })
}
