//! State shared between the sampling context and the command/telemetry side.
//!
//! The sampling loop preempts everything else, so nothing here may block:
//! targets are single-word atomics written by the command side and read by
//! the control tick, and the controller output is published as one packed
//! 64-bit snapshot swapped per tick. A reader always sees the fields of a
//! single tick together, never a torn mix of two.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

use log::info;

use crate::regulator::controller::AdcTriple;
use crate::regulator::convert;

/// Snapshot of the converter output, as published by the last control tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyState {
    pub voltage_mv: u32,
    pub current_ma: u32,
    pub duty: u8,
    pub cc_mode: bool,
}

// Packed snapshot layout: voltage raw [0..16), current raw [16..32),
// reference raw [32..48), duty [48..56), CC flag bit 56.
fn pack(sample: AdcTriple, duty: u8, cc_mode: bool) -> u64 {
    (sample.voltage as u64)
        | (sample.current as u64) << 16
        | (sample.vref as u64) << 32
        | (duty as u64) << 48
        | (cc_mode as u64) << 56
}

fn unpack(word: u64) -> (AdcTriple, u8, bool) {
    let sample = AdcTriple {
        voltage: word as u16,
        current: (word >> 16) as u16,
        vref: (word >> 32) as u16,
    };
    (sample, (word >> 48) as u8, (word >> 56) & 1 == 1)
}

/// Shared regulator state. One instance per converter, created at startup and
/// handed by `Arc` to the sampling loop and to every command/telemetry user.
#[derive(Debug, Default)]
pub struct RegulatorShared {
    target_v_raw: AtomicU32,
    target_i_raw: AtomicU32,
    current_offset: AtomicI32,
    snapshot: AtomicU64,
}

impl RegulatorShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn target_voltage_raw(&self) -> u32 {
        self.target_v_raw.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn target_current_raw(&self) -> u32 {
        self.target_i_raw.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn current_offset(&self) -> i32 {
        self.current_offset.load(Ordering::Relaxed)
    }

    pub(crate) fn set_current_offset(&self, offset: i32) {
        self.current_offset.store(offset, Ordering::Relaxed);
    }

    /// Publishes one tick's output as a single snapshot swap.
    pub(crate) fn publish(&self, sample: AdcTriple, duty: u8, cc_mode: bool) {
        self.snapshot
            .store(pack(sample, duty, cc_mode), Ordering::Relaxed);
    }

    fn load_snapshot(&self) -> (AdcTriple, u8, bool) {
        unpack(self.snapshot.load(Ordering::Relaxed))
    }
}

/// Command/telemetry handle over the shared state. Clone freely; all methods
/// are non-blocking and safe to call while the sampling loop is running.
#[derive(Clone)]
pub struct RegulatorHandle {
    shared: Arc<RegulatorShared>,
}

impl RegulatorHandle {
    pub fn new(shared: Arc<RegulatorShared>) -> Self {
        Self { shared }
    }

    /// Sets the regulation target. Zero disables the converter. The raw
    /// conversion is ratiometric against the latest reference sample; with no
    /// sample yet the target stays zero and the converter stays off.
    pub fn set_voltage_target(&self, millivolts: u32) {
        let (sample, _, _) = self.shared.load_snapshot();
        let raw = convert::millivolts_to_raw(millivolts, sample.vref);
        self.shared.target_v_raw.store(raw as u32, Ordering::Relaxed);
        info!("voltage target {} mV (raw {})", millivolts, raw);
    }

    /// Sets the current limit. Zero disables current limiting, which also
    /// disables the converter until a non-zero limit is set again.
    pub fn set_current_limit(&self, milliamps: u32) {
        let raw = if milliamps > 0 {
            convert::milliamps_to_raw(milliamps, self.shared.current_offset())
        } else {
            0
        };
        self.shared.target_i_raw.store(raw as u32, Ordering::Relaxed);
        info!("current limit {} mA (raw {})", milliamps, raw);
    }

    /// Converter output as of the last control tick.
    pub fn state(&self) -> SupplyState {
        let (sample, duty, cc_mode) = self.shared.load_snapshot();
        SupplyState {
            voltage_mv: convert::voltage_millivolts(sample.voltage, sample.vref),
            current_ma: convert::current_milliamps(
                sample.current,
                self.shared.current_offset(),
            ),
            duty,
            cc_mode,
        }
    }
}
