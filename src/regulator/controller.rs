//! Boost converter feedback controller.
//!
//! Runs once per sampling period, synchronously with the ADC triple, and
//! produces the next PWM duty command. Regulation is a fixed-point PID on
//! whichever error is smaller — voltage or current — which is what gives the
//! converter its CC/CV limiting behavior: the axis closer to (or past) its
//! target always dominates.
//!
//! There is no error channel out of the tick path; the duty clamp is the
//! safety net and is unconditional.

use log::{debug, info};

use crate::regulator::shared::RegulatorShared;
use std::sync::Arc;

/// Raw 10-bit samples delivered by the sampling trigger, one set per period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdcTriple {
    /// Internal bandgap reference channel.
    pub vref: u16,
    /// Output voltage feedback after the divider.
    pub voltage: u16,
    /// Output current sense, before offset correction.
    pub current: u16,
}

pub const MIN_DUTY: u8 = 0;
pub const MAX_DUTY: u8 = 250;

// Gain exponents: P = e, D = delta >> 3, I = accum >> 6. The derivative is a
// small high-frequency damper; the integral is a slow accumulator at 1/64 of
// the proportional gain.
const D_GAIN_SHIFT: u32 = 3;
const I_GAIN_SHIFT: u32 = 6;

// Anti-windup bound: the integral term alone can span the full duty range
// but the accumulator can never overflow under sustained saturation.
const INTEGRAL_LIMIT: i32 = (MAX_DUTY as i32) << I_GAIN_SHIFT;

/// PID state plus the shared-state handle the tick publishes through.
/// Owned by the sampling context; nothing here is touched from outside it.
pub struct FeedbackController {
    shared: Arc<RegulatorShared>,
    last_error: i32,
    integral: i32,
    duty: u8,
    cc_mode: bool,
}

impl FeedbackController {
    pub fn new(shared: Arc<RegulatorShared>) -> Self {
        Self {
            shared,
            last_error: 0,
            integral: 0,
            duty: MIN_DUTY,
            cc_mode: false,
        }
    }

    /// Commits the zero-current calibration offset. Called once at startup
    /// after the loop has run with regulation disabled long enough for the
    /// current sense to settle; `sample` is the then-stable reading.
    pub fn calibrate(&mut self, sample: AdcTriple) {
        self.shared.set_current_offset(sample.current as i32);
        info!("current sense offset: {}", sample.current);
    }

    /// One control step. Invoked exactly once per sample delivery, in
    /// delivery order. Returns the committed duty command.
    pub fn tick(&mut self, sample: AdcTriple) -> u8 {
        let target_v = self.shared.target_voltage_raw() as i32;
        let target_i = self.shared.target_current_raw() as i32;

        // Either axis disabled disables the converter outright: duty floors
        // and the PID memory resets so no windup survives into re-enable.
        if target_v == 0 || target_i == 0 {
            self.last_error = 0;
            self.integral = 0;
            self.set_duty(MIN_DUTY, sample);
            return self.duty;
        }

        let error_v = target_v - sample.voltage as i32;
        let error_i = target_i - sample.current as i32;

        let was_cc = self.cc_mode;
        self.cc_mode = error_v >= error_i;
        if self.cc_mode != was_cc {
            debug!(
                "mode -> {} (eV {}, eI {})",
                if self.cc_mode { "CC" } else { "CV" },
                error_v,
                error_i
            );
        }

        // The smaller error is the binding constraint.
        let error = error_v.min(error_i);

        let derivative = (error - self.last_error) >> D_GAIN_SHIFT;
        self.integral = (self.integral + error).clamp(-INTEGRAL_LIMIT, INTEGRAL_LIMIT);

        let duty = error + derivative + (self.integral >> I_GAIN_SHIFT);
        let duty = duty.clamp(MIN_DUTY as i32, MAX_DUTY as i32) as u8;

        self.last_error = error;
        self.set_duty(duty, sample);
        self.duty
    }

    #[inline]
    fn set_duty(&mut self, duty: u8, sample: AdcTriple) {
        self.duty = duty;
        self.shared.publish(sample, duty, self.cc_mode);
    }

    #[inline]
    pub fn duty(&self) -> u8 {
        self.duty
    }

    #[inline]
    pub fn cc_mode(&self) -> bool {
        self.cc_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regulator::shared::RegulatorHandle;

    const VREF_RAW: u16 = 372;

    fn sample(voltage: u16, current: u16) -> AdcTriple {
        AdcTriple {
            vref: VREF_RAW,
            voltage,
            current,
        }
    }

    /// Controller with both raw targets forced directly, bypassing the
    /// millivolt conversions, so the control law is tested in isolation.
    fn enabled_controller(target_v: u32, target_i: u32) -> FeedbackController {
        let shared = RegulatorShared::new();
        let handle = RegulatorHandle::new(shared.clone());
        let mut controller = FeedbackController::new(shared);
        // Seed a reference sample, then set targets through the handle.
        controller.tick(sample(0, 0));
        controller.calibrate(sample(0, 0));
        handle.set_voltage_target(raw_to_mv(target_v));
        handle.set_current_limit(target_i);
        controller
    }

    // Inverse of the target conversion at VREF_RAW = 372, good to one LSB.
    fn raw_to_mv(raw: u32) -> u32 {
        (raw as u64 * 3303 * 490 / (100 * 1024)) as u32 + 8
    }

    #[test]
    fn disabled_axis_floors_duty_and_resets_pid() {
        let shared = RegulatorShared::new();
        let handle = RegulatorHandle::new(shared.clone());
        let mut controller = FeedbackController::new(shared.clone());

        controller.tick(sample(0, 0));
        controller.calibrate(sample(0, 0));
        handle.set_voltage_target(5000);
        handle.set_current_limit(300);

        // Build up integral and error history.
        for _ in 0..50 {
            controller.tick(sample(100, 50));
        }
        assert!(controller.duty() > MIN_DUTY);

        // Voltage axis off: output dies immediately.
        handle.set_voltage_target(0);
        assert_eq!(controller.tick(sample(100, 50)), MIN_DUTY);

        // Re-enable: the first tick must act on fresh PID memory. With error
        // e the first output is e + (e >> 3) + (e >> 6); stale integral from
        // before the disable would push it higher.
        handle.set_voltage_target(raw_to_mv(300));
        let first = controller.tick(sample(280, 0)) as i32;
        let target_v = shared.target_voltage_raw() as i32;
        let e = target_v - 280;
        assert_eq!(first, e + (e >> 3) + (e >> 6));
    }

    #[test]
    fn zero_current_limit_also_disables() {
        let mut controller = enabled_controller(300, 200);
        assert!(controller.tick(sample(0, 0)) > MIN_DUTY);

        let shared = controller.shared.clone();
        RegulatorHandle::new(shared).set_current_limit(0);
        assert_eq!(controller.tick(sample(0, 0)), MIN_DUTY);
    }

    #[test]
    fn duty_stays_clamped_under_adversarial_feedback() {
        let mut controller = enabled_controller(600, 400);

        // Saturated-low feedback drives the command far past MAX_DUTY.
        for _ in 0..200 {
            let duty = controller.tick(sample(0, 0));
            assert!(duty <= MAX_DUTY);
        }
        assert_eq!(controller.duty(), MAX_DUTY);

        // Feedback pinned at ADC full scale slams the error negative.
        for _ in 0..200 {
            let duty = controller.tick(sample(1023, 1023));
            assert!(duty <= MAX_DUTY);
        }
        assert_eq!(controller.duty(), MIN_DUTY);
    }

    #[test]
    fn cc_flag_tracks_the_binding_error() {
        let mut controller = enabled_controller(500, 300);
        let target_v = controller.shared.target_voltage_raw() as i32;
        let target_i = controller.shared.target_current_raw() as i32;

        // Current error smaller than voltage error: current binds (CC).
        let v = (target_v - 100) as u16;
        let i = (target_i - 20) as u16;
        controller.tick(sample(v, i));
        assert!(controller.cc_mode());

        // Voltage error smaller: voltage binds (CV).
        let v = (target_v - 20) as u16;
        let i = (target_i - 100) as u16;
        controller.tick(sample(v, i));
        assert!(!controller.cc_mode());

        // Equal errors count as CC, matching the arbitration rule eV >= eI.
        let v = (target_v - 50) as u16;
        let i = (target_i - 50) as u16;
        controller.tick(sample(v, i));
        assert!(controller.cc_mode());
    }

    #[test]
    fn duty_rises_monotonically_in_small_error_regime() {
        let mut controller = enabled_controller(400, 350);

        // Constant small positive error: P holds, I accumulates, D is zero
        // after the first step, so the command must never decrease. The very
        // first tick carries a one-off derivative kick and is skipped.
        let feedback = sample(390, 100);
        controller.tick(feedback);
        let mut last = controller.tick(feedback);
        for _ in 0..40 {
            let duty = controller.tick(feedback);
            assert!(duty >= last, "duty regressed: {duty} < {last}");
            last = duty;
        }
        assert!(last > MIN_DUTY);
    }

    #[test]
    fn integral_saturates_instead_of_winding_up() {
        let mut controller = enabled_controller(1000, 900);

        // Hold a huge positive error far longer than the accumulator bound.
        for _ in 0..100_000 {
            controller.tick(sample(0, 0));
        }
        assert_eq!(controller.duty(), MAX_DUTY);

        // Once feedback overshoots, recovery must not take the thousands of
        // ticks an unbounded accumulator would need to unwind.
        let mut ticks = 0;
        while controller.tick(sample(1023, 1023)) > MIN_DUTY {
            ticks += 1;
            assert!(ticks < 1000, "integral wound up beyond its bound");
        }
    }

    #[test]
    fn snapshot_follows_every_tick() {
        let controller = enabled_controller(400, 300);
        let handle = RegulatorHandle::new(controller.shared.clone());
        let mut controller = controller;

        controller.tick(sample(316, 114));
        let state = handle.state();
        assert_eq!(state.duty, controller.duty());
        assert_eq!(state.cc_mode, controller.cc_mode());
        assert!(state.voltage_mv > 0);
    }
}
