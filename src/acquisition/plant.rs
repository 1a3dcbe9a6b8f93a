//! Simulated converter power stage and ADC front-end.
//!
//! Stands in for the hardware between the PWM output and the sampled triple:
//! a boost stage with a first-order response toward its duty-dependent
//! asymptote, a resistive load, and a 10-bit ADC with a ratiometric
//! reference channel, one LSB of noise, and the current-sense zero offset
//! the calibration pass is supposed to discover.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::random_range;

use crate::regulator::AdcTriple;
use crate::regulator::convert::{ADC_MAX, INTERNAL_VREF_MV, RIN, RT};

/// Load value meaning "nothing connected": microamp-range current that
/// quantizes to zero ADC codes.
pub const OPEN_CIRCUIT_MOHM: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct PlantConfig {
    /// Input rail feeding the inductor, millivolts.
    pub supply_mv: f64,
    /// ADC supply rail (full-scale), millivolts.
    pub rail_mv: f64,
    /// First-order response time constant, in control ticks.
    pub tau_ticks: f64,
    /// PWM timer period the duty command is referenced to.
    pub pwm_period: f64,
    /// Physical output ceiling, millivolts.
    pub max_output_mv: f64,
    /// True zero-current code of the sense path, in ADC LSB.
    pub sense_offset: u16,
    /// Peak ADC noise, LSB. Zero gives a deterministic plant.
    pub noise_lsb: i32,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            supply_mv: 3300.0,
            rail_mv: 3300.0,
            tau_ticks: 50.0,
            pwm_period: 265.0,
            max_output_mv: 30_000.0,
            sense_offset: 14,
            noise_lsb: 1,
        }
    }
}

/// Converter stand-in. `step` advances the electrical state by one control
/// period for a given duty command and returns what the ADC would sample.
pub struct Plant {
    cfg: PlantConfig,
    load_mohm: Arc<AtomicU32>,
    v_out_mv: f64,
}

impl Plant {
    pub fn new(cfg: PlantConfig) -> Self {
        let v_out_mv = cfg.supply_mv;
        Self {
            cfg,
            load_mohm: Arc::new(AtomicU32::new(OPEN_CIRCUIT_MOHM)),
            v_out_mv,
        }
    }

    /// Handle for changing the load while the loop runs (load steps).
    pub fn load_control(&self) -> Arc<AtomicU32> {
        self.load_mohm.clone()
    }

    pub fn output_millivolts(&self) -> f64 {
        self.v_out_mv
    }

    /// One control period: settle toward the boost asymptote for this duty,
    /// then quantize the reference/voltage/current channels.
    pub fn step(&mut self, duty: u8) -> AdcTriple {
        let d = (duty as f64 / self.cfg.pwm_period).min(0.98);
        // An idle boost stage passes the input straight through the diode.
        let asymptote = if duty == 0 {
            self.cfg.supply_mv
        } else {
            (self.cfg.supply_mv / (1.0 - d)).min(self.cfg.max_output_mv)
        };
        self.v_out_mv += (asymptote - self.v_out_mv) / self.cfg.tau_ticks;

        let load_ohms = self.load_mohm.load(Ordering::Relaxed) as f64 / 1000.0;
        let current_ma = self.v_out_mv / load_ohms;

        AdcTriple {
            vref: self.quantize(INTERNAL_VREF_MV as f64 * ADC_MAX as f64 / self.cfg.rail_mv),
            voltage: self.quantize(
                self.v_out_mv * RIN as f64 * ADC_MAX as f64 / (RT as f64 * self.cfg.rail_mv),
            ),
            current: self.quantize(current_ma + self.cfg.sense_offset as f64),
        }
    }

    fn quantize(&self, value: f64) -> u16 {
        let noise = if self.cfg.noise_lsb > 0 {
            random_range(-self.cfg.noise_lsb..=self.cfg.noise_lsb)
        } else {
            0
        };
        (value as i32 + noise).clamp(0, ADC_MAX as i32 - 1) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regulator::convert;

    fn quiet_plant() -> Plant {
        Plant::new(PlantConfig {
            noise_lsb: 0,
            ..PlantConfig::default()
        })
    }

    #[test]
    fn idle_stage_passes_the_input_through() {
        let mut plant = quiet_plant();
        let mut sample = AdcTriple::default();
        for _ in 0..500 {
            sample = plant.step(0);
        }
        let mv = convert::voltage_millivolts(sample.voltage, sample.vref);
        assert!((3200..=3400).contains(&mv), "{mv} mV");
    }

    #[test]
    fn open_circuit_reads_only_the_sense_offset() {
        let mut plant = quiet_plant();
        let sample = plant.step(0);
        assert_eq!(sample.current, 14);
    }

    #[test]
    fn duty_raises_the_output() {
        let mut plant = quiet_plant();
        let mut low = AdcTriple::default();
        let mut high = AdcTriple::default();
        for _ in 0..500 {
            low = plant.step(50);
        }
        for _ in 0..500 {
            high = plant.step(120);
        }
        assert!(high.voltage > low.voltage);
    }

    #[test]
    fn load_draws_proportional_current() {
        let mut plant = quiet_plant();
        plant.load_control().store(50_000, Ordering::Relaxed); // 50 Ohm
        let mut sample = AdcTriple::default();
        for _ in 0..500 {
            sample = plant.step(0);
        }
        // 3.3 V across 50 Ohm is 66 mA, plus the 14 LSB offset
        let current = convert::current_milliamps(sample.current, 14);
        assert!((60..=72).contains(&current), "{current} mA");
    }

    #[test]
    fn adc_channels_clip_at_full_scale() {
        let mut plant = Plant::new(PlantConfig {
            noise_lsb: 0,
            max_output_mv: 1_000_000.0,
            ..PlantConfig::default()
        });
        let mut sample = AdcTriple::default();
        for _ in 0..2_000 {
            sample = plant.step(250);
        }
        assert!(sample.voltage < ADC_MAX as u16);
        assert_eq!(sample.voltage, ADC_MAX as u16 - 1);
    }
}
