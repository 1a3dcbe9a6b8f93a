//! Ratiometric conversions between raw ADC codes and physical units.
//!
//! The reference channel samples a known internal bandgap once per control
//! period; scaling every conversion by that sample cancels supply-rail drift
//! without ever knowing the rail voltage. All arithmetic is integer, widened
//! to i64 where the intermediate products exceed 32 bits.

/// Feedback divider resistances in 10 Ohm units.
pub const RF: i64 = 390;
pub const RIN: i64 = 100;
pub const RT: i64 = RF + RIN;

/// Internal bandgap reference in millivolts.
pub const INTERNAL_VREF_MV: i64 = 1200;

pub const ADC_RESOLUTION: u32 = 10;
pub const ADC_MAX: i64 = 1 << ADC_RESOLUTION;

/// Full-scale ADC input in millivolts, reconstructed from the reference
/// sample. Zero while no reference sample has been taken yet.
pub fn full_scale_millivolts(vref_raw: u16) -> i64 {
    if vref_raw == 0 {
        return 0;
    }
    (INTERNAL_VREF_MV * ADC_MAX) / vref_raw as i64
}

/// Output voltage in millivolts from the raw feedback sample, undoing the
/// feedback divider.
pub fn voltage_millivolts(v_raw: u16, vref_raw: u16) -> u32 {
    let full_scale = full_scale_millivolts(vref_raw);
    ((v_raw as i64 * full_scale * RT) / (RIN * ADC_MAX)) as u32
}

/// Raw ADC code a given output voltage would read back as. Zero when no
/// reference sample exists yet, which keeps the converter disabled.
pub fn millivolts_to_raw(millivolts: u32, vref_raw: u16) -> u16 {
    let full_scale = full_scale_millivolts(vref_raw);
    if full_scale == 0 {
        return 0;
    }
    ((millivolts as i64 * ADC_MAX * RIN) / (RT * full_scale)) as u16
}

/// Output current in milliamps after removing the zero-current offset.
/// The sense path is scaled so one ADC code is one milliamp; a sample below
/// the offset reads as zero.
pub fn current_milliamps(i_raw: u16, offset: i32) -> u32 {
    let corrected = i_raw as i32 - offset;
    corrected.max(0) as u32
}

/// Raw ADC code corresponding to a current limit in milliamps.
pub fn milliamps_to_raw(milliamps: u32, offset: i32) -> u16 {
    (milliamps as i32 + offset).max(0) as u16
}
