//! Console command layer.
//!
//! Speaks the single-key protocol of the debug console: `0` kills both
//! targets, `+`/`-` step the active axis, `c`/`v` choose which axis the
//! adjustment keys drive, and a digit is a preset (n kV-thousandths or
//! n hundred mA depending on the active axis).
//!
//! Range limiting lives here, not in the controller: every command is
//! clamped against the system maxima before it reaches the regulator. Each
//! axis clamps to its own limit.

use log::warn;

use crate::regulator::RegulatorHandle;
use crate::relay::ring::{MutexLock, SharedRing};

/// System-wide safety maxima for operator commands.
pub const MAX_VOLTAGE_MV: u32 = 15_000;
pub const MAX_CURRENT_MA: u32 = 1_000;

pub const VOLTAGE_STEP_MV: u32 = 50;
pub const CURRENT_STEP_MA: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Disable both axes.
    AllOff,
    /// Step the active axis up.
    StepUp,
    /// Step the active axis down.
    StepDown,
    /// Route adjustment keys to the current limit.
    AdjustCurrent,
    /// Route adjustment keys to the voltage target; drops the current limit.
    AdjustVoltage,
    /// Digit preset for the active axis.
    Preset(u8),
}

/// Maps one console byte to a command. Unknown bytes are ignored.
pub fn parse_key(byte: u8) -> Option<Command> {
    match byte {
        b'0' => Some(Command::AllOff),
        b'+' | b'=' => Some(Command::StepUp),
        b'-' => Some(Command::StepDown),
        b'c' => Some(Command::AdjustCurrent),
        b'v' => Some(Command::AdjustVoltage),
        b'1'..=b'9' => Some(Command::Preset(byte - b'0')),
        _ => None,
    }
}

/// Command state machine applying operator input to a regulator handle.
pub struct CommandConsole {
    handle: RegulatorHandle,
    adjust_current: bool,
    voltage_target_mv: u32,
    current_limit_ma: u32,
}

impl CommandConsole {
    pub fn new(handle: RegulatorHandle) -> Self {
        Self {
            handle,
            adjust_current: false,
            voltage_target_mv: 0,
            current_limit_ma: 0,
        }
    }

    pub fn voltage_target_mv(&self) -> u32 {
        self.voltage_target_mv
    }

    pub fn current_limit_ma(&self) -> u32 {
        self.current_limit_ma
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::AllOff => {
                self.voltage_target_mv = 0;
                self.current_limit_ma = 0;
                self.handle.set_voltage_target(0);
                self.handle.set_current_limit(0);
            }
            Command::StepUp => {
                if self.adjust_current {
                    self.set_current(self.current_limit_ma + CURRENT_STEP_MA);
                } else {
                    self.set_voltage(self.voltage_target_mv + VOLTAGE_STEP_MV);
                }
            }
            Command::StepDown => {
                if self.adjust_current {
                    self.set_current(self.current_limit_ma.saturating_sub(CURRENT_STEP_MA));
                } else {
                    self.set_voltage(self.voltage_target_mv.saturating_sub(VOLTAGE_STEP_MV));
                }
            }
            Command::AdjustCurrent => {
                self.adjust_current = true;
            }
            Command::AdjustVoltage => {
                self.adjust_current = false;
                self.set_current(0);
            }
            Command::Preset(n) => {
                if self.adjust_current {
                    self.set_current(n as u32 * 100);
                } else {
                    self.set_voltage(n as u32 * 1_000);
                }
            }
        }
    }

    /// Drains buffered console bytes from the command ring and applies every
    /// recognized key. Returns the number of commands applied.
    pub fn pump(&mut self, ring: &SharedRing<MutexLock>) -> usize {
        let mut byte = [0u8; 1];
        let mut applied = 0;
        while let Ok(1) = ring.get(&mut byte) {
            if let Some(command) = parse_key(byte[0]) {
                self.apply(command);
                applied += 1;
            }
        }
        applied
    }

    fn set_voltage(&mut self, millivolts: u32) {
        let clamped = millivolts.min(MAX_VOLTAGE_MV);
        if clamped != millivolts {
            warn!("voltage request {} mV clamped to {} mV", millivolts, clamped);
        }
        self.voltage_target_mv = clamped;
        self.handle.set_voltage_target(clamped);
    }

    fn set_current(&mut self, milliamps: u32) {
        let clamped = milliamps.min(MAX_CURRENT_MA);
        if clamped != milliamps {
            warn!("current request {} mA clamped to {} mA", milliamps, clamped);
        }
        self.current_limit_ma = clamped;
        self.handle.set_current_limit(clamped);
    }
}
