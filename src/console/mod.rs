// Operator command surface: the single-key console protocol and its safety
// clamps. Target validation lives here so the regulator can trust its inputs.

pub mod commands;

pub use commands::{
    Command, CommandConsole, CURRENT_STEP_MA, MAX_CURRENT_MA, MAX_VOLTAGE_MV, VOLTAGE_STEP_MV,
    parse_key,
};
