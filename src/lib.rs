//! Control core for a digitally-regulated boost supply.
//!
//! Two independent leaves carry the interesting logic: the feedback
//! controller (`regulator`) that turns sampled voltage/current feedback into
//! PWM duty commands with CC/CV limiting, and the byte ring buffer (`relay`)
//! that decouples the sampling context from polled consumers. Around them:
//! a simulated power stage and sampling loop (`acquisition`), the operator
//! command layer (`console`), and run telemetry (`utils`).

pub mod acquisition;
pub mod console;
pub mod regulator;
pub mod relay;
pub mod utils;
