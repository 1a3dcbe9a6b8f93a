// Regulation core: the per-tick feedback controller, the atomically shared
// command/telemetry state, and the raw-unit conversions tying them together.

pub mod controller;
pub mod convert;
pub mod shared;

pub use controller::{AdcTriple, FeedbackController, MAX_DUTY, MIN_DUTY};
pub use shared::{RegulatorHandle, RegulatorShared, SupplyState};
