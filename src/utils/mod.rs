// Shared run instrumentation: per-tick telemetry, capped metric histories,
// and the end-of-run CSV summary.

pub mod export;
pub mod telemetry;
