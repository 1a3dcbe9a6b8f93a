// Acquisition side: the simulated power stage + ADC front-end, and the
// periodic sampling loop that drives the controller from it.

pub mod plant;
pub mod sampler;

pub use plant::{OPEN_CIRCUIT_MOHM, Plant, PlantConfig};
pub use sampler::{Sampler, SamplerConfig, SupplyEvent};
