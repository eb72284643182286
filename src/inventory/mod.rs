//! Cluster inventory: typed objects, the client seam and its implementations.

pub mod client;
pub mod kubectl;
pub mod memory;
pub mod model;
pub mod snapshot;
