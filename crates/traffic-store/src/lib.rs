//! Rate and quota enforcement over recorded traffic.
//!
//! The aggregation store is external; [`TrafficStore`] is the only seam to it.
//! Checks fail closed, event writes are best effort.

pub mod api;
pub mod errors;
pub mod gate;
pub mod metrics;
pub mod reporter;

pub use api::{InMemoryTrafficStore, TrafficStore, TrafficStoreResult};
pub use errors::TrafficError;
pub use gate::TrafficGate;
pub use reporter::TrafficReporter;
