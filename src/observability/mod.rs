//! Observability: metrics recording through the `metrics` facade.
//!
//! Exporter and subscriber setup belong to the embedding process; this
//! crate only records.

pub mod metrics;
