//! # EVP Demand Calculation
//!
//! 充電需求估算引擎

pub mod demand;
pub mod fleet;

// Re-export 主要類型
pub use demand::{DemandEstimator, DemandRow, DemandTable};
pub use fleet::{FleetRegistry, FleetSource};
