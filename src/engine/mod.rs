pub mod chain;
pub mod max_pain;
pub mod trend;

// Re-exports (public API)
pub use chain::OptionsChainSnapshot;
pub use max_pain::{compute, MaxPainResult, PainDistribution, PainPoint};
pub use trend::Trend;
