//! Admission strategies for compute nodes.
//!
//! A compute node runs a [`ChainedBidStrategy`] before bidding on a job.
//! Each strategy answers "should this node bid?" and the chain stops at the
//! first rejection. Probe failures are hard errors: no bid is made.

pub mod capacity;
pub mod chain;
pub mod locality;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod networking;
pub mod probe;
pub mod providers;
pub mod strategy;
pub mod timeout;

pub use capacity::{
    AvailableCapacityStrategy, CapacityTracker, LocalCapacityTracker, MaxCapacityStrategy,
};
pub use chain::ChainedBidStrategy;
pub use locality::{InputLocalityStrategy, StatelessJobStrategy};
#[cfg(feature = "metrics")]
pub use metrics::BidStrategyMetrics;
pub use networking::NetworkingStrategy;
pub use probe::{ExecProbeStrategy, HttpProbeStrategy, JobSelectionProbeData, PROBE_DATA_ENV};
pub use providers::{
    EngineRegistry, MappedProviders, Provider, ProviderRegistry, ProvidersInstalledStrategy,
    StaticProvider, StorageProvider, StorageRegistry,
};
pub use strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
pub use timeout::TimeoutStrategy;
