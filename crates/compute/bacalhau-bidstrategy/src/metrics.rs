use crate::strategy::{BidStrategyError, BidStrategyResponse};
use prometheus::{IntCounterVec, Registry};

/// Counters of chain decisions
#[derive(Clone)]
pub struct BidStrategyMetrics {
    /// Decisions by stage (`decide`, `decide_on_usage`) and result
    /// (`bid`, `no_bid`, `error`)
    pub decisions: IntCounterVec,
}

impl BidStrategyMetrics {
    /// Create the counters and register them on `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let decisions = IntCounterVec::new(
            prometheus::opts!("bacalhau_bid_decisions", "Bid strategy chain decisions"),
            &["stage", "result"],
        )?;
        registry.register(Box::new(decisions.clone()))?;
        Ok(Self { decisions })
    }

    pub(crate) fn record(
        &self,
        stage: &str,
        outcome: &Result<BidStrategyResponse, BidStrategyError>,
    ) {
        let result = match outcome {
            Ok(response) if response.should_bid => "bid",
            Ok(_) => "no_bid",
            Err(_) => "error",
        };
        self.decisions.with_label_values(&[stage, result]).inc();
    }
}
