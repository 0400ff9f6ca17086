use crate::strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
use async_trait::async_trait;
use bacalhau_types::ResourceUsage;
use log::debug;

#[cfg(feature = "metrics")]
use crate::metrics::BidStrategyMetrics;

/// AND-combination of strategies, evaluated in order. The first rejection
/// or error ends the evaluation.
#[derive(Default)]
pub struct ChainedBidStrategy {
    strategies: Vec<Box<dyn BidStrategy>>,

    /// Decision counters
    #[cfg(feature = "metrics")]
    metrics: Option<BidStrategyMetrics>,
}

impl ChainedBidStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy, builder style
    pub fn with(mut self, strategy: impl BidStrategy + 'static) -> Self {
        self.add(Box::new(strategy));
        self
    }

    pub fn add(&mut self, strategy: Box<dyn BidStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Names of the chained strategies, in evaluation order
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    #[cfg(feature = "metrics")]
    pub fn set_metrics(&mut self, metrics: BidStrategyMetrics) {
        self.metrics = Some(metrics);
    }

    #[allow(unused_variables)]
    fn record(&self, stage: &str, outcome: &Result<BidStrategyResponse, BidStrategyError>) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record(stage, outcome);
        }
    }

    async fn evaluate(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        for strategy in &self.strategies {
            let response = strategy.decide(request).await?;
            if !response.should_bid {
                debug!(
                    "Strategy {} rejected job {}: {}",
                    strategy.name(),
                    request.job.id,
                    response.reason
                );
                return Ok(response);
            }
        }
        Ok(BidStrategyResponse::accept())
    }

    async fn evaluate_on_usage(
        &self,
        request: &BidStrategyRequest,
        usage: &ResourceUsage,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        for strategy in &self.strategies {
            let response = strategy.decide_on_usage(request, usage).await?;
            if !response.should_bid {
                debug!(
                    "Strategy {} rejected job {} on usage ({}): {}",
                    strategy.name(),
                    request.job.id,
                    usage,
                    response.reason
                );
                return Ok(response);
            }
        }
        Ok(BidStrategyResponse::accept())
    }
}

#[async_trait]
impl BidStrategy for ChainedBidStrategy {
    fn name(&self) -> &str {
        "chain"
    }

    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        let outcome = self.evaluate(request).await;
        self.record("decide", &outcome);
        outcome
    }

    async fn decide_on_usage(
        &self,
        request: &BidStrategyRequest,
        usage: &ResourceUsage,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        let outcome = self.evaluate_on_usage(request, usage).await;
        self.record("decide_on_usage", &outcome);
        outcome
    }
}
