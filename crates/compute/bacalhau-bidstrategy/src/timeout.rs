use crate::strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

/// Rejects jobs whose declared execution timeout is outside `[min, max]`.
/// A zero bound is disabled.
pub struct TimeoutStrategy {
    min: Duration,
    max: Duration,
    /// Clients allowed to exceed `max`
    bypass_client_ids: HashSet<String>,
}

impl TimeoutStrategy {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            bypass_client_ids: HashSet::new(),
        }
    }

    pub fn with_bypass(mut self, client_ids: impl IntoIterator<Item = String>) -> Self {
        self.bypass_client_ids.extend(client_ids);
        self
    }
}

#[async_trait]
impl BidStrategy for TimeoutStrategy {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        let job = &request.job;
        let bypass = self.bypass_client_ids.contains(&job.metadata.client_id);

        match job.timeout() {
            None => {
                if !self.max.is_zero() && !bypass {
                    return Ok(BidStrategyResponse::reject(format!(
                        "job timeout is unbounded but the maximum is {}s",
                        self.max.as_secs()
                    )));
                }
            }
            Some(timeout) => {
                if timeout < self.min {
                    return Ok(BidStrategyResponse::reject(format!(
                        "job timeout {}s is below the minimum {}s",
                        timeout.as_secs(),
                        self.min.as_secs()
                    )));
                }
                if !self.max.is_zero() && timeout > self.max && !bypass {
                    return Ok(BidStrategyResponse::reject(format!(
                        "job timeout {}s exceeds the maximum {}s",
                        timeout.as_secs(),
                        self.max.as_secs()
                    )));
                }
            }
        }
        Ok(BidStrategyResponse::accept())
    }
}
