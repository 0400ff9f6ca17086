use crate::providers::StorageRegistry;
use crate::strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
use async_trait::async_trait;
use bacalhau_types::JobSelectionLocality;
use log::debug;
use std::sync::Arc;

/// Under a local-only policy, bid only when every input is already here
pub struct InputLocalityStrategy {
    locality: JobSelectionLocality,
    storages: Arc<StorageRegistry>,
}

impl InputLocalityStrategy {
    pub fn new(locality: JobSelectionLocality, storages: Arc<StorageRegistry>) -> Self {
        Self { locality, storages }
    }
}

#[async_trait]
impl BidStrategy for InputLocalityStrategy {
    fn name(&self) -> &str {
        "input_locality"
    }

    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        if self.locality == JobSelectionLocality::Anywhere {
            return Ok(BidStrategyResponse::accept());
        }

        for input in &request.job.spec.inputs {
            let local = self.storages.has(&input.storage_source)
                && self
                    .storages
                    .get(&input.storage_source)?
                    .has_storage_locally(input)
                    .await?;
            if !local {
                debug!(
                    "Input {} of job {} is not local",
                    input.source, request.job.id
                );
                return Ok(BidStrategyResponse::reject("not all inputs are local"));
            }
        }
        Ok(BidStrategyResponse::accept())
    }
}

/// Optionally rejects jobs that declare no inputs
pub struct StatelessJobStrategy {
    reject_stateless_jobs: bool,
}

impl StatelessJobStrategy {
    pub fn new(reject_stateless_jobs: bool) -> Self {
        Self {
            reject_stateless_jobs,
        }
    }
}

#[async_trait]
impl BidStrategy for StatelessJobStrategy {
    fn name(&self) -> &str {
        "stateless_job"
    }

    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        if self.reject_stateless_jobs && request.job.is_stateless() {
            return Ok(BidStrategyResponse::reject(
                "this node does not accept stateless jobs",
            ));
        }
        Ok(BidStrategyResponse::accept())
    }
}
