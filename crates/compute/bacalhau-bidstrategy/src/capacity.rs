use crate::strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
use async_trait::async_trait;
use bacalhau_types::ResourceUsage;
use log::debug;
use std::sync::{Arc, RwLock};

/// Process-local view of reserved and available resources.
///
/// The view is advisory: a bid decision and the reservation that follows it
/// are not atomic, so capacity can be transiently over-committed.
pub trait CapacityTracker: Send + Sync {
    fn available_capacity(&self) -> ResourceUsage;

    /// Book `usage` if it fits; returns false when it does not
    fn reserve(&self, usage: &ResourceUsage) -> bool;

    fn release(&self, usage: &ResourceUsage);
}

/// Tracker for a node with a fixed total capacity
pub struct LocalCapacityTracker {
    total: ResourceUsage,
    reserved: RwLock<ResourceUsage>,
}

impl LocalCapacityTracker {
    pub fn new(total: ResourceUsage) -> Self {
        Self {
            total,
            reserved: RwLock::new(ResourceUsage::default()),
        }
    }

    pub fn total_capacity(&self) -> ResourceUsage {
        self.total
    }

    pub fn reserved_capacity(&self) -> ResourceUsage {
        match self.reserved.read() {
            Ok(reserved) => *reserved,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl CapacityTracker for LocalCapacityTracker {
    fn available_capacity(&self) -> ResourceUsage {
        self.total.sub(&self.reserved_capacity())
    }

    fn reserve(&self, usage: &ResourceUsage) -> bool {
        let mut reserved = match self.reserved.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let wanted = reserved.add(usage);
        if !wanted.less_than_eq(&self.total) {
            return false;
        }
        *reserved = wanted;
        true
    }

    fn release(&self, usage: &ResourceUsage) {
        let mut reserved = match self.reserved.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *reserved = reserved.sub(usage);
    }
}

/// Rejects jobs whose usage exceeds what the running and enqueued trackers
/// still have available
pub struct AvailableCapacityStrategy {
    running: Arc<dyn CapacityTracker>,
    enqueued: Arc<dyn CapacityTracker>,
}

impl AvailableCapacityStrategy {
    pub fn new(running: Arc<dyn CapacityTracker>, enqueued: Arc<dyn CapacityTracker>) -> Self {
        Self { running, enqueued }
    }
}

#[async_trait]
impl BidStrategy for AvailableCapacityStrategy {
    fn name(&self) -> &str {
        "available_capacity"
    }

    async fn decide(
        &self,
        _request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        Ok(BidStrategyResponse::accept())
    }

    async fn decide_on_usage(
        &self,
        request: &BidStrategyRequest,
        usage: &ResourceUsage,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        let available = self
            .running
            .available_capacity()
            .add(&self.enqueued.available_capacity());
        if !usage.less_than_eq(&available) {
            debug!(
                "Job {} needs {} but only {} is available",
                request.job.id, usage, available
            );
            return Ok(BidStrategyResponse::reject("not enough capacity available"));
        }
        Ok(BidStrategyResponse::accept())
    }
}

/// Rejects jobs asking for more than the per-job ceiling
pub struct MaxCapacityStrategy {
    max_job_requirements: ResourceUsage,
}

impl MaxCapacityStrategy {
    pub fn new(max_job_requirements: ResourceUsage) -> Self {
        Self {
            max_job_requirements,
        }
    }
}

#[async_trait]
impl BidStrategy for MaxCapacityStrategy {
    fn name(&self) -> &str {
        "max_capacity"
    }

    async fn decide(
        &self,
        _request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        Ok(BidStrategyResponse::accept())
    }

    async fn decide_on_usage(
        &self,
        _request: &BidStrategyRequest,
        usage: &ResourceUsage,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        if !usage.less_than_eq(&self.max_job_requirements) {
            return Ok(BidStrategyResponse::reject(
                "job requirements exceed max allowed per job",
            ));
        }
        Ok(BidStrategyResponse::accept())
    }
}
