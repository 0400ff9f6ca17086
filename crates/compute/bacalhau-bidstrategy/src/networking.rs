use crate::strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
use async_trait::async_trait;
use bacalhau_types::Network;

/// Decides on jobs that ask for network access
pub struct NetworkingStrategy {
    accept_networked_jobs: bool,
    allowed_domains: Vec<String>,
}

impl NetworkingStrategy {
    pub fn new(accept_networked_jobs: bool, allowed_domains: Vec<String>) -> Self {
        Self {
            accept_networked_jobs,
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
        }
    }

    /// An entry starting with `.` matches the domain itself and every
    /// subdomain, any other entry matches exactly
    fn domain_allowed(&self, domain: &str) -> bool {
        let domain = domain.to_ascii_lowercase();
        self.allowed_domains.iter().any(|allowed| match allowed.strip_prefix('.') {
            Some(base) => domain == base || domain.ends_with(allowed.as_str()),
            None => domain == *allowed,
        })
    }
}

#[async_trait]
impl BidStrategy for NetworkingStrategy {
    fn name(&self) -> &str {
        "networking"
    }

    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        let network = &request.job.spec.network;
        match network.kind {
            Network::None => Ok(BidStrategyResponse::accept()),
            _ if self.accept_networked_jobs => Ok(BidStrategyResponse::accept()),
            Network::Full => Ok(BidStrategyResponse::reject(
                "this node does not accept networked jobs",
            )),
            Network::Http => {
                if let Some(denied) = network.domains.iter().find(|d| !self.domain_allowed(d)) {
                    return Ok(BidStrategyResponse::reject(format!(
                        "domain {} is not in the allowed list",
                        denied
                    )));
                }
                Ok(BidStrategyResponse::accept())
            }
        }
    }
}
