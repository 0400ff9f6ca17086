use super::JobSelectionProbeData;
use crate::strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use std::time::Duration;

const DEFAULT_DECLINE_REASON: &str = "probe endpoint declined the job";

/// POSTs the probe payload to an HTTP endpoint. A 200 means bid, unless
/// the body is a JSON `{should_bid, reason}` answer, which is then used.
pub struct HttpProbeStrategy {
    url: String,
    client: Client,
    timeout: Duration,
}

impl HttpProbeStrategy {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, BidStrategyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            timeout,
        })
    }
}

#[async_trait]
impl BidStrategy for HttpProbeStrategy {
    fn name(&self) -> &str {
        "http_probe"
    }

    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        let payload = JobSelectionProbeData::from(request);

        let result = async {
            let response = self.client.post(&self.url).json(&payload).send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;

        let (status, body) = match result {
            Ok(reply) => reply,
            Err(e) if e.is_timeout() => {
                warn!(
                    "Probe endpoint {} timed out for job {}",
                    self.url, request.job.id
                );
                return Err(BidStrategyError::ProbeTimeout {
                    probe: "http",
                    timeout: self.timeout,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if status != StatusCode::OK {
            debug!(
                "Probe endpoint {} rejected job {} with status {}",
                self.url, request.job.id, status
            );
            return Ok(BidStrategyResponse::reject(format!(
                "probe endpoint returned status {}",
                status.as_u16()
            )));
        }

        match serde_json::from_str::<BidStrategyResponse>(&body) {
            Ok(answer) if !answer.should_bid && answer.reason.trim().is_empty() => {
                Ok(BidStrategyResponse::reject(DEFAULT_DECLINE_REASON))
            }
            Ok(answer) => Ok(answer),
            Err(_) => Ok(BidStrategyResponse::accept()),
        }
    }
}
