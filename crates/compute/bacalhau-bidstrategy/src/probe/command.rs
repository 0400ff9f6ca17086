use super::{JobSelectionProbeData, PROBE_DATA_ENV};
use crate::strategy::{BidStrategy, BidStrategyError, BidStrategyRequest, BidStrategyResponse};
use async_trait::async_trait;
use log::{debug, warn};
use std::io::{Error as IoError, ErrorKind};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Shell exit code when the command exists but cannot be executed
const EXIT_NOT_EXECUTABLE: i32 = 126;
/// Shell exit code when the command cannot be found
const EXIT_NOT_FOUND: i32 = 127;

/// Runs an operator command through `sh -c`. Exit code 0 means bid.
/// Exit codes 126 and 127 mean the shell could not launch the command and
/// are reported as [`BidStrategyError::ProbeLaunch`].
pub struct ExecProbeStrategy {
    command: String,
    timeout: Duration,
}

impl ExecProbeStrategy {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    async fn run(&self, payload: &str) -> Result<std::process::Output, BidStrategyError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env(PROBE_DATA_ENV, payload)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BidStrategyError::ProbeLaunch {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The probe may exit without reading stdin
            match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(child.wait_with_output().await?)
    }
}

#[async_trait]
impl BidStrategy for ExecProbeStrategy {
    fn name(&self) -> &str {
        "exec_probe"
    }

    async fn decide(
        &self,
        request: &BidStrategyRequest,
    ) -> Result<BidStrategyResponse, BidStrategyError> {
        let payload = serde_json::to_string(&JobSelectionProbeData::from(request))?;

        // Dropping the run future on expiry kills the child
        let output = match tokio::time::timeout(self.timeout, self.run(&payload)).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "Probe command for job {} timed out after {:?}",
                    request.job.id, self.timeout
                );
                return Err(BidStrategyError::ProbeTimeout {
                    probe: "exec",
                    timeout: self.timeout,
                });
            }
        };

        if output.status.success() {
            return Ok(BidStrategyResponse::accept());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(code @ (EXIT_NOT_EXECUTABLE | EXIT_NOT_FOUND)) = output.status.code() {
            let kind = if code == EXIT_NOT_FOUND {
                ErrorKind::NotFound
            } else {
                ErrorKind::PermissionDenied
            };
            warn!(
                "Probe command could not be launched for job {}: exit code {}",
                request.job.id, code
            );
            return Err(BidStrategyError::ProbeLaunch {
                command: self.command.clone(),
                source: IoError::new(kind, stderr.trim().to_string()),
            });
        }

        debug!(
            "Probe command rejected job {}: status {}, stderr {}",
            request.job.id,
            output.status,
            stderr.trim()
        );
        let mut reason = match output.status.code() {
            Some(code) => format!("probe command rejected the job: exit code {}", code),
            None => "probe command was terminated by a signal".to_string(),
        };
        if !stderr.trim().is_empty() {
            reason.push_str(": ");
            reason.push_str(stderr.trim());
        }
        Ok(BidStrategyResponse::reject(reason))
    }
}
