use serde::{Deserialize, Serialize};

/// Where a job's inputs must live for the node to bid on it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSelectionLocality {
    /// Only bid when every input is already on the node
    Local,
    /// Bid regardless of where inputs live
    #[default]
    Anywhere,
}

/// Operator policy for which jobs a compute node accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSelectionPolicy {
    pub locality: JobSelectionLocality,

    /// Reject jobs that declare no inputs
    pub reject_stateless_jobs: bool,

    /// Accept jobs asking for full or HTTP networking
    pub accept_networked_jobs: bool,

    /// Domains HTTP-networked jobs may reach when networking is otherwise
    /// refused. A leading `.` also matches subdomains.
    pub allowed_domains: Vec<String>,

    /// Endpoint receiving the probe payload as a JSON POST
    pub probe_http: Option<String>,

    /// Shell command receiving the probe payload on stdin
    pub probe_exec: Option<String>,
}
