use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing human-readable resource quantities
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceParseError {
    #[error("invalid cpu quantity: {0}")]
    Cpu(String),

    #[error("invalid {kind} quantity: {value}")]
    Bytes { kind: &'static str, value: String },

    #[error("invalid gpu quantity: {0}")]
    Gpu(String),
}

/// Concrete amount of compute resources, either requested by a job or
/// tracked as available on a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU cores (fractional values allowed)
    pub cpu: f64,

    /// Memory in bytes
    pub memory: u64,

    /// Disk space in bytes
    pub disk: u64,

    /// Number of GPUs
    pub gpu: u64,
}

impl ResourceUsage {
    pub fn new(cpu: f64, memory: u64, disk: u64, gpu: u64) -> Self {
        Self { cpu, memory, disk, gpu }
    }

    /// Shorthand for a CPU-only quantity
    pub fn cpu(cpu: f64) -> Self {
        Self { cpu, ..Self::default() }
    }

    pub fn add(&self, other: &ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            cpu: self.cpu + other.cpu,
            memory: self.memory.saturating_add(other.memory),
            disk: self.disk.saturating_add(other.disk),
            gpu: self.gpu.saturating_add(other.gpu),
        }
    }

    /// Subtracts `other`, clamping every dimension at zero
    pub fn sub(&self, other: &ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            cpu: (self.cpu - other.cpu).max(0.0),
            memory: self.memory.saturating_sub(other.memory),
            disk: self.disk.saturating_sub(other.disk),
            gpu: self.gpu.saturating_sub(other.gpu),
        }
    }

    /// True if every dimension of `self` fits within `other`
    pub fn less_than_eq(&self, other: &ResourceUsage) -> bool {
        self.cpu <= other.cpu
            && self.memory <= other.memory
            && self.disk <= other.disk
            && self.gpu <= other.gpu
    }

    pub fn is_zero(&self) -> bool {
        self.cpu == 0.0 && self.memory == 0 && self.disk == 0 && self.gpu == 0
    }
}

impl fmt::Display for ResourceUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu: {}, memory: {}, disk: {}, gpu: {}",
            self.cpu, self.memory, self.disk, self.gpu
        )
    }
}

/// Resource quantities as written by operators, e.g. `cpu = "500m"`,
/// `memory = "2Gi"`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    pub gpu: String,
}

impl ResourceConfig {
    /// Parse into a concrete [`ResourceUsage`]. Empty fields count as zero.
    pub fn parse(&self) -> Result<ResourceUsage, ResourceParseError> {
        Ok(ResourceUsage {
            cpu: parse_cpu(&self.cpu)?,
            memory: parse_bytes("memory", &self.memory)?,
            disk: parse_bytes("disk", &self.disk)?,
            gpu: parse_gpu(&self.gpu)?,
        })
    }
}

fn parse_cpu(raw: &str) -> Result<f64, ResourceParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    let err = || ResourceParseError::Cpu(raw.to_string());
    let cores = match raw.strip_suffix('m') {
        Some(millis) => millis.trim().parse::<f64>().map_err(|_| err())? / 1000.0,
        None => raw.parse::<f64>().map_err(|_| err())?,
    };
    if !cores.is_finite() || cores < 0.0 {
        return Err(err());
    }
    Ok(cores)
}

fn parse_gpu(raw: &str) -> Result<u64, ResourceParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<u64>()
        .map_err(|_| ResourceParseError::Gpu(raw.to_string()))
}

fn parse_bytes(kind: &'static str, raw: &str) -> Result<u64, ResourceParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    let err = || ResourceParseError::Bytes {
        kind,
        value: raw.to_string(),
    };

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let number: f64 = number.parse().map_err(|_| err())?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "ki" | "kib" => 1 << 10,
        "m" | "mb" => 1_000_000,
        "mi" | "mib" => 1 << 20,
        "g" | "gb" => 1_000_000_000,
        "gi" | "gib" => 1 << 30,
        "t" | "tb" => 1_000_000_000_000,
        "ti" | "tib" => 1 << 40,
        _ => return Err(err()),
    };

    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return Err(err());
    }
    Ok(bytes as u64)
}
