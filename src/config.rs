//! Serializable settings for the configurable combinators.
//!
//! Durations are written in humantime form (`"10ms"`, `"1s"`). Every config
//! validates itself, and the matching `from_config` constructor refuses to
//! build a stage from an invalid one.

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Settings for [`crate::Batch`]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Messages per batch, zero for no count limit
    pub size: usize,
    /// Emit a partial batch after this long, zero to disable
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Maximum text bytes per batch, zero to disable
    pub byte_limit: usize,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 && self.timeout.is_zero() && self.byte_limit == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch needs at least one of size, timeout or byte_limit".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for [`crate::RateLimit`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Messages allowed per interval
    pub n: u64,
    /// Interval length
    #[serde(with = "humantime_serde")]
    pub per: Duration,
    /// Space messages evenly instead of bursting
    pub smooth: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            n: 1,
            per: Duration::from_secs(1),
            smooth: false,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.per.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "rate limit interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for [`crate::Sort`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortConfig {
    /// Window size in messages
    pub window: usize,
}

impl SortConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(PipelineError::InvalidConfig(
                "sort window must hold at least one message".into(),
            ));
        }
        Ok(())
    }
}

/// Worker count for [`crate::ShardMany`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShardConfig {
    pub concurrency: usize,
}

impl ShardConfig {
    pub fn validate(&self) -> Result<()> {
        check_concurrency(self.concurrency)
    }
}

/// Worker count for [`crate::Many`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManyConfig {
    pub concurrency: usize,
}

impl ManyConfig {
    pub fn validate(&self) -> Result<()> {
        check_concurrency(self.concurrency)
    }
}

fn check_concurrency(concurrency: usize) -> Result<()> {
    if concurrency < 1 {
        return Err(PipelineError::InvalidConcurrency(concurrency));
    }
    Ok(())
}
