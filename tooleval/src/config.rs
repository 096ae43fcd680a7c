//! Harness configuration
//!
//! Every section has serde defaults, so a TOML file only needs the keys it
//! changes:
//!
//! ```toml
//! concurrency = 8
//! presentation = "same_tier"
//!
//! [retry]
//! max_attempts = 5
//! timeout_ms = 60000
//!
//! [aggregator]
//! pass_threshold = 1.0
//!
//! [[aggregator.tier_thresholds]]
//! tier = 3
//! threshold = 0.8
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::comparator::ComparatorConfig;
use crate::error::{EvalError, Result};
use crate::metrics::AggregatorConfig;
use crate::retry::RetryPolicy;
use crate::runner::ToolPresentation;

/// Configuration for a tier run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub retry: RetryPolicy,
    pub comparator: ComparatorConfig,
    pub aggregator: AggregatorConfig,
    /// Cases in flight at once within a tier
    pub concurrency: usize,
    /// Which tools a case is offered when it does not list its own
    pub presentation: ToolPresentation,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            comparator: ComparatorConfig::default(),
            aggregator: AggregatorConfig::default(),
            concurrency: 4,
            presentation: ToolPresentation::All,
        }
    }
}

impl EvalConfig {
    /// Parse from TOML text and validate
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EvalConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_comparator(mut self, comparator: ComparatorConfig) -> Self {
        self.comparator = comparator;
        self
    }

    #[must_use]
    pub fn with_aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.aggregator = aggregator;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_presentation(mut self, presentation: ToolPresentation) -> Self {
        self.presentation = presentation;
        self
    }

    /// Reject settings that make a run meaningless
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;

        if self.concurrency == 0 {
            return Err(EvalError::Config("concurrency must be at least 1".to_string()));
        }
        let epsilon = self.comparator.numeric_epsilon;
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(EvalError::Config(format!(
                "comparator.numeric_epsilon must be a finite non-negative number, got {epsilon}"
            )));
        }

        check_threshold("aggregator.pass_threshold", self.aggregator.pass_threshold)?;
        for tier in &self.aggregator.tier_thresholds {
            check_threshold(&format!("threshold for tier {}", tier.tier), tier.threshold)?;
        }
        Ok(())
    }
}

fn check_threshold(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EvalError::Config(format!("{name} must be within [0, 1], got {value}")))
    }
}
