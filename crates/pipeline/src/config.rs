//! Runtime configuration loaded from environment variables.
//!
//! All fields have defaults suitable for local development; production
//! overrides via environment variables (a `.env` file is honored when
//! present).

use std::collections::BTreeSet;

use reelforge_core::workflow::{
    RetryPolicy, SelectionMode, WorkflowConfig, WorkflowType, DEFAULT_CONTINUATION_THRESHOLD,
    DEFAULT_JOB_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENCY,
};

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Workflow selection and scheduling knobs.
    pub workflow: WorkflowConfig,
    /// sqlx URL of the job ledger.
    pub ledger_url: String,
    /// Root directory of the generation memo, when caching is enabled.
    pub cache_dir: Option<String>,
}

impl RuntimeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default                          |
    /// |------------------------------------|----------------------------------|
    /// | `REELFORGE_SELECTION_MODE`         | `config_default`                 |
    /// | `REELFORGE_DEFAULT_WORKFLOW`       | `text_to_video`                  |
    /// | `REELFORGE_ENABLED_WORKFLOWS`      | all five, comma-separated        |
    /// | `REELFORGE_MAX_CONCURRENCY`        | `4`                              |
    /// | `REELFORGE_MAX_RETRIES`            | `3`                              |
    /// | `REELFORGE_BACKOFF_BASE_SECS`      | `2.0`                            |
    /// | `REELFORGE_MAX_BACKOFF_SECS`       | `60.0`                           |
    /// | `REELFORGE_JOB_TIMEOUT_SECS`       | `300`                            |
    /// | `REELFORGE_CONTINUATION_THRESHOLD` | `0.7`                            |
    /// | `REELFORGE_LEDGER_URL`             | `sqlite://reelforge.db?mode=rwc` |
    /// | `REELFORGE_CACHE_DIR`              | unset (memo disabled)            |
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let selection_mode = env_or("REELFORGE_SELECTION_MODE", "config_default");
        let selection_mode = SelectionMode::parse(&selection_mode)
            .expect("REELFORGE_SELECTION_MODE must be a valid selection mode");

        let default_workflow = env_or("REELFORGE_DEFAULT_WORKFLOW", "text_to_video");
        let default_workflow = WorkflowType::parse(&default_workflow)
            .expect("REELFORGE_DEFAULT_WORKFLOW must be a valid workflow type");

        let enabled: BTreeSet<WorkflowType> = match std::env::var("REELFORGE_ENABLED_WORKFLOWS")
        {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    WorkflowType::parse(s).expect(
                        "REELFORGE_ENABLED_WORKFLOWS must list valid workflow types",
                    )
                })
                .collect(),
            Err(_) => WorkflowType::ALL.into_iter().collect(),
        };

        let max_concurrency: usize = env_or(
            "REELFORGE_MAX_CONCURRENCY",
            &DEFAULT_MAX_CONCURRENCY.to_string(),
        )
        .parse()
        .expect("REELFORGE_MAX_CONCURRENCY must be a valid usize");

        let max_retries: u32 = env_or("REELFORGE_MAX_RETRIES", "3")
            .parse()
            .expect("REELFORGE_MAX_RETRIES must be a valid u32");

        let backoff_base_secs: f64 = env_or("REELFORGE_BACKOFF_BASE_SECS", "2.0")
            .parse()
            .expect("REELFORGE_BACKOFF_BASE_SECS must be a valid f64");

        let max_backoff_secs: f64 = env_or("REELFORGE_MAX_BACKOFF_SECS", "60.0")
            .parse()
            .expect("REELFORGE_MAX_BACKOFF_SECS must be a valid f64");

        let job_timeout_secs: u64 = env_or(
            "REELFORGE_JOB_TIMEOUT_SECS",
            &DEFAULT_JOB_TIMEOUT_SECS.to_string(),
        )
        .parse()
        .expect("REELFORGE_JOB_TIMEOUT_SECS must be a valid u64");

        let continuation_threshold: f64 = env_or(
            "REELFORGE_CONTINUATION_THRESHOLD",
            &DEFAULT_CONTINUATION_THRESHOLD.to_string(),
        )
        .parse()
        .expect("REELFORGE_CONTINUATION_THRESHOLD must be a valid f64");

        let ledger_url = env_or("REELFORGE_LEDGER_URL", "sqlite://reelforge.db?mode=rwc");
        let cache_dir = std::env::var("REELFORGE_CACHE_DIR").ok();

        Self {
            workflow: WorkflowConfig {
                selection_mode,
                default_workflow,
                enabled,
                max_concurrency,
                retry: RetryPolicy {
                    max_retries,
                    backoff_base_secs,
                    max_backoff_secs,
                },
                continuation_threshold,
                job_timeout_secs,
            },
            ledger_url,
            cache_dir,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation races with parallel tests, so only the
    // defaults path is covered here.
    #[test]
    fn defaults_match_documented_table() {
        let config = RuntimeConfig::from_env();
        assert_eq!(config.workflow.selection_mode, SelectionMode::ConfigDefault);
        assert_eq!(config.workflow.default_workflow, WorkflowType::TextToVideo);
        assert_eq!(config.workflow.enabled.len(), WorkflowType::ALL.len());
        assert_eq!(config.workflow.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.workflow.retry.max_retries, 3);
        assert_eq!(
            config.workflow.continuation_threshold,
            DEFAULT_CONTINUATION_THRESHOLD
        );
        assert!(config.ledger_url.starts_with("sqlite://"));
        assert!(config.cache_dir.is_none());
    }
}
