//! Metric name constants.

use std::time::Duration;

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config;

pub const AUTH_FAILED: &str = "scriptmarket.auth.failed"; // Counter.

pub const SUBMISSION_SCRIPT: &str = "scriptmarket.submission.script"; // Counter.
pub const SUBMISSION_GIVEAWAY: &str = "scriptmarket.submission.giveaway"; // Counter.
pub const SUBMISSION_AD: &str = "scriptmarket.submission.ad"; // Counter.
pub const SUBMISSION_AUTO_APPROVED: &str = "scriptmarket.submission.auto_approved"; // Counter.

pub const MODERATION_APPROVED: &str = "scriptmarket.moderation.approved"; // Counter.
pub const MODERATION_REJECTED: &str = "scriptmarket.moderation.rejected"; // Counter.

pub const GIVEAWAY_ENTRIES: &str = "scriptmarket.giveaway.entries"; // Counter.
pub const UPLOADS: &str = "scriptmarket.uploads"; // Counter.

/// Must be ran exactly once on startup. This will declare all of the instruments for `metrics`.
pub fn setup(config: Option<&config::MetricConfig>) -> anyhow::Result<()> {
    describe_counter!(AUTH_FAILED, "The number of failed authentication attempts.");

    describe_counter!(SUBMISSION_SCRIPT, "Script submissions accepted.");
    describe_counter!(SUBMISSION_GIVEAWAY, "Giveaway submissions accepted.");
    describe_counter!(SUBMISSION_AD, "Ad submissions accepted.");
    describe_counter!(
        SUBMISSION_AUTO_APPROVED,
        "Submissions that skipped the moderation queue."
    );

    describe_counter!(MODERATION_APPROVED, "Items approved by a moderator.");
    describe_counter!(MODERATION_REJECTED, "Items rejected by a moderator.");

    describe_counter!(GIVEAWAY_ENTRIES, "Giveaway entries recorded.");
    describe_counter!(UPLOADS, "Files accepted by the upload endpoint.");

    if let Some(config) = config {
        match config {
            config::MetricConfig::PrometheusPush(prometheus_config) => {
                PrometheusBuilder::new()
                    .with_push_gateway(
                        prometheus_config.url.clone(),
                        Duration::from_secs(10),
                        None,
                        None,
                    )
                    .context("failed to set up push gateway")?
                    .install()
                    .context("failed to install metrics exporter")?;
            }
        }
    }

    Ok(())
}
