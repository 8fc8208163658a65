use std::sync::Arc;

use anyhow::{Result, bail};
use thought_config::{AppConfig, DigestConfig};
use thought_db::{DigestWindow, ThoughtStore};
use thought_notify::{Delivery, DigestDelivery, DigestJob, OpenClawClient, cron_jobs};
use tracing::warn;

/// Whether a digest for `window` should be sent. Only the standard hourly and
/// daily windows have a config switch; other windows need `--deliver`.
fn should_deliver(digest: &DigestConfig, window: DigestWindow, forced: bool) -> bool {
    forced
        || match window {
            DigestWindow::LastHour => digest.deliver_hourly,
            DigestWindow::LastDay => digest.deliver_daily,
            DigestWindow::Minutes(_) => false,
        }
}

pub async fn run_digest(
    config: &AppConfig,
    store: ThoughtStore,
    window: &str,
    forced: bool,
) -> Result<()> {
    let window: DigestWindow = window.parse()?;
    let deliver = should_deliver(&config.digest, window, forced);

    let notifier = Arc::new(OpenClawClient::new(&config.notifier));
    let report = DigestJob::new(store, notifier).run(window, deliver).await?;

    println!(
        "{} thought(s) in the last {}",
        report.thought_count, report.window
    );
    match report.delivery {
        DigestDelivery::Sent => println!("Digest sent."),
        DigestDelivery::Empty => println!("Nothing to send."),
        DigestDelivery::Disabled => println!("Delivery disabled for this window."),
        DigestDelivery::Skipped => println!("OPENCLAW_TOKEN not set, digest not sent."),
        DigestDelivery::Failed(e) => println!("Delivery failed: {e}"),
    }
    Ok(())
}

pub async fn register_cron(config: &AppConfig, binary: &str) -> Result<()> {
    let client = OpenClawClient::new(&config.notifier);
    if !client.has_token() {
        bail!("OPENCLAW_TOKEN is required to register cron jobs");
    }

    let mut failures = 0;
    for job in cron_jobs(binary) {
        let name = job["name"].as_str().unwrap_or("unnamed").to_string();
        match client.register_cron_job(&job).await {
            Ok(Delivery::Sent(_)) => println!("Registered cron job: {name}"),
            Ok(Delivery::Skipped) => println!("Skipped cron job: {name}"),
            Err(e) => {
                warn!("failed to register {name}: {e}");
                println!("Failed to register {name}: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} cron job(s) failed to register");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_switches_pick_delivery_per_window() {
        let digest = DigestConfig {
            deliver_hourly: false,
            deliver_daily: true,
        };

        assert!(!should_deliver(&digest, DigestWindow::LastHour, false));
        assert!(should_deliver(&digest, DigestWindow::LastDay, false));
        assert!(!should_deliver(&digest, DigestWindow::Minutes(90), false));
    }

    #[test]
    fn forced_delivery_overrides_config() {
        let digest = DigestConfig {
            deliver_hourly: false,
            deliver_daily: false,
        };

        assert!(should_deliver(&digest, DigestWindow::LastHour, true));
        assert!(should_deliver(&digest, DigestWindow::Minutes(5), true));
    }

    #[tokio::test]
    async fn register_cron_requires_token() {
        let mut config = AppConfig::default();
        config.notifier.token = None;

        let err = register_cron(&config, "thought-system").await.unwrap_err();

        assert!(err.to_string().contains("OPENCLAW_TOKEN"));
    }

    #[tokio::test]
    async fn digest_rejects_unknown_window() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = thought_db::StorageGateway::new(dir.path().join("data.db")).unwrap();

        let result = run_digest(
            &AppConfig::default(),
            ThoughtStore::new(gateway),
            "fortnight",
            false,
        )
        .await;

        assert!(result.is_err());
    }
}
