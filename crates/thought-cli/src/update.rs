use anyhow::{Result, bail};
use thought_config::AppConfig;
use thought_db::StorageGateway;
use thought_gateway::Updater;

fn updater(config: &AppConfig, gateway: StorageGateway) -> Updater {
    Updater::new(&config.update, gateway, config.resolved_migrations_dir())
}

pub async fn check(config: &AppConfig, gateway: StorageGateway) -> Result<()> {
    let check = updater(config, gateway).check_for_updates().await;
    if let Some(error) = check.error {
        bail!("update check failed: {error}");
    }

    let current = check.current.unwrap_or_default();
    let latest = check.latest.unwrap_or_default();
    if check.has_update {
        println!("Update available: {current} -> {latest}");
        println!("Run `thought-system update` to apply it.");
    } else {
        println!("Already up to date ({current}).");
    }
    Ok(())
}

pub async fn apply(config: &AppConfig, gateway: StorageGateway) -> Result<()> {
    let updater = updater(config, gateway);
    let check = updater.check_for_updates().await;
    if let Some(error) = check.error {
        bail!("update check failed: {error}");
    }
    if !check.has_update {
        println!("Already up to date.");
        return Ok(());
    }

    println!(
        "Updating {} -> {}",
        check.current.unwrap_or_default(),
        check.latest.unwrap_or_default()
    );
    let outcome = updater.update().await?;
    if outcome.built {
        println!("Build finished.");
    }
    println!("Applied {} migration(s).", outcome.migrations_applied.len());
    println!("Restart the service to run the new version.");
    Ok(())
}
