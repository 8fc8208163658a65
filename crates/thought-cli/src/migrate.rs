use std::path::PathBuf;

use anyhow::{Context, Result};
use thought_db::{MigrationReport, MigrationRunner, StorageGateway};

/// Apply pending migrations, or with `status_only` list what is applied and
/// what is still pending.
pub async fn run(gateway: StorageGateway, migrations_dir: PathBuf, status_only: bool) -> Result<()> {
    let runner = MigrationRunner::new(gateway, migrations_dir);

    if status_only {
        let (applied, pending) = tokio::task::spawn_blocking(move || {
            Ok::<_, thought_common::Error>((runner.applied()?, runner.pending()?))
        })
        .await??;

        println!("Applied migrations ({}):", applied.len());
        for m in &applied {
            println!("  {}  {}", m.applied_at, m.filename);
        }
        println!("Pending migrations ({}):", pending.len());
        for name in &pending {
            println!("  {name}");
        }
        return Ok(());
    }

    let dir = runner.migrations_dir().display().to_string();
    let report = tokio::task::spawn_blocking(move || runner.migrate())
        .await?
        .with_context(|| format!("failed to apply migrations from {dir}"))?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &MigrationReport) {
    if report.is_noop() {
        println!(
            "Database is up to date ({} migration(s) already applied).",
            report.already_applied
        );
        return;
    }

    println!("Applied {} migration(s):", report.applied.len());
    for name in &report.applied {
        println!("  + {name}");
    }
    if report.already_applied > 0 {
        println!("Skipped {} already applied.", report.already_applied);
    }
}
