use std::path::{Path, PathBuf};

use serde::Serialize;
use thought_common::{Error, Result};
use thought_config::UpdateConfig;
use thought_db::{MigrationRunner, StorageGateway};
use tokio::process::Command;
use tracing::{info, warn};

/// Result of comparing the local checkout with the remote branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    pub has_update: bool,
    pub current: Option<String>,
    pub latest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub built: bool,
    pub migrations_applied: Vec<String>,
}

/// Self-update for a service running from a git checkout: pull, optionally
/// rebuild, then apply any new migrations. The running process is not
/// restarted.
pub struct Updater {
    install_dir: PathBuf,
    remote: String,
    branch: String,
    build_command: Vec<String>,
    gateway: StorageGateway,
    migrations_dir: PathBuf,
}

impl Updater {
    pub fn new(config: &UpdateConfig, gateway: StorageGateway, migrations_dir: PathBuf) -> Self {
        let install_dir = config
            .install_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            install_dir,
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            build_command: config.build_command.clone(),
            gateway,
            migrations_dir,
        }
    }

    /// Fetch the remote branch and compare heads. Failures are reported in
    /// [`UpdateCheck::error`] rather than returned.
    pub async fn check_for_updates(&self) -> UpdateCheck {
        match self.compare_heads().await {
            Ok((current, latest)) => UpdateCheck {
                has_update: current != latest,
                current: Some(short_sha(&current).to_string()),
                latest: Some(short_sha(&latest).to_string()),
                error: None,
            },
            Err(e) => {
                warn!("failed to check for updates: {e}");
                UpdateCheck {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    async fn compare_heads(&self) -> Result<(String, String)> {
        let current = self.git(&["rev-parse", "HEAD"]).await?;
        self.git(&["fetch", self.remote.as_str(), self.branch.as_str()]).await?;
        let tracking = format!("{}/{}", self.remote, self.branch);
        let latest = self.git(&["rev-parse", tracking.as_str()]).await?;
        Ok((current, latest))
    }

    pub async fn update(&self) -> Result<UpdateOutcome> {
        info!("starting update in {}", self.install_dir.display());

        info!("pulling latest changes");
        self.git(&["pull", self.remote.as_str(), self.branch.as_str()]).await?;

        let built = if let Some((program, args)) = self.build_command.split_first() {
            info!("running build command: {}", self.build_command.join(" "));
            run(program, args, &self.install_dir).await?;
            true
        } else {
            false
        };

        info!("running migrations");
        let runner = MigrationRunner::new(self.gateway.clone(), self.migrations_dir.clone());
        let report = tokio::task::spawn_blocking(move || runner.migrate())
            .await
            .map_err(|e| Error::Update(format!("migration task failed: {e}")))??;

        info!("update complete, restart the service to run the new version");
        Ok(UpdateOutcome {
            built,
            migrations_applied: report.applied,
        })
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        run("git", &args, &self.install_dir).await
    }
}

async fn run(program: &str, args: &[String], dir: &Path) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| Error::Update(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Update(format!(
            "{program} {} exited with {}: {}",
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}
