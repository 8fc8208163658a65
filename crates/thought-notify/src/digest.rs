use std::sync::Arc;

use serde_json::json;
use thought_common::{Error, Result};
use thought_db::{DigestWindow, Thought, ThoughtStore};
use tracing::{info, warn};

use crate::client::{Delivery, Notifier, SendOptions};

const PREVIEW_CHARS: usize = 100;
const DIGEST_HEADER: &str = "🧠 Thought System Digest";

/// Result of one digest run.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestReport {
    pub window: DigestWindow,
    pub thought_count: usize,
    pub delivery: DigestDelivery,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DigestDelivery {
    /// Delivery is disabled for this window.
    Disabled,
    /// Nothing in the window, so nothing to send.
    Empty,
    Sent,
    /// The notifier has no token configured.
    Skipped,
    /// Delivery failed; the job itself still succeeded.
    Failed(String),
}

/// Reads a trailing window of thoughts and forwards a digest.
pub struct DigestJob {
    store: ThoughtStore,
    notifier: Arc<dyn Notifier>,
}

impl DigestJob {
    pub fn new(store: ThoughtStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Run the digest for `window`. Storage errors propagate; delivery
    /// errors are logged and reported in [`DigestDelivery::Failed`].
    pub async fn run(&self, window: DigestWindow, deliver: bool) -> Result<DigestReport> {
        info!("running {window} digest job");

        let store = self.store.clone();
        let thoughts = tokio::task::spawn_blocking(move || store.digest_window(window))
            .await
            .map_err(|e| Error::Other(format!("digest query task failed: {e}")))??;

        if !thoughts.is_empty() {
            info!("found {} thought(s) in the last {window}", thoughts.len());
        }

        let delivery = if thoughts.is_empty() {
            DigestDelivery::Empty
        } else if !deliver {
            DigestDelivery::Disabled
        } else {
            match self
                .notifier
                .send_message(&format_digest(&thoughts), SendOptions::default())
                .await
            {
                Ok(Delivery::Sent(_)) => {
                    info!("{window} digest sent");
                    DigestDelivery::Sent
                }
                Ok(Delivery::Skipped) => DigestDelivery::Skipped,
                Err(e) => {
                    warn!("failed to send {window} digest: {e}");
                    DigestDelivery::Failed(e.to_string())
                }
            }
        };

        info!("{window} digest job complete");
        Ok(DigestReport {
            window,
            thought_count: thoughts.len(),
            delivery,
        })
    }
}

/// Render thoughts as a numbered list, each trimmed to a short preview.
pub fn format_digest(thoughts: &[Thought]) -> String {
    let mut lines = vec![format!("{DIGEST_HEADER}\n")];
    for (i, thought) in thoughts.iter().enumerate() {
        let preview: String = thought.content.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if thought.content.chars().count() > PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        lines.push(format!("{}. {preview}{ellipsis}", i + 1));
    }
    lines.join("\n")
}

/// Jobs registered with the gateway scheduler by `register-cron`.
pub fn cron_jobs(binary: &str) -> Vec<serde_json::Value> {
    vec![
        json!({
            "name": "thought-system-hourly",
            "schedule": "0 * * * *",
            "command": format!("{binary} digest hourly"),
        }),
        json!({
            "name": "thought-system-daily",
            "schedule": "0 9 * * *",
            "command": format!("{binary} digest daily"),
        }),
        json!({
            "name": "thought-system-check-updates",
            "schedule": "30 3 * * *",
            "command": format!("{binary} check-updates"),
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::{DigestDelivery, DigestJob, cron_jobs, format_digest};
    use crate::client::{Delivery, Notifier, SendOptions};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Map;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use thought_common::{Error, Result};
    use thought_db::{DigestWindow, MigrationRunner, NewThought, StorageGateway, Thought, ThoughtStore};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_message(&self, message: &str, _options: SendOptions) -> Result<Delivery> {
            if self.fail {
                return Err(Error::Notify("HTTP 503: unavailable".into()));
            }
            self.sent
                .lock()
                .expect("lock should not be poisoned")
                .push(message.to_string());
            Ok(Delivery::Sent(serde_json::Value::Null))
        }
    }

    fn store() -> (TempDir, ThoughtStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let gateway = StorageGateway::new(dir.path().join("data.db")).expect("gateway");
        let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
        MigrationRunner::new(gateway.clone(), shipped)
            .migrate()
            .expect("migrations should apply");
        (dir, ThoughtStore::new(gateway))
    }

    fn add(store: &ThoughtStore, content: &str) {
        store
            .insert(&NewThought {
                content: content.to_string(),
                source: "api".to_string(),
                tags: Vec::new(),
                metadata: Map::new(),
            })
            .expect("insert");
    }

    fn thought(content: &str) -> Thought {
        Thought {
            id: 1,
            content: content.to_string(),
            source: "api".to_string(),
            tags: Vec::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn format_digest_numbers_and_truncates() {
        let long = "x".repeat(150);
        let text = format_digest(&[thought("short one"), thought(&long)]);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "🧠 Thought System Digest");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "1. short one");
        assert_eq!(lines[3], format!("2. {}...", "x".repeat(100)));
    }

    #[test]
    fn format_digest_truncates_on_char_boundaries() {
        let text = format_digest(&[thought(&"é".repeat(120))]);
        assert!(text.ends_with(&format!("1. {}...", "é".repeat(100))));
    }

    #[tokio::test]
    async fn empty_window_sends_nothing() {
        let (_dir, store) = store();
        let notifier = Arc::new(RecordingNotifier::default());
        let job = DigestJob::new(store, notifier.clone());

        let report = job.run(DigestWindow::LastDay, true).await.expect("run");

        assert_eq!(report.thought_count, 0);
        assert_eq!(report.delivery, DigestDelivery::Empty);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn digest_is_sent_newest_first() {
        let (_dir, store) = store();
        add(&store, "first thought");
        add(&store, "second thought");
        let notifier = Arc::new(RecordingNotifier::default());
        let job = DigestJob::new(store, notifier.clone());

        let report = job.run(DigestWindow::LastDay, true).await.expect("run");

        assert_eq!(report.thought_count, 2);
        assert_eq!(report.delivery, DigestDelivery::Sent);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("1. second thought"));
        assert!(sent[0].contains("2. first thought"));
    }

    #[tokio::test]
    async fn disabled_delivery_only_counts() {
        let (_dir, store) = store();
        add(&store, "quiet hour");
        let notifier = Arc::new(RecordingNotifier::default());
        let job = DigestJob::new(store, notifier.clone());

        let report = job.run(DigestWindow::LastHour, false).await.expect("run");

        assert_eq!(report.thought_count, 1);
        assert_eq!(report.delivery, DigestDelivery::Disabled);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_does_not_fail_the_job() {
        let (_dir, store) = store();
        add(&store, "will not arrive");
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let job = DigestJob::new(store, notifier);

        let report = job
            .run(DigestWindow::LastDay, true)
            .await
            .expect("delivery errors are not job errors");

        assert!(matches!(report.delivery, DigestDelivery::Failed(ref e) if e.contains("503")));
    }

    #[tokio::test]
    async fn storage_errors_propagate() {
        let dir = tempfile::tempdir().expect("temp dir");
        let gateway = StorageGateway::new(dir.path().join("unmigrated.db")).expect("gateway");
        let job = DigestJob::new(
            ThoughtStore::new(gateway),
            Arc::new(RecordingNotifier::default()),
        );

        let err = job
            .run(DigestWindow::LastDay, true)
            .await
            .expect_err("missing table should fail");
        assert!(err.to_string().starts_with("database error"));
    }

    #[test]
    fn cron_jobs_call_the_cli() {
        let jobs = cron_jobs("/usr/local/bin/thought-system");
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0]["command"], "/usr/local/bin/thought-system digest hourly");
        assert_eq!(jobs[1]["schedule"], "0 9 * * *");
    }
}
