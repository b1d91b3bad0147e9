use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::store::CredentialStore;

#[derive(Debug, Clone, Default)]
struct Snapshot {
    seq: u64,
    json: Option<String>,
}

/// Serializes credential-store writes onto a background worker.
///
/// [`mark_dirty`](Self::mark_dirty) snapshots the store and returns
/// immediately; a single spawned task drains a watch channel and writes the
/// latest snapshot atomically. The single slot collapses concurrent dirty
/// markings (last snapshot wins) and the single worker keeps at most one
/// write in flight, so file contents never interleave. Write failures are
/// logged and retried only on the next dirty marking.
#[derive(Debug)]
pub struct PersistenceScheduler {
    snapshot_tx: watch::Sender<Snapshot>,
    done_rx: watch::Receiver<u64>,
    seq: AtomicU64,
}

impl PersistenceScheduler {
    pub fn spawn(path: PathBuf) -> Self {
        let (snapshot_tx, mut snapshot_rx) = watch::channel(Snapshot::default());
        let (done_tx, done_rx) = watch::channel(0u64);

        tokio::spawn(async move {
            while snapshot_rx.changed().await.is_ok() {
                let snapshot = snapshot_rx.borrow_and_update().clone();
                let Some(json) = snapshot.json else { continue };

                match write_snapshot(&path, &json).await {
                    Ok(()) => debug!("flushed credential store to {}", path.display()),
                    Err(err) => warn!(
                        "failed to write credential store to {}: {err}",
                        path.display()
                    ),
                }
                let _ = done_tx.send(snapshot.seq);
            }
        });

        Self {
            snapshot_tx,
            done_rx,
            seq: AtomicU64::new(0),
        }
    }

    /// Enqueue a save of the current store state and return immediately
    pub fn mark_dirty(&self, store: &CredentialStore) {
        let json = match store.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to serialize credential store, skipping save: {err}");
                return;
            }
        };

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.snapshot_tx.send(Snapshot {
            seq,
            json: Some(json),
        });
    }

    /// Wait until the most recently marked snapshot has been flushed.
    ///
    /// Resolution never waits on this; it exists for orderly shutdown.
    pub async fn settle(&self) {
        let target = self.seq.load(Ordering::SeqCst);
        let mut done = self.done_rx.clone();
        loop {
            if *done.borrow_and_update() >= target {
                return;
            }
            if done.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Write the full snapshot atomically: temp file in the same directory, then rename
async fn write_snapshot(path: &Path, json: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json).await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}
