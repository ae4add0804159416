//! Persistence of the rolling store

use super::store::{MetricsSnapshot, PadSide, RollingStore};
use crate::{blob::BlobStore, log_internal, log_warn};
use anyhow::{anyhow, Result};
use tokio::sync::Mutex;

pub fn encode(snapshot: &MetricsSnapshot) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(snapshot).map_err(|e| anyhow!("Could not serialize metrics: {}", e))
}

pub fn decode(bytes: &[u8]) -> Result<MetricsSnapshot> {
    serde_json::from_slice(bytes).map_err(|e| anyhow!("Could not parse metrics: {}", e))
}

/// Load the store from `blob`.
///
/// A missing blob yields an empty store.  So does an unreadable one: losing a week of activity
/// counts is preferable to refusing to start, and the next save replaces it.
pub async fn load_store(
    blob: &dyn BlobStore,
    num_days: usize,
    pad_side: PadSide,
) -> Result<RollingStore> {
    let mut store = RollingStore::new(num_days, pad_side);

    let Some(bytes) = blob.load().await? else {
        log_internal!("No metrics at `{}`, starting empty", blob.describe());
        return Ok(store);
    };

    match decode(&bytes) {
        Ok(snapshot) => {
            store.restore(snapshot);
            log_internal!(
                "Loaded metrics for {} user(s) from `{}`",
                store.len(),
                blob.describe()
            );
        }
        Err(e) => {
            log_warn!(
                "Discarding metrics at `{}`, starting empty: {}",
                blob.describe(),
                e
            );
        }
    }

    Ok(store)
}

/// Save the store if it changed since the last save.  Returns whether anything was written.
///
/// The store lock is only held while taking the snapshot.
pub async fn persist(store: &Mutex<RollingStore>, blob: &dyn BlobStore) -> Result<bool> {
    let snapshot = {
        let mut store = store.lock().await;
        if !store.is_dirty() {
            return Ok(false);
        }
        store.mark_clean();
        store.snapshot()
    };

    let written = match encode(&snapshot) {
        Ok(bytes) => blob.save(&bytes).await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        // Changes since the snapshot are already dirty; the snapshot's own changes must be
        // retried too.
        store.lock().await.mark_dirty();
        return Err(e);
    }

    Ok(true)
}
