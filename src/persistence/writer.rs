//! Debounced background writer for exploration grids
//!
//! `submit` never blocks on storage: snapshots go down a channel to a
//! worker thread that keeps only the newest snapshot per grid and writes
//! once things go quiet. Writes are OR-merges, so a snapshot that lands
//! twice (or out of order with another) is harmless. Retrying failed
//! writes is the store's business; failures here are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{ExplorationStore, GridDims, StoreError};
use crate::engine::exploration::{ExplorationGrid, GridKey};

/// Upper bound on how long a busy grid can go unwritten, in debounce windows
const MAX_WAIT_WINDOWS: u32 = 4;

enum Message {
    Snapshot(ExplorationGrid),
    Flush(Sender<()>),
}

/// Handle to the background writer thread
#[derive(Debug)]
pub struct PersistWriter {
    tx: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Snapshot(grid) => write!(f, "Snapshot({:?})", grid.key()),
            Message::Flush(_) => write!(f, "Flush"),
        }
    }
}

impl PersistWriter {
    /// Start a writer for `store`, flushing after `debounce` of quiet
    pub fn spawn(store: Arc<dyn ExplorationStore>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Message>();
        let worker = std::thread::Builder::new()
            .name("fogline-persist".into())
            .spawn(move || {
                let mut pending: HashMap<GridKey, ExplorationGrid> = HashMap::new();
                let mut deadline: Option<Instant> = None;
                let mut oldest: Option<Instant> = None;

                loop {
                    let received = match deadline {
                        Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match received {
                        Ok(Message::Snapshot(grid)) => {
                            let now = Instant::now();
                            let first = *oldest.get_or_insert(now);
                            deadline = Some((now + debounce).min(first + debounce * MAX_WAIT_WINDOWS));
                            pending.insert(grid.key(), grid);
                        }
                        Ok(Message::Flush(ack)) => {
                            write_pending(store.as_ref(), &mut pending);
                            deadline = None;
                            oldest = None;
                            let _ = ack.send(());
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            write_pending(store.as_ref(), &mut pending);
                            deadline = None;
                            oldest = None;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            write_pending(store.as_ref(), &mut pending);
                            break;
                        }
                    }
                }
                log::debug!("Persist writer stopped");
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Could not start persist writer thread ({e}); exploration will not be saved");
                None
            }
        };
        Self {
            tx: worker.as_ref().map(|_| tx),
            worker,
        }
    }

    /// Queue a grid snapshot; returns immediately
    pub fn submit(&self, grid: &ExplorationGrid) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(Message::Snapshot(grid.clone())).is_err() {
            log::warn!("Persist writer is gone; dropping snapshot for {:?}", grid.key());
        }
    }

    /// Write everything queued so far and wait for it
    pub fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for PersistWriter {
    fn drop(&mut self) {
        // Closing the channel makes the worker write what's left and exit
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Persist writer thread panicked");
            }
        }
    }
}

fn write_pending(store: &dyn ExplorationStore, pending: &mut HashMap<GridKey, ExplorationGrid>) {
    for (key, grid) in pending.drain() {
        let result = match store.explore(&key, grid.explored_rows()) {
            Err(StoreError::NotFound { .. }) => store
                .get(&key, GridDims::of(&grid))
                .and_then(|_| store.explore(&key, grid.explored_rows())),
            other => other,
        };
        match result {
            Ok(stored) => log::debug!(
                "Persisted exploration for scene {} / user {} ({} cells)",
                key.scene_id,
                key.user_id,
                stored.explored_count()
            ),
            Err(e) => log::warn!(
                "Failed to persist exploration for scene {} / user {}: {e}",
                key.scene_id,
                key.user_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts writes on top of a memory store
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl ExplorationStore for CountingStore {
        fn modify(
            &self,
            key: &GridKey,
            create: Option<GridDims>,
            f: &mut dyn FnMut(&mut ExplorationGrid) -> bool,
        ) -> Result<ExplorationGrid, StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.modify(key, create, f)
        }
    }

    fn grid_with(cells: &[(usize, usize)]) -> ExplorationGrid {
        let mut grid = ExplorationGrid::new("s", "u", 4, 4, 10);
        let mut update = vec![vec![false; 4]; 4];
        for &(col, row) in cells {
            update[row][col] = true;
        }
        grid.merge_explored(&update);
        grid
    }

    #[test]
    fn test_snapshots_are_coalesced() {
        let store = Arc::new(CountingStore::default());
        let writer = PersistWriter::spawn(store.clone(), Duration::from_secs(60));

        writer.submit(&grid_with(&[(0, 0)]));
        writer.submit(&grid_with(&[(0, 0), (1, 1)]));
        writer.submit(&grid_with(&[(0, 0), (1, 1), (2, 2)]));
        writer.flush();

        // One missing-grid probe, one create, one merge
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
        let stored = store
            .inner
            .get(&GridKey::new("s", "u"), GridDims::new(4, 4, 10))
            .expect("stored");
        assert_eq!(stored.explored_count(), 3);
    }

    #[test]
    fn test_debounce_fires_without_flush() {
        let store = Arc::new(MemoryStore::new());
        let writer = PersistWriter::spawn(store.clone(), Duration::from_millis(10));
        writer.submit(&grid_with(&[(3, 3)]));

        let key = GridKey::new("s", "u");
        let mut stored = 0;
        for _ in 0..200 {
            std::thread::sleep(Duration::from_millis(5));
            if let Ok(grid) = store.modify(&key, None, &mut |_| false) {
                stored = grid.explored_count();
                break;
            }
        }
        assert_eq!(stored, 1);
    }

    #[test]
    fn test_drop_writes_pending() {
        let store = Arc::new(MemoryStore::new());
        {
            let writer = PersistWriter::spawn(store.clone(), Duration::from_secs(60));
            writer.submit(&grid_with(&[(1, 2)]));
        }
        let grid = store
            .get(&GridKey::new("s", "u"), GridDims::new(4, 4, 10))
            .expect("written on drop");
        assert!(grid.is_explored(1, 2));
    }
}
