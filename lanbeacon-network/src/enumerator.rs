//! Periodic set-difference engine.
//!
//! [`StringSetEnumerator`] re-runs a caller-supplied enumeration on every
//! trigger and reports membership changes on its `added` and `removed`
//! channels. It deliberately does not own a timer: the trigger is a plain
//! channel, which keeps the whole thing deterministic under test.
//!
//! Pending notifications are buffered in FIFO order and the loop waits on
//! the trigger and on both queues in a single `select!`. Queued
//! notifications are flushed preferentially; the trigger is serviced once
//! the queues are drained or the consumer has no capacity left. A slow
//! consumer therefore never stalls trigger servicing, and a closed
//! trigger terminates the loop promptly, discarding whatever the consumer
//! had no room for.

use std::collections::{HashSet, VecDeque};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Buffer size of the `added` / `removed` channels.
const NOTIFY_BUFFER: usize = 16;

/// Emits the difference between successive enumerations of a string set.
pub struct StringSetEnumerator {
    /// Names present in the latest enumeration but not the one before.
    pub added: mpsc::Receiver<String>,
    /// Names that disappeared between enumerations.
    pub removed: mpsc::Receiver<String>,
    pub(crate) handle: JoinHandle<()>,
}

impl StringSetEnumerator {
    /// Spawn the enumeration loop. The first trigger diffs against the
    /// empty set, so every initially present name is reported as added.
    /// The loop runs until `trigger` closes, then closes both
    /// notification channels.
    pub fn spawn<F>(trigger: mpsc::Receiver<()>, enumerate: F) -> Self
    where
        F: FnMut() -> anyhow::Result<HashSet<String>> + Send + 'static,
    {
        let (added_tx, added) = mpsc::channel(NOTIFY_BUFFER);
        let (removed_tx, removed) = mpsc::channel(NOTIFY_BUFFER);
        let handle = tokio::spawn(run(trigger, enumerate, added_tx, removed_tx));
        Self {
            added,
            removed,
            handle,
        }
    }
}

async fn run<F>(
    mut trigger: mpsc::Receiver<()>,
    mut enumerate: F,
    added_tx: mpsc::Sender<String>,
    removed_tx: mpsc::Sender<String>,
) where
    F: FnMut() -> anyhow::Result<HashSet<String>> + Send + 'static,
{
    let mut current: HashSet<String> = HashSet::new();
    let mut pending_added: VecDeque<String> = VecDeque::new();
    let mut pending_removed: VecDeque<String> = VecDeque::new();

    loop {
        // Biased so queued notifications drain ahead of the next trigger;
        // once a queue is empty or its consumer is out of capacity, the
        // trigger (or its closure) is observed.
        tokio::select! {
            biased;
            permit = added_tx.reserve(), if !pending_added.is_empty() => match permit {
                Ok(permit) => {
                    if let Some(name) = pending_added.pop_front() {
                        permit.send(name);
                    }
                }
                // Consumer went away; nothing left to notify.
                Err(_) => pending_added.clear(),
            },
            permit = removed_tx.reserve(), if !pending_removed.is_empty() => match permit {
                Ok(permit) => {
                    if let Some(name) = pending_removed.pop_front() {
                        permit.send(name);
                    }
                }
                Err(_) => pending_removed.clear(),
            },
            tick = trigger.recv() => match tick {
                Some(()) => match enumerate() {
                    Ok(next) => {
                        for name in next.difference(&current) {
                            pending_added.push_back(name.clone());
                        }
                        for name in current.difference(&next) {
                            pending_removed.push_back(name.clone());
                        }
                        current = next;
                    }
                    // Keep the previous view for this round; retry on the
                    // next trigger.
                    Err(err) => warn!("enumeration failed: {err:#}"),
                },
                None => break,
            },
        }
    }
    // Dropping the senders closes both notification channels.
}
