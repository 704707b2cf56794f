//! Interface monitor: the string-set enumerator pointed at the host's
//! network interface names, driven by a poll ticker.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::enumerator::StringSetEnumerator;
use crate::iface;

/// Watches the set of network interface names and reports additions and
/// removals. Identity is by name; the first poll happens immediately, so
/// every interface present at startup is reported as added.
pub struct InterfaceMonitor {
    pub added: mpsc::Receiver<String>,
    pub removed: mpsc::Receiver<String>,
    cancel: CancellationToken,
    ticker: JoinHandle<()>,
    enumerator: JoinHandle<()>,
}

impl InterfaceMonitor {
    /// Start polling at `poll_interval`.
    pub fn spawn(poll_interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let StringSetEnumerator {
            added,
            removed,
            handle: enumerator,
        } = StringSetEnumerator::spawn(trigger_rx, || {
            iface::names().map_err(anyhow::Error::from)
        });

        let ticker = tokio::spawn(tick(poll_interval, trigger_tx, cancel.clone()));

        Self {
            added,
            removed,
            cancel,
            ticker,
            enumerator,
        }
    }

    /// Stop the poll ticker and wait for the enumeration loop to wind
    /// down. Both notification channels close as a result.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.ticker.await;
        let _ = self.enumerator.await;
    }
}

/// Feed the enumerator trigger until cancelled. Dropping the sender on the
/// way out is what shuts the enumerator down.
async fn tick(poll_interval: Duration, trigger_tx: mpsc::Sender<()>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = trigger_tx.send(()) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}
