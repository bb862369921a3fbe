use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Create a drain channel. The trigger starts a drain; the watcher side is
/// cloned into every component that wants time to finish in-flight work.
/// The drain completes once every watcher clone has been dropped.
pub fn new() -> (DrainTrigger, DrainWatcher) {
	let (drain_tx, drain_rx) = watch::channel(false);
	let (done_tx, done_rx) = mpsc::channel(1);
	(
		DrainTrigger {
			drain_tx,
			done_rx,
		},
		DrainWatcher {
			drain_rx,
			_done: done_tx,
		},
	)
}

pub struct DrainTrigger {
	drain_tx: watch::Sender<bool>,
	done_rx: mpsc::Receiver<()>,
}

impl DrainTrigger {
	/// Signal all watchers, then wait until every watcher has been dropped.
	pub async fn start_drain_and_wait(mut self) {
		let _ = self.drain_tx.send(true);
		// recv resolves with None once the last watcher is gone
		let _ = self.done_rx.recv().await;
		debug!("drain complete");
	}
}

#[derive(Clone)]
pub struct DrainWatcher {
	drain_rx: watch::Receiver<bool>,
	_done: mpsc::Sender<()>,
}

impl DrainWatcher {
	/// Resolves when a drain has been requested. Dropping the watcher
	/// afterwards reports this component as drained.
	pub async fn wait_for_drain(mut self) {
		loop {
			if *self.drain_rx.borrow_and_update() {
				return;
			}
			if self.drain_rx.changed().await.is_err() {
				// trigger is gone; there will never be a drain
				std::future::pending::<()>().await;
			}
		}
	}
}
