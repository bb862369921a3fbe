use badserver_core::prelude::*;
use badserver_core::{drain, signal};

use crate::Config;
use crate::admin::HeaderStore;
use crate::serve::{BadnessState, Server, handle_admin, handle_badness};

/// Bind both listeners and start serving. The returned handle reports the
/// bound addresses and waits for termination.
pub async fn run(config: Arc<Config>) -> anyhow::Result<Bound> {
	let shutdown = signal::Shutdown::new();
	let (drain_tx, drain_rx) = drain::new();

	let store = HeaderStore::spawn();
	let client = reqwest::Client::new();

	let badness = Server::bind(
		"badness",
		config.addr,
		drain_rx.clone(),
		BadnessState {
			store: store.clone(),
			client,
		},
	)
	.await
	.context("badness server starts")?;
	let address = badness.address();

	let admin = Server::bind("admin", config.admin_addr, drain_rx, store)
		.await
		.context("admin server starts")?;
	let admin_address = admin.address();

	badness.spawn(handle_badness);
	admin.spawn(handle_admin);

	Ok(Bound {
		address,
		admin_address,
		shutdown,
		drain_tx,
	})
}

pub struct Bound {
	pub address: SocketAddr,
	pub admin_address: SocketAddr,
	pub shutdown: signal::Shutdown,
	drain_tx: drain::DrainTrigger,
}

impl Bound {
	/// Block until a shutdown is requested, then drain both listeners.
	pub async fn wait_termination(self) -> anyhow::Result<()> {
		self.shutdown.wait().await;
		self.drain_tx.start_drain_and_wait().await;
		Ok(())
	}
}
