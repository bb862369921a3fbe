//! The process-wide default-header store and its admin HTTP surface.
//! Every access goes through one broker task that owns the map and answers
//! commands one at a time, so callers never share mutable state.

use tokio::sync::{mpsc, oneshot};

use crate::http::{HeaderMap, Method, Request, Response, StatusCode};
use crate::serve::empty_response;

enum Command {
	Get {
		reply: oneshot::Sender<HeaderMap>,
	},
	Update {
		headers: HeaderMap,
		reply: oneshot::Sender<HeaderMap>,
	},
	Clear {
		reply: oneshot::Sender<HeaderMap>,
	},
}

/// A handle to the broker. Cheap to clone; all clones talk to the same map.
#[derive(Clone)]
pub struct HeaderStore {
	commands: mpsc::Sender<Command>,
}

impl HeaderStore {
	/// Spawn the broker task and return a handle to it.
	pub fn spawn() -> HeaderStore {
		let (commands, mut rx) = mpsc::channel::<Command>(16);
		tokio::spawn(async move {
			let mut defaults = HeaderMap::new();
			while let Some(command) = rx.recv().await {
				match command {
					Command::Get { reply } => {
						let _ = reply.send(defaults.clone());
					},
					Command::Update { headers, reply } => {
						defaults = headers;
						let _ = reply.send(defaults.clone());
					},
					Command::Clear { reply } => {
						defaults = HeaderMap::new();
						let _ = reply.send(defaults.clone());
					},
				}
			}
		});
		HeaderStore { commands }
	}

	/// The current default headers.
	pub async fn get(&self) -> HeaderMap {
		self.send(|reply| Command::Get { reply }).await
	}

	/// Replace the defaults, returning the new set.
	pub async fn update(&self, headers: HeaderMap) -> HeaderMap {
		self.send(|reply| Command::Update { headers, reply }).await
	}

	/// Drop all defaults.
	pub async fn clear(&self) -> HeaderMap {
		self.send(|reply| Command::Clear { reply }).await
	}

	async fn send(&self, make: impl FnOnce(oneshot::Sender<HeaderMap>) -> Command) -> HeaderMap {
		let (reply_tx, reply_rx) = oneshot::channel();
		if self.commands.send(make(reply_tx)).await.is_err() {
			return HeaderMap::new();
		}
		reply_rx.await.unwrap_or_default()
	}
}

/// The admin port only speaks `/headers`: GET returns the defaults, POST
/// replaces them with the request's headers, DELETE clears them. The
/// resulting set is echoed back as response headers.
pub async fn handle(store: &HeaderStore, req: Request) -> Response {
	if !req.uri().path().starts_with("/headers") {
		return empty_response(StatusCode::NOT_FOUND);
	}

	let defaults = match *req.method() {
		Method::GET => store.get().await,
		Method::POST => store.update(req.headers().clone()).await,
		Method::DELETE => store.clear().await,
		_ => return empty_response(StatusCode::METHOD_NOT_ALLOWED),
	};

	let mut response = empty_response(StatusCode::OK);
	for (name, value) in defaults.iter() {
		response.headers_mut().append(name.clone(), value.clone());
	}
	response
}
