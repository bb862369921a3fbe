//! A small plaintext HTTP/1.1 server with graceful draining, plus the
//! main-port dispatcher that merges stored default headers into each
//! request and runs its pipeline.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use badserver_core::drain::DrainWatcher;
use futures_util::TryFutureExt;
use hyper::Request;
use hyper::service::service_fn;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::admin::HeaderStore;
use crate::http::{Body, Response, StatusCode, merge_default_headers};
use crate::pipeline;

pub fn empty_response(code: StatusCode) -> Response {
	::http::Response::builder()
		.status(code)
		.body(Body::empty())
		.expect("builder with known status code should not fail")
}

pub fn plaintext_response(code: StatusCode, body: String) -> Response {
	::http::Response::builder()
		.status(code)
		.header(hyper::header::CONTENT_TYPE, "text/plain")
		.body(body.into())
		.expect("builder with known status code should not fail")
}

/// A generic bound listener: HTTP/1.1 plaintext, one task per connection,
/// drains in-flight connections on shutdown.
pub struct Server<S> {
	name: String,
	bind: TcpListener,
	drain_rx: DrainWatcher,
	state: S,
}

impl<S> Server<S> {
	pub async fn bind(
		name: &str,
		addr: SocketAddr,
		drain_rx: DrainWatcher,
		state: S,
	) -> anyhow::Result<Self> {
		let bind = TcpListener::bind(addr).await?;
		Ok(Server {
			name: name.to_string(),
			bind,
			drain_rx,
			state,
		})
	}

	pub fn address(&self) -> SocketAddr {
		self
			.bind
			.local_addr()
			.expect("local address must be ready")
	}

	pub fn spawn<F, R>(self, f: F)
	where
		S: Send + Sync + 'static,
		F: Fn(Arc<S>, Request<hyper::body::Incoming>) -> R + Send + Sync + 'static,
		R: Future<Output = Result<Response, anyhow::Error>> + Send + 'static,
	{
		let Server {
			name,
			bind,
			drain_rx: drain,
			state,
		} = self;
		let address = bind.local_addr().expect("local address must be ready");
		let state = Arc::new(state);
		let f = Arc::new(f);
		info!(%address, component = name, "listener established");

		tokio::spawn(async move {
			let drain_listener = drain.clone();
			let accept = async {
				loop {
					let Ok((socket, _)) = bind.accept().await else {
						continue;
					};
					let _ = socket.set_nodelay(true);
					let drain = drain.clone();
					let f = f.clone();
					let state = state.clone();
					tokio::spawn(async move {
						let serve = hyper::server::conn::http1::Builder::new().serve_connection(
							hyper_util::rt::TokioIo::new(socket),
							service_fn(move |req| {
								let state = state.clone();
								let f = f.clone();
								// failures would abort the connection; turn them into a 500
								async move { f(state, req).await }.or_else(|err| async move {
									warn!("request handling failed: {err}");
									Ok::<_, Infallible>(plaintext_response(
										StatusCode::INTERNAL_SERVER_ERROR,
										err.to_string(),
									))
								})
							}),
						);
						// wait for drain to signal or connection serving to complete
						let mut serve = std::pin::pin!(serve);
						tokio::select! {
							result = serve.as_mut() => {
								if let Err(err) = result {
									debug!("connection closed: {err}");
								}
							},
							_ = drain.wait_for_drain() => {
								serve.as_mut().graceful_shutdown();
								let _ = serve.await;
							},
						}
					});
				}
			};
			tokio::select! {
				_ = accept => {},
				_ = drain_listener.wait_for_drain() => {
					info!(%address, component = name, "listener drained");
				},
			}
		});
	}
}

/// Per-request state on the main port.
pub struct BadnessState {
	pub store: HeaderStore,
	pub client: reqwest::Client,
}

/// Dispatch one main-port request: pull the stored defaults, merge them
/// into the request (request wins), then build and run the pipeline.
pub async fn handle_badness(
	state: Arc<BadnessState>,
	req: Request<hyper::body::Incoming>,
) -> anyhow::Result<Response> {
	let mut req = req.map(Body::new);

	let defaults = state.store.get().await;
	merge_default_headers(req.headers_mut(), &defaults);

	let mut response = empty_response(StatusCode::OK);
	for step in pipeline::assemble(req, &state.client).await {
		step(&mut response)?;
	}
	Ok(response)
}

/// Admin-port entry point, shaped for `Server::spawn`.
pub async fn handle_admin(
	store: Arc<HeaderStore>,
	req: Request<hyper::body::Incoming>,
) -> anyhow::Result<Response> {
	Ok(crate::admin::handle(&store, req.map(Body::new)).await)
}
