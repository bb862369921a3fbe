//! Forwarding to an upstream host named by `X-Proxy-To-Host`. The header
//! value overlays the incoming request URL, so a bare host keeps the
//! incoming scheme, path, and query, while a full URL replaces them.

use std::io;

use futures_util::TryStreamExt;
use tokio_util::io::StreamReader;
use url::Url;

use crate::body::BodyReader;
use crate::http::{Body, HeaderMap, StatusCode, first_header_value, header, x_headers};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
	#[error("could not calculate url: {0}")]
	InvalidUrl(String),
	#[error("request carries no usable host")]
	MissingHost,
}

/// What the pipeline gets back from the upstream attempt. A failed call is
/// not a pipeline error: it becomes a 400 whose body is the failure text.
pub enum ProxyOutcome {
	Upstream {
		status: StatusCode,
		headers: HeaderMap,
		reader: BodyReader,
	},
	Failed(String),
}

/// Re-issue the incoming request against the overlaid upstream URL. The
/// `X-Proxy-To-Host` header itself is not forwarded.
pub async fn forward(
	client: &reqwest::Client,
	parts: http::request::Parts,
	body: Body,
) -> Result<ProxyOutcome, ProxyError> {
	let target = first_header_value(&parts.headers, &x_headers::X_PROXY_TO_HOST)
		.ok_or(ProxyError::MissingHost)?
		.to_string();
	let incoming = incoming_url(&parts)?;
	let upstream = overlay_url(&target, &incoming)?;

	let mut headers = parts.headers;
	headers.remove(&x_headers::X_PROXY_TO_HOST);
	headers.remove(header::HOST);

	let result = client
		.request(parts.method, upstream)
		.headers(headers)
		.body(reqwest::Body::wrap_stream(body.into_data_stream()))
		.send()
		.await;

	match result {
		Ok(response) => {
			let status = response.status();
			let headers = response.headers().clone();
			let reader: BodyReader = Box::new(StreamReader::new(
				response.bytes_stream().map_err(io::Error::other),
			));
			Ok(ProxyOutcome::Upstream {
				status,
				headers,
				reader,
			})
		},
		Err(err) => Ok(ProxyOutcome::Failed(err.to_string())),
	}
}

/// The absolute form of the incoming request URL. The server speaks plain
/// HTTP, so the scheme is fixed.
fn incoming_url(parts: &http::request::Parts) -> Result<Url, ProxyError> {
	let uri = &parts.uri;
	let host = uri
		.authority()
		.map(|authority| authority.to_string())
		.or_else(|| first_header_value(&parts.headers, &header::HOST).map(str::to_string))
		.ok_or(ProxyError::MissingHost)?;

	let mut assembled = format!("http://{host}{}", uri.path());
	if let Some(query) = uri.query() {
		assembled.push('?');
		assembled.push_str(query);
	}
	Url::parse(&assembled).map_err(|err| ProxyError::InvalidUrl(err.to_string()))
}

/// Overlay the override onto the incoming URL: every non-empty component of
/// the override replaces the incoming one, everything else falls through.
pub fn overlay_url(override_value: &str, incoming: &Url) -> Result<Url, ProxyError> {
	let over = split_override(override_value);

	let scheme = over.scheme.unwrap_or_else(|| incoming.scheme());
	let userinfo = over
		.userinfo
		.map(str::to_string)
		.or_else(|| incoming_userinfo(incoming));
	let host = over
		.host
		.map(str::to_string)
		.or_else(|| incoming_hostport(incoming))
		.ok_or(ProxyError::MissingHost)?;
	let path = over.path.unwrap_or_else(|| incoming.path());
	let query = over.query.or_else(|| incoming.query());
	let fragment = over.fragment.or_else(|| incoming.fragment());

	let mut assembled = format!("{scheme}://");
	if let Some(userinfo) = userinfo {
		assembled.push_str(&userinfo);
		assembled.push('@');
	}
	assembled.push_str(&host);
	assembled.push_str(path);
	if let Some(query) = query {
		assembled.push('?');
		assembled.push_str(query);
	}
	if let Some(fragment) = fragment {
		assembled.push('#');
		assembled.push_str(fragment);
	}
	Url::parse(&assembled).map_err(|err| ProxyError::InvalidUrl(err.to_string()))
}

#[derive(Debug, Default, PartialEq, Eq)]
struct OverrideParts<'a> {
	scheme: Option<&'a str>,
	userinfo: Option<&'a str>,
	host: Option<&'a str>,
	path: Option<&'a str>,
	query: Option<&'a str>,
	fragment: Option<&'a str>,
}

fn split_override(input: &str) -> OverrideParts<'_> {
	let mut parts = OverrideParts::default();
	let mut rest = input;

	if let Some((body, fragment)) = rest.split_once('#') {
		parts.fragment = non_empty(fragment);
		rest = body;
	}
	if let Some((body, query)) = rest.split_once('?') {
		parts.query = non_empty(query);
		rest = body;
	}
	if let Some((scheme, remainder)) = rest.split_once("://") {
		parts.scheme = non_empty(scheme);
		rest = remainder;
	}

	let (authority, path) = match rest.find('/') {
		Some(index) => rest.split_at(index),
		None => (rest, ""),
	};
	parts.path = non_empty(path);

	let host = match authority.split_once('@') {
		Some((userinfo, host)) => {
			parts.userinfo = non_empty(userinfo);
			host
		},
		None => authority,
	};
	parts.host = non_empty(host);
	parts
}

fn non_empty(value: &str) -> Option<&str> {
	if value.is_empty() { None } else { Some(value) }
}

fn incoming_hostport(url: &Url) -> Option<String> {
	url.host_str().map(|host| match url.port() {
		Some(port) => format!("{host}:{port}"),
		None => host.to_string(),
	})
}

fn incoming_userinfo(url: &Url) -> Option<String> {
	if url.username().is_empty() && url.password().is_none() {
		return None;
	}
	match url.password() {
		Some(password) => Some(format!("{}:{}", url.username(), password)),
		None => Some(url.username().to_string()),
	}
}
