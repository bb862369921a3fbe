//! Builds the ordered list of response steps for one request. Steps run
//! sequentially against the response under construction: header setters
//! first, then the status-code sampler, then the step that installs the
//! (affected) streaming body.

use rand::Rng;
use tracing::warn;

use crate::affect;
use crate::body::{self, BodyReader};
use crate::histogram::Histogram;
use crate::http::{
	HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, header, header_values,
	split_key_value, x_headers,
};
use crate::proxy::{self, ProxyOutcome};

pub type Step = Box<dyn FnOnce(&mut Response) -> anyhow::Result<()> + Send>;

/// Build the pipeline for a request. A failure to construct any piece of it
/// replaces the whole pipeline with a single bad-request step; partial
/// pipelines are never returned.
pub async fn assemble(request: Request, client: &reqwest::Client) -> Vec<Step> {
	let (parts, request_body) = request.into_parts();

	if parts.headers.contains_key(&x_headers::X_PROXY_TO_HOST) {
		return assemble_proxy(parts, request_body, client).await;
	}

	let mut steps: Vec<Step> = Vec::new();

	for (name, values) in collate_forced_headers(&header_values(
		&parts.headers,
		&x_headers::X_RETURN_HEADER,
	)) {
		steps.push(header_setter(name, values));
	}

	if parts
		.headers
		.contains_key(&x_headers::X_RESPONSE_CODE_HISTOGRAM)
	{
		steps.push(status_code_sampler(build_status_histogram(&parts.headers)));
	}

	let reader = match body::base_reader(&parts.headers, request_body) {
		Ok(reader) => reader,
		Err(err) => return bad_request_pipeline(err.to_string()),
	};
	match affect::wrap_affectors(&parts.headers, reader) {
		Ok(reader) => steps.push(body_step(reader)),
		Err(err) => return bad_request_pipeline(err.to_string()),
	}
	steps
}

/// The proxy pipeline: upstream headers and status, then the affected
/// upstream body. Status and body selectors from the request are
/// suppressed; affectors still apply. The upstream body is released when
/// the streaming body is dropped.
async fn assemble_proxy(
	parts: http::request::Parts,
	request_body: crate::http::Body,
	client: &reqwest::Client,
) -> Vec<Step> {
	let request_headers = parts.headers.clone();

	let outcome = match proxy::forward(client, parts, request_body).await {
		Ok(outcome) => outcome,
		Err(err) => return bad_request_pipeline(format!("Could not calculate URL: {err}")),
	};

	let (emitter, reader): (Step, BodyReader) = match outcome {
		ProxyOutcome::Upstream {
			status,
			headers,
			reader,
		} => (
			Box::new(move |response: &mut Response| {
				for (name, value) in headers.iter() {
					// the upstream transport framing is not ours to echo
					if name == header::TRANSFER_ENCODING || name == header::CONNECTION {
						continue;
					}
					response.headers_mut().append(name.clone(), value.clone());
				}
				*response.status_mut() = status;
				Ok(())
			}),
			reader,
		),
		ProxyOutcome::Failed(message) => (
			Box::new(|response: &mut Response| {
				*response.status_mut() = StatusCode::BAD_REQUEST;
				Ok(())
			}),
			Box::new(std::io::Cursor::new(message.into_bytes())),
		),
	};

	match affect::wrap_affectors(&request_headers, reader) {
		Ok(reader) => vec![emitter, body_step(reader)],
		Err(err) => bad_request_pipeline(err.to_string()),
	}
}

/// One step that writes a plain-text 400 explaining why the pipeline could
/// not be built.
pub fn bad_request_pipeline(message: String) -> Vec<Step> {
	vec![Box::new(move |response: &mut Response| {
		*response.status_mut() = StatusCode::BAD_REQUEST;
		response.headers_mut().insert(
			header::CONTENT_TYPE,
			HeaderValue::from_static("text/plain; charset=utf-8"),
		);
		*response.body_mut() = crate::http::Body::from(message);
		Ok(())
	})]
}

fn body_step(reader: BodyReader) -> Step {
	Box::new(move |response: &mut Response| {
		*response.body_mut() = body::into_body(reader);
		Ok(())
	})
}

fn header_setter(name: HeaderName, values: Vec<HeaderValue>) -> Step {
	Box::new(move |response: &mut Response| {
		response.headers_mut().remove(&name);
		for value in values {
			response.headers_mut().append(name.clone(), value);
		}
		Ok(())
	})
}

/// Collate every `X-Return-Header` directive (`Name: value`) into per-name
/// value lists, keeping both name order and value order as given. Entries
/// without a colon, or that do not form a legal header, are logged and
/// skipped.
fn collate_forced_headers(directives: &[&str]) -> Vec<(HeaderName, Vec<HeaderValue>)> {
	let mut collated: Vec<(HeaderName, Vec<HeaderValue>)> = Vec::new();
	for directive in directives {
		let Some((name, value)) = directive.split_once(':') else {
			warn!("invalid header field {directive:?}: http headers must be key: value");
			continue;
		};
		let (name, value) = match (
			HeaderName::from_bytes(name.as_bytes()),
			HeaderValue::from_str(value.trim()),
		) {
			(Ok(name), Ok(value)) => (name, value),
			_ => {
				warn!("invalid header field {directive:?}: not a legal header");
				continue;
			},
		};
		match collated.iter_mut().find(|(existing, _)| *existing == name) {
			Some((_, values)) => values.push(value),
			None => collated.push((name, vec![value])),
		}
	}
	collated
}

/// Sample a status code per request. An empty histogram, or a draw no
/// bucket claims, writes 400.
fn status_code_sampler(histogram: Histogram<StatusCode>) -> Step {
	Box::new(move |response: &mut Response| {
		let status = histogram
			.sample(rand::rng().random::<f64>())
			.copied()
			.unwrap_or(StatusCode::BAD_REQUEST);
		*response.status_mut() = status;
		Ok(())
	})
}

/// Parse every `X-Response-Code-Histogram` value (`code[=percent]`,
/// comma-separated) into a histogram. Tokens that do not parse are logged
/// and skipped; the remaining tokens still count.
fn build_status_histogram(headers: &HeaderMap) -> Histogram<StatusCode> {
	let mut entries = Vec::new();
	for value in header_values(headers, &x_headers::X_RESPONSE_CODE_HISTOGRAM) {
		for token in value.split(',') {
			let (code, percent) = split_key_value(token);
			let Some(code) = code
				.trim()
				.parse::<u16>()
				.ok()
				.and_then(|code| StatusCode::from_u16(code).ok())
			else {
				warn!("skipping bad histogram value {token:?}: not a status code");
				continue;
			};
			let percent = if percent.is_empty() {
				0.0
			} else {
				match percent.parse::<f64>() {
					Ok(percent) => percent,
					Err(_) => {
						warn!("skipping bad histogram value {token:?}: bad percentage");
						continue;
					},
				}
			};
			entries.push((code, percent));
		}
	}
	Histogram::build(entries)
}

#[cfg(test)]
mod tests {
	use http_body_util::BodyExt;
	use test_case::test_case;

	use super::*;
	use crate::http::Body;

	fn empty_response() -> Response {
		::http::Response::builder()
			.status(StatusCode::OK)
			.body(Body::empty())
			.unwrap()
	}

	async fn run(steps: Vec<Step>) -> Response {
		let mut response = empty_response();
		for step in steps {
			step(&mut response).unwrap();
		}
		response
	}

	fn request(headers: &[(&HeaderName, &str)], body: &str) -> Request {
		let mut builder = ::http::Request::builder().method("GET").uri("/");
		for (name, value) in headers {
			builder = builder.header(*name, *value);
		}
		builder.body(Body::from(body.to_string())).unwrap()
	}

	async fn body_text(response: Response) -> String {
		let collected = response.into_body().collect().await.unwrap().to_bytes();
		String::from_utf8(collected.to_vec()).unwrap()
	}

	#[test]
	fn forced_headers_collate_in_order() {
		let collated = collate_forced_headers(&[
			"Test-1: x",
			"Test-1: y",
			"Test-2: z",
			"no-colon-here",
		]);
		assert_eq!(collated.len(), 2);
		assert_eq!(collated[0].0.as_str(), "test-1");
		assert_eq!(collated[0].1, vec!["x", "y"]);
		assert_eq!(collated[1].0.as_str(), "test-2");
		assert_eq!(collated[1].1, vec!["z"]);
	}

	#[tokio::test]
	async fn forced_headers_are_set_on_the_response() {
		let req = request(
			&[
				(&x_headers::X_RETURN_HEADER, "Content-Type: application/json"),
				(&x_headers::X_RETURN_HEADER, "Content-Type: text/xml"),
				(&x_headers::X_RETURN_HEADER, "My-Header: 300"),
			],
			"",
		);
		let response = run(assemble(req, &reqwest::Client::new()).await).await;

		let content_types: Vec<_> = response.headers().get_all("content-type").iter().collect();
		assert_eq!(content_types, vec!["application/json", "text/xml"]);
		assert_eq!(response.headers().get("my-header").unwrap(), "300");
	}

	#[tokio::test]
	async fn single_code_without_percent_always_wins() {
		let req = request(&[(&x_headers::X_RESPONSE_CODE_HISTOGRAM, "500")], "");
		let response = run(assemble(req, &reqwest::Client::new()).await).await;
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert!(body_text(response).await.is_empty());
	}

	#[tokio::test]
	async fn unusable_histogram_yields_bad_request() {
		let req = request(
			&[(&x_headers::X_RESPONSE_CODE_HISTOGRAM, "500=20,503=20")],
			"",
		);
		let response = run(assemble(req, &reqwest::Client::new()).await).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn bad_tokens_are_skipped_not_fatal() {
		let req = request(
			&[(&x_headers::X_RESPONSE_CODE_HISTOGRAM, "junk,500=oops,503")],
			"",
		);
		let response = run(assemble(req, &reqwest::Client::new()).await).await;
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	#[tokio::test]
	async fn echo_pipeline_returns_the_request_body() {
		let req = request(&[(&x_headers::X_REQUEST_BODY_AS_RESPONSE, "1")], "hello");
		let response = run(assemble(req, &reqwest::Client::new()).await).await;
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(body_text(response).await, "hello");
	}

	#[test_case(&x_headers::X_ADD_NOISE, "not a float"; "noise")]
	#[test_case(&x_headers::X_PAUSE_BEFORE_RESPONSE_START, "notParseable"; "pause")]
	#[test_case(&x_headers::X_RANDOM_DELAYS, "junk=100"; "delays")]
	#[test_case(&x_headers::X_GENERATE_RANDOM, "12x"; "random byte count")]
	#[tokio::test]
	async fn construction_failures_collapse_to_one_step(name: &HeaderName, value: &str) {
		let req = request(&[(name, value)], "");
		let steps = assemble(req, &reqwest::Client::new()).await;
		assert_eq!(steps.len(), 1);
		let response = run(steps).await;
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert!(!body_text(response).await.is_empty());
	}

	#[tokio::test]
	async fn affectors_apply_on_top_of_the_body() {
		let req = request(
			&[
				(&x_headers::X_REQUEST_BODY_AS_RESPONSE, "1"),
				(&x_headers::X_ADD_NOISE, "0"),
			],
			"unchanged",
		);
		let response = run(assemble(req, &reqwest::Client::new()).await).await;
		assert_eq!(body_text(response).await, "unchanged");
	}
}
