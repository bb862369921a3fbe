//! Base readers for the response body. Exactly one producer is chosen per
//! request; affectors then wrap whatever reader comes out of here.

use std::cmp;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::TryStreamExt;
use rand::Rng;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::{ReaderStream, StreamReader, SyncIoBridge};
use tracing::debug;

use crate::http::{Body, HeaderMap, first_header_value, header_values, x_headers};
use crate::jsongen::{self, CountingWriter};
use crate::template;

pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
	#[error("cannot interpret {0:?} as a byte count")]
	InvalidByteCount(String),
}

/// Choose the base reader for the response body. First match wins: echo the
/// request body, a fixed count of random bytes, a generated JSON document,
/// or nothing.
pub fn base_reader(headers: &HeaderMap, request_body: Body) -> Result<BodyReader, BodyError> {
	if headers.contains_key(&x_headers::X_REQUEST_BODY_AS_RESPONSE) {
		return Ok(echo_reader(request_body));
	}
	if let Some(value) = first_header_value(headers, &x_headers::X_GENERATE_RANDOM) {
		let length = value
			.trim()
			.parse::<u64>()
			.map_err(|_| BodyError::InvalidByteCount(value.to_string()))?;
		return Ok(random_reader(length));
	}
	if headers.contains_key(&x_headers::X_RANDOM_JSON) {
		let fragments = header_values(headers, &x_headers::X_RANDOM_JSON);
		return Ok(template_reader(&fragments));
	}
	Ok(empty_reader())
}

/// Turn the finished reader chain into a streaming response body.
pub fn into_body(reader: BodyReader) -> Body {
	Body::from_stream(ReaderStream::new(reader))
}

pub fn echo_reader(request_body: Body) -> BodyReader {
	Box::new(StreamReader::new(
		request_body.into_data_stream().map_err(io::Error::other),
	))
}

pub fn empty_reader() -> BodyReader {
	Box::new(tokio::io::empty())
}

/// Yields exactly `length` uniformly random bytes, then end-of-stream.
pub fn random_reader(length: u64) -> BodyReader {
	Box::new(RandomBytes { remaining: length })
}

struct RandomBytes {
	remaining: u64,
}

impl AsyncRead for RandomBytes {
	fn poll_read(
		self: Pin<&mut Self>,
		_cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		let this = self.get_mut();
		let count = cmp::min(this.remaining, buf.remaining() as u64) as usize;
		if count > 0 {
			let unfilled = buf.initialize_unfilled_to(count);
			rand::rng().fill(&mut unfilled[..count]);
			buf.advance(count);
			this.remaining -= count as u64;
		}
		Poll::Ready(Ok(()))
	}
}

/// Build the generator for the combined `X-Random-Json` fragments and pipe
/// its output. A template that cannot produce a generator still produces a
/// body: a JSON object holding the error.
pub fn template_reader(fragments: &[&str]) -> BodyReader {
	let generator = template::normalize_template_params(fragments)
		.map_err(|err| err.to_string())
		.and_then(|program| {
			jsongen::template_generator(&program).map_err(|err| err.to_string())
		});
	let generator = match generator {
		Ok(generator) => generator,
		Err(message) => {
			debug!("template cannot generate a body: {message}");
			jsongen::error_generator(&message)
		},
	};
	generator_reader(generator)
}

/// Run a generator on a blocking task, writing into one end of an in-memory
/// pipe. The returned reader sees end-of-stream once generation completes or
/// errors, because the task drops its end.
fn generator_reader(mut generator: jsongen::BoxGenerator) -> BodyReader {
	let (write_half, read_half) = tokio::io::duplex(8 * 1024);
	let mut bridge = SyncIoBridge::new(write_half);
	tokio::task::spawn_blocking(move || {
		let mut sink = CountingWriter::new(&mut bridge);
		if let Err(err) = generator.generate(&mut sink) {
			debug!("json generation stopped after {} bytes: {err}", sink.written());
		}
	});
	Box::new(read_half)
}
