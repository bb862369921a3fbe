//! Readers that wrap the response body to distort its timing or content.
//! The stack is applied after the body producer is chosen: initial latency
//! innermost, then random per-chunk lag, then noise outermost (noise rewrites
//! bytes, so it wraps the readers that merely delay them).

use std::cmp;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Sleep;
use tracing::warn;

use crate::body::BodyReader;
use crate::histogram::Histogram;
use crate::http::{
	DurationParseError, HeaderMap, HeaderName, first_header_value, header_values,
	parse_wait_duration, split_key_value, x_headers,
};

#[derive(Debug, thiserror::Error)]
pub enum AffectorError {
	#[error("no value defined for {0} header; pass an integer or a duration string")]
	MissingValue(HeaderName),
	#[error("cannot interpret {value:?} for {header}: {source}")]
	InvalidWait {
		header: HeaderName,
		value: String,
		source: DurationParseError,
	},
	#[error("noise percentage {0:?} is not a number")]
	InvalidNoise(String),
	#[error("no usable entries in the {0} header")]
	EmptyDelayHistogram(HeaderName),
}

/// Wrap `base` with an affector for every recognized header present.
pub fn wrap_affectors(headers: &HeaderMap, base: BodyReader) -> Result<BodyReader, AffectorError> {
	let mut reader = base;
	if headers.contains_key(&x_headers::X_PAUSE_BEFORE_RESPONSE_START) {
		reader = Box::new(InitialLatency::from_headers(headers, reader)?);
	}
	if headers.contains_key(&x_headers::X_RANDOM_DELAYS) {
		reader = Box::new(RandomLag::from_headers(headers, reader)?);
	}
	if headers.contains_key(&x_headers::X_ADD_NOISE) {
		reader = Box::new(Noise::from_headers(headers, reader)?);
	}
	Ok(reader)
}

/// Sleeps once before the first byte is produced, then delegates.
pub struct InitialLatency {
	inner: BodyReader,
	wait: Duration,
	sleep: Option<Pin<Box<Sleep>>>,
	has_slept: bool,
}

impl InitialLatency {
	pub fn new(wait: Duration, inner: BodyReader) -> InitialLatency {
		InitialLatency {
			inner,
			wait,
			sleep: None,
			has_slept: false,
		}
	}

	/// Build from `X-Pause-Before-Response-Start`: an integer is taken as
	/// milliseconds, anything else must be a duration string. Only the
	/// first header value is used.
	pub fn from_headers(headers: &HeaderMap, inner: BodyReader) -> Result<InitialLatency, AffectorError> {
		let header = x_headers::X_PAUSE_BEFORE_RESPONSE_START;
		let value = first_header_value(headers, &header).unwrap_or_default();
		let wait = parse_wait_duration(value).map_err(|source| match source {
			DurationParseError::Empty => AffectorError::MissingValue(header.clone()),
			source => AffectorError::InvalidWait {
				header: header.clone(),
				value: value.to_string(),
				source,
			},
		})?;
		Ok(InitialLatency::new(wait, inner))
	}
}

impl AsyncRead for InitialLatency {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		let this = self.get_mut();
		if !this.has_slept {
			let sleep = this
				.sleep
				.get_or_insert_with(|| Box::pin(tokio::time::sleep(this.wait)));
			ready!(sleep.as_mut().poll(cx));
			this.has_slept = true;
			this.sleep = None;
		}
		Pin::new(&mut this.inner).poll_read(cx, buf)
	}
}

/// Corrupts bytes from the inner reader with a fixed per-byte probability.
pub struct Noise {
	inner: BodyReader,
	frequency: f64,
}

impl Noise {
	/// Build from `X-Add-Noise`, a percentage in [0, 100].
	pub fn from_headers(headers: &HeaderMap, inner: BodyReader) -> Result<Noise, AffectorError> {
		let value =
			first_header_value(headers, &x_headers::X_ADD_NOISE).unwrap_or_default();
		let percentage = value
			.trim()
			.parse::<f64>()
			.map_err(|_| AffectorError::InvalidNoise(value.to_string()))?;
		Ok(Noise {
			inner,
			frequency: percentage / 100.0,
		})
	}
}

impl AsyncRead for Noise {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		let this = self.get_mut();
		let before = buf.filled().len();
		ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

		let mut rng = rand::rng();
		for byte in &mut buf.filled_mut()[before..] {
			if rng.random::<f64>() < this.frequency {
				*byte = rng.random::<u8>();
			}
		}
		Poll::Ready(Ok(()))
	}
}

// reads are capped at this many bytes so the lag spreads across the body
const LAG_CHUNK_SIZE: usize = 50;

/// Reads the body in small chunks, pausing a sampled duration before
/// releasing each one.
pub struct RandomLag {
	inner: BodyReader,
	histogram: Histogram<(Duration, Duration)>,
	sleep: Option<Pin<Box<Sleep>>>,
	chunk: Vec<u8>,
	done: bool,
}

impl RandomLag {
	pub fn new(histogram: Histogram<(Duration, Duration)>, inner: BodyReader) -> RandomLag {
		RandomLag {
			inner,
			histogram,
			sleep: None,
			chunk: Vec::new(),
			done: false,
		}
	}

	/// Build from `X-Random-Delays`: comma-separated `range=percent`
	/// entries, where range is `from-upTo` or a single duration meaning
	/// `0-that`. Entries that cannot be interpreted are logged and
	/// skipped; an empty percent auto-fills per the histogram rules.
	pub fn from_headers(headers: &HeaderMap, inner: BodyReader) -> Result<RandomLag, AffectorError> {
		let header = x_headers::X_RANDOM_DELAYS;
		let mut entries = Vec::new();
		for value in header_values(headers, &header) {
			for token in value.split(',') {
				let (range, percent) = split_key_value(token);
				let range = match parse_delay_range(range) {
					Ok(range) => range,
					Err(err) => {
						warn!("skipping bad delay range {token:?}: {err}");
						continue;
					},
				};
				let percent = if percent.is_empty() {
					warn!("no percentage on delay entry {token:?}, defaulting to 0");
					0.0
				} else {
					match percent.parse::<f64>() {
						Ok(percent) => percent,
						Err(_) => {
							warn!("skipping delay entry {token:?}: bad percentage");
							continue;
						},
					}
				};
				entries.push((range, percent));
			}
		}

		let histogram = Histogram::build(entries);
		if histogram.is_empty() {
			return Err(AffectorError::EmptyDelayHistogram(header));
		}
		Ok(RandomLag::new(histogram, inner))
	}
}

impl AsyncRead for RandomLag {
	fn poll_read(
		self: Pin<&mut Self>,
		cx: &mut Context<'_>,
		buf: &mut ReadBuf<'_>,
	) -> Poll<io::Result<()>> {
		let this = self.get_mut();
		loop {
			if let Some(sleep) = this.sleep.as_mut() {
				ready!(sleep.as_mut().poll(cx));
				this.sleep = None;
			}

			if !this.chunk.is_empty() || this.done {
				let give = cmp::min(buf.remaining(), this.chunk.len());
				buf.put_slice(&this.chunk[..give]);
				this.chunk.drain(..give);
				return Poll::Ready(Ok(()));
			}

			// never pull more than the caller will accept on this read
			let want = cmp::min(buf.remaining(), LAG_CHUNK_SIZE);
			let mut backing = vec![0u8; want];
			let mut chunk_buf = ReadBuf::new(&mut backing);
			ready!(Pin::new(&mut this.inner).poll_read(cx, &mut chunk_buf))?;

			let filled = chunk_buf.filled();
			if filled.is_empty() {
				this.done = true;
			}
			this.chunk.extend_from_slice(filled);

			if let Some(&(from, up_to)) = this.histogram.sample(rand::rng().random::<f64>()) {
				this.sleep = Some(Box::pin(tokio::time::sleep(lag_between(from, up_to))));
			}
		}
	}
}

/// A uniformly random duration in [from, up_to).
fn lag_between(from: Duration, up_to: Duration) -> Duration {
	match up_to.checked_sub(from) {
		Some(span) if !span.is_zero() => from + span.mul_f64(rand::rng().random::<f64>()),
		_ => from,
	}
}

fn parse_delay_range(range: &str) -> Result<(Duration, Duration), DurationParseError> {
	match range.split_once('-') {
		Some((from, up_to)) => Ok((parse_wait_duration(from)?, parse_wait_duration(up_to)?)),
		None => Ok((Duration::ZERO, parse_wait_duration(range)?)),
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use test_case::test_case;
	use tokio::io::AsyncReadExt;

	use super::*;
	use crate::http::HeaderValue;

	fn reader(data: &[u8]) -> BodyReader {
		Box::new(Cursor::new(data.to_vec()))
	}

	fn headers_with(name: HeaderName, value: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();
		headers.insert(name, HeaderValue::from_str(value).unwrap());
		headers
	}

	#[test_case("500", Some(Duration::from_millis(500)))]
	#[test_case("30s", Some(Duration::from_secs(30)))]
	#[test_case("", None)]
	#[test_case("notParseable", None)]
	fn initial_latency_construction(value: &str, expected: Option<Duration>) {
		let headers = headers_with(x_headers::X_PAUSE_BEFORE_RESPONSE_START, value);
		let built = InitialLatency::from_headers(&headers, reader(b""));
		match expected {
			Some(wait) => {
				let affector = built.unwrap();
				assert_eq!(affector.wait, wait);
				assert!(!affector.has_slept);
			},
			None => {
				assert!(built.is_err());
			},
		}
	}

	#[tokio::test(start_paused = true)]
	async fn initial_latency_sleeps_exactly_once() {
		let wait = Duration::from_millis(300);
		let mut affector = InitialLatency::new(wait, reader(b"hello world"));

		let start = tokio::time::Instant::now();
		let mut first = [0u8; 5];
		affector.read_exact(&mut first).await.unwrap();
		assert_eq!(start.elapsed(), wait);

		let mut rest = Vec::new();
		affector.read_to_end(&mut rest).await.unwrap();
		assert_eq!(start.elapsed(), wait);
		assert_eq!(rest, b" world");
	}

	#[test_case("17.2", Some(0.172))]
	#[test_case("100.0", Some(1.0))]
	#[test_case("", None)]
	#[test_case("not a float", None)]
	fn noise_construction(value: &str, expected: Option<f64>) {
		let headers = headers_with(x_headers::X_ADD_NOISE, value);
		let built = Noise::from_headers(&headers, reader(b""));
		match expected {
			Some(frequency) => {
				let affector = built.unwrap();
				assert!((affector.frequency - frequency).abs() < 0.01);
			},
			None => assert!(built.is_err()),
		}
	}

	#[tokio::test]
	async fn full_noise_rewrites_the_stream() {
		let input = b"testing";
		let headers = headers_with(x_headers::X_ADD_NOISE, "100.0");
		let mut affector = Noise::from_headers(&headers, reader(input)).unwrap();

		let mut output = Vec::new();
		affector.read_to_end(&mut output).await.unwrap();
		assert_eq!(output.len(), input.len());

		let matches = output
			.iter()
			.zip(input.iter())
			.filter(|(a, b)| a == b)
			.count();
		// a corrupted byte can still land on its original value, but two
		// survivors out of seven is vanishingly unlikely
		assert!(matches < 2, "input survived corruption: {output:?}");
	}

	#[tokio::test]
	async fn zero_noise_is_a_passthrough() {
		let headers = headers_with(x_headers::X_ADD_NOISE, "0");
		let mut affector = Noise::from_headers(&headers, reader(b"untouched")).unwrap();
		let mut output = Vec::new();
		affector.read_to_end(&mut output).await.unwrap();
		assert_eq!(output, b"untouched");
	}

	#[test_case("100ms=100", true)]
	#[test_case("100ms-2s=100", true)]
	#[test_case("100ms=", true; "empty percent auto fills")]
	#[test_case("junk=100", false)]
	#[test_case("", false)]
	fn random_lag_construction(value: &str, expected_ok: bool) {
		let headers = headers_with(x_headers::X_RANDOM_DELAYS, value);
		let built = RandomLag::from_headers(&headers, reader(b""));
		assert_eq!(built.is_ok(), expected_ok, "value {value:?}");
	}

	#[tokio::test(start_paused = true)]
	async fn random_lag_caps_chunk_size() {
		let data = vec![7u8; 200];
		let headers = headers_with(x_headers::X_RANDOM_DELAYS, "10ms-20ms=100");
		let mut affector = RandomLag::from_headers(&headers, reader(&data)).unwrap();

		let mut collected = Vec::new();
		let mut buffer = [0u8; 1024];
		loop {
			let n = affector.read(&mut buffer).await.unwrap();
			if n == 0 {
				break;
			}
			assert!(n <= LAG_CHUNK_SIZE, "read {n} bytes in one chunk");
			collected.extend_from_slice(&buffer[..n]);
		}
		assert_eq!(collected, data);
	}

	#[tokio::test(start_paused = true)]
	async fn lag_sleeps_between_chunks() {
		let data = vec![1u8; 100];
		let headers = headers_with(x_headers::X_RANDOM_DELAYS, "10ms-10ms=100");
		let mut affector = RandomLag::from_headers(&headers, reader(&data)).unwrap();

		let start = tokio::time::Instant::now();
		let mut output = Vec::new();
		affector.read_to_end(&mut output).await.unwrap();
		// two full chunks plus the empty end-of-stream chunk, 10ms each
		assert!(start.elapsed() >= Duration::from_millis(30));
		assert_eq!(output, data);
	}

	#[tokio::test(start_paused = true)]
	async fn affector_stack_composes() {
		let mut headers = HeaderMap::new();
		headers.insert(
			x_headers::X_PAUSE_BEFORE_RESPONSE_START,
			HeaderValue::from_static("5"),
		);
		headers.insert(x_headers::X_RANDOM_DELAYS, HeaderValue::from_static("1ms=100"));
		headers.insert(x_headers::X_ADD_NOISE, HeaderValue::from_static("0"));

		let mut stacked = wrap_affectors(&headers, reader(b"payload")).unwrap();
		let mut output = Vec::new();
		stacked.read_to_end(&mut output).await.unwrap();
		assert_eq!(output, b"payload");
	}

	#[test]
	fn broken_affector_fails_construction() {
		let headers = headers_with(x_headers::X_ADD_NOISE, "not a float");
		assert!(wrap_affectors(&headers, reader(b"")).is_err());
	}

	#[test_case("100ms", Some((Duration::ZERO, Duration::from_millis(100))))]
	#[test_case("100ms-2s", Some((Duration::from_millis(100), Duration::from_secs(2))))]
	#[test_case("500-1000", Some((Duration::from_millis(500), Duration::from_millis(1000))))]
	#[test_case("oops", None)]
	fn delay_ranges(input: &str, expected: Option<(Duration, Duration)>) {
		assert_eq!(parse_delay_range(input).ok(), expected);
	}
}
