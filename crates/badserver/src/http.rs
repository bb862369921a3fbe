use std::time::Duration;

pub type Error = axum_core::Error;
pub type Body = axum_core::body::Body;
pub type Request = ::http::Request<Body>;
pub type Response = ::http::Response<Body>;
pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header, uri};

/// The request headers that steer response badness.
pub mod x_headers {
	use http::HeaderName;

	pub const X_RESPONSE_CODE_HISTOGRAM: HeaderName =
		HeaderName::from_static("x-response-code-histogram");
	pub const X_RETURN_HEADER: HeaderName = HeaderName::from_static("x-return-header");
	pub const X_REQUEST_BODY_AS_RESPONSE: HeaderName =
		HeaderName::from_static("x-request-body-as-response");
	pub const X_GENERATE_RANDOM: HeaderName = HeaderName::from_static("x-generate-random");
	pub const X_RANDOM_JSON: HeaderName = HeaderName::from_static("x-random-json");
	pub const X_PAUSE_BEFORE_RESPONSE_START: HeaderName =
		HeaderName::from_static("x-pause-before-response-start");
	pub const X_ADD_NOISE: HeaderName = HeaderName::from_static("x-add-noise");
	pub const X_RANDOM_DELAYS: HeaderName = HeaderName::from_static("x-random-delays");
	pub const X_PROXY_TO_HOST: HeaderName = HeaderName::from_static("x-proxy-to-host");
}

/// All values of a header, in insertion order. Values that are not valid
/// UTF-8 are skipped.
pub fn header_values<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Vec<&'a str> {
	headers
		.get_all(name)
		.iter()
		.filter_map(|v| v.to_str().ok())
		.collect()
}

/// The first value of a header, if any.
pub fn first_header_value<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

/// Split a `key=value` directive on the first `=`. A missing `=` yields an
/// empty value; `500=x=y` yields `("500", "x=y")`.
pub fn split_key_value(input: &str) -> (&str, &str) {
	match input.split_once('=') {
		Some((key, value)) => (key, value),
		None => (input, ""),
	}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DurationParseError {
	#[error("no duration value given; pass an integer (milliseconds) or a duration string")]
	Empty,
	#[error("cannot interpret {0:?} as milliseconds or as a duration string")]
	Unparseable(String),
}

/// Parse a wait value: a bare integer is milliseconds, anything else must be
/// a duration string with a unit suffix (ns/us/ms/s/m/h).
pub fn parse_wait_duration(input: &str) -> Result<Duration, DurationParseError> {
	let input = input.trim();
	if input.is_empty() {
		return Err(DurationParseError::Empty);
	}
	if let Ok(millis) = input.parse::<u64>() {
		return Ok(Duration::from_millis(millis));
	}
	duration_str::parse(input).map_err(|_| DurationParseError::Unparseable(input.to_string()))
}

/// Copy every default header the request does not already carry onto the
/// request. Headers already present keep all of their values.
pub fn merge_default_headers(request: &mut HeaderMap, defaults: &HeaderMap) {
	for name in defaults.keys() {
		if request.contains_key(name) {
			continue;
		}
		for value in defaults.get_all(name) {
			request.append(name.clone(), value.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	use test_case::test_case;

	use super::*;

	#[test_case("", ("", ""); "empty")]
	#[test_case("500", ("500", ""); "key_only")]
	#[test_case("500=", ("500", ""); "key_with_trailing_equals")]
	#[test_case("500=x", ("500", "x"); "key_and_value")]
	#[test_case("500=x=y", ("500", "x=y"); "value_with_embedded_equals")]
	#[test_case("=", ("", ""); "equals_only")]
	fn split_key_value_pairs(input: &str, expected: (&str, &str)) {
		assert_eq!(split_key_value(input), expected);
	}

	#[test_case("500", Ok(Duration::from_millis(500)))]
	#[test_case("30s", Ok(Duration::from_secs(30)))]
	#[test_case("100ms", Ok(Duration::from_millis(100)))]
	#[test_case("", Err(DurationParseError::Empty))]
	#[test_case("notParseable", Err(DurationParseError::Unparseable("notParseable".to_string())))]
	fn wait_durations(input: &str, expected: Result<Duration, DurationParseError>) {
		assert_eq!(parse_wait_duration(input), expected);
	}

	#[test]
	fn first_value_wins() {
		let mut headers = HeaderMap::new();
		headers.append("x-test", "value2".parse().unwrap());
		headers.append("x-test", "value1".parse().unwrap());
		assert_eq!(
			first_header_value(&headers, &HeaderName::from_static("x-test")),
			Some("value2")
		);
		assert_eq!(
			first_header_value(&headers, &HeaderName::from_static("x-absent")),
			None
		);
	}

	#[test]
	fn merge_keeps_request_headers() {
		let mut request = HeaderMap::new();
		request.insert("x-generate-random", "5".parse().unwrap());

		let mut defaults = HeaderMap::new();
		defaults.insert("x-generate-random", "1000".parse().unwrap());
		defaults.append("x-return-header", "A: 1".parse().unwrap());
		defaults.append("x-return-header", "A: 2".parse().unwrap());

		merge_default_headers(&mut request, &defaults);

		assert_eq!(request.get("x-generate-random").unwrap(), "5");
		let forced: Vec<_> = request.get_all("x-return-header").iter().collect();
		assert_eq!(forced, vec!["A: 1", "A: 2"]);
	}
}
