/// Weighted sampling used by the status-code selector and the random-lag
/// affector. Probabilities are supplied as percentages; entries with a
/// missing percentage split whatever mass the explicit entries leave over.

/// Float near-equality within a tolerance.
pub fn approx_eq(left: f64, right: f64, tolerance: f64) -> bool {
	(right - left).abs() < tolerance
}

// an entry whose percentage is within this of zero is treated as unspecified
const ZERO_TOLERANCE: f64 = 0.001;
// the total probability mass must land within this of 1.0
const TOTAL_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<T> {
	pub tag: T,
	pub probability: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram<T> {
	buckets: Vec<Bucket<T>>,
}

impl<T> Default for Histogram<T> {
	fn default() -> Self {
		Histogram { buckets: vec![] }
	}
}

impl<T> Histogram<T> {
	/// Build a histogram from `(tag, percent)` entries. Entries with a
	/// percentage of (roughly) zero divide the remaining mass between
	/// themselves. If the total lands further than 0.1 from 1.0 the
	/// histogram is rejected as empty.
	pub fn build(entries: Vec<(T, f64)>) -> Histogram<T> {
		let mut buckets = Vec::with_capacity(entries.len());
		let mut deferred = Vec::new();
		let mut total = 0.0;

		for (tag, percent) in entries {
			let probability = percent / 100.0;
			if approx_eq(probability, 0.0, ZERO_TOLERANCE) {
				deferred.push(tag);
			} else {
				total += probability;
				buckets.push(Bucket {
					tag,
					probability,
				});
			}
		}

		if !deferred.is_empty() {
			let per_deferred = (1.0 - total) / deferred.len() as f64;
			for tag in deferred {
				total += per_deferred;
				buckets.push(Bucket {
					tag,
					probability: per_deferred,
				});
			}
		}

		if buckets.is_empty() || !approx_eq(total, 1.0, TOTAL_TOLERANCE) {
			return Histogram::default();
		}

		buckets.sort_by(|left, right| {
			left
				.probability
				.partial_cmp(&right.probability)
				.expect("probabilities are finite")
		});
		Histogram { buckets }
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}

	/// Return the first bucket whose cumulative probability exceeds `u`,
	/// or None when no bucket does.
	pub fn sample(&self, u: f64) -> Option<&T> {
		let mut cumulative = 0.0;
		for bucket in &self.buckets {
			cumulative += bucket.probability;
			if cumulative > u {
				return Some(&bucket.tag);
			}
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use test_case::test_case;

	use super::*;

	fn fixed(probabilities: &[f64]) -> Histogram<usize> {
		// bypass build so bucket order is exactly as given
		Histogram {
			buckets: probabilities
				.iter()
				.enumerate()
				.map(|(tag, p)| Bucket {
					tag,
					probability: *p,
				})
				.collect(),
		}
	}

	#[test_case(0.1, Some(0))]
	#[test_case(0.25, Some(1))]
	#[test_case(0.7, Some(2))]
	#[test_case(2.0, None)]
	fn bucket_for_probability(u: f64, expected: Option<usize>) {
		let histogram = fixed(&[0.2, 0.3, 0.5]);
		assert_eq!(histogram.sample(u).copied(), expected);
	}

	#[test]
	fn accumulates_once_per_bucket() {
		// a double-accumulating scan would skip the middle bucket for 0.55
		let histogram = fixed(&[0.2, 0.3, 0.5]);
		assert_eq!(histogram.sample(0.45).copied(), Some(1));
		assert_eq!(histogram.sample(0.55).copied(), Some(2));
	}

	#[test]
	fn unspecified_entries_share_remaining_mass() {
		let histogram = Histogram::build(vec![("a", 50.0), ("b", 0.0), ("c", 0.0)]);
		assert!(!histogram.is_empty());
		// each deferred entry receives 25%, sorting puts them first
		assert_eq!(histogram.sample(0.1), Some(&"b"));
		assert_eq!(histogram.sample(0.3), Some(&"c"));
		assert_eq!(histogram.sample(0.9), Some(&"a"));
	}

	#[test]
	fn single_unspecified_entry_takes_everything() {
		let histogram = Histogram::build(vec![(500u16, 0.0)]);
		for u in [0.0, 0.37, 0.999] {
			assert_eq!(histogram.sample(u), Some(&500));
		}
	}

	#[test_case(vec![(1, 90.0), (2, 90.0)]; "overcommitted")]
	#[test_case(vec![(1, 20.0)]; "undercommitted")]
	#[test_case(vec![]; "no entries")]
	fn rejected_histograms_are_empty(entries: Vec<(i32, f64)>) {
		assert!(Histogram::build(entries).is_empty());
	}

	#[test]
	fn total_within_tolerance_is_accepted() {
		let histogram = Histogram::build(vec![(1, 60.0), (2, 45.0)]);
		assert!(!histogram.is_empty());
	}

	#[test]
	fn sorted_by_ascending_probability() {
		let histogram = Histogram::build(vec![("heavy", 70.0), ("light", 30.0)]);
		assert_eq!(histogram.sample(0.1), Some(&"light"));
		assert_eq!(histogram.sample(0.5), Some(&"heavy"));
	}

	#[test_case(3.3, 3.3, true)]
	#[test_case(3.3, 3.4, false)]
	fn float_equality(left: f64, right: f64, expected: bool) {
		assert_eq!(approx_eq(left, right, 0.1), expected);
	}

	#[test]
	fn accepted_histograms_cover_every_draw() {
		let histogram = Histogram::build(vec![(404, 25.0), (500, 35.0), (200, 0.0)]);
		assert!(!histogram.is_empty());
		for step in 0..1000 {
			let u = step as f64 / 1000.0;
			assert!(histogram.sample(u).is_some(), "no bucket claimed {u}");
		}
	}
}
