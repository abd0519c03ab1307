use super::pattern_recognizer::{Pattern, PatternRecognizer};
use super::recognizer::Recognizer;
use super::RecognizerResult;

/// Credit card numbers: 13-19 digits with optional space/dash grouping,
/// validated with the Luhn checksum. Candidates failing Luhn are dropped
/// outright rather than scored down.
pub struct CreditCardRecognizer {
	base: PatternRecognizer,
}

impl CreditCardRecognizer {
	pub fn new() -> Self {
		Self {
			base: PatternRecognizer::new(
				"CREDIT_CARD",
				vec![Pattern::new(
					"credit_card",
					r"\b[0-9](?:[- ]?[0-9]){12,18}\b",
					1.0,
				)],
			),
		}
	}

	fn luhn_valid(span: &str) -> bool {
		let digits: Vec<u32> = span.chars().filter_map(|c| c.to_digit(10)).collect();
		if !(13..=19).contains(&digits.len()) {
			return false;
		}

		let sum: u32 = digits
			.iter()
			.rev()
			.enumerate()
			.map(|(i, &d)| {
				if i % 2 == 1 {
					let doubled = d * 2;
					if doubled > 9 { doubled - 9 } else { doubled }
				} else {
					d
				}
			})
			.sum();

		sum % 10 == 0
	}
}

impl Default for CreditCardRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for CreditCardRecognizer {
	fn entity_type(&self) -> &'static str {
		self.base.entity_type()
	}

	fn recognize(&self, text: &str) -> Vec<RecognizerResult> {
		self.base
			.find_all(text)
			.into_iter()
			.filter(|r| Self::luhn_valid(&text[r.start..r.end]))
			.collect()
	}
}
