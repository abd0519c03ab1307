use super::pattern_recognizer::{Pattern, PatternRecognizer};
use super::recognizer::Recognizer;
use super::RecognizerResult;

/// US Social Security Numbers.
///
/// The dashed `NNN-NN-NNNN` form is high confidence; a bare 9-digit run
/// is a weak signal left to the score filter. Spans whose area number can
/// never be issued (000, 666, 900-999) are dropped.
pub struct UsSsnRecognizer {
	base: PatternRecognizer,
}

impl UsSsnRecognizer {
	pub fn new() -> Self {
		Self {
			base: PatternRecognizer::new(
				"SSN",
				vec![
					Pattern::new("ssn_dashed", r"\b[0-9]{3}-[0-9]{2}-[0-9]{4}\b", 0.85),
					Pattern::new("ssn_bare", r"\b[0-9]{9}\b", 0.3),
				],
			),
		}
	}

	fn valid_area(span: &str) -> bool {
		let area: String = span.chars().filter(|c| c.is_ascii_digit()).take(3).collect();
		match area.parse::<u32>() {
			Ok(area) => area != 0 && area != 666 && area < 900,
			Err(_) => false,
		}
	}
}

impl Default for UsSsnRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for UsSsnRecognizer {
	fn entity_type(&self) -> &'static str {
		self.base.entity_type()
	}

	fn recognize(&self, text: &str) -> Vec<RecognizerResult> {
		self.base
			.find_all(text)
			.into_iter()
			.filter(|r| Self::valid_area(&text[r.start..r.end]))
			.collect()
	}
}
