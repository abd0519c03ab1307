use super::pattern_recognizer::{Pattern, PatternRecognizer};
use super::recognizer::Recognizer;
use super::RecognizerResult;

/// Canadian Social Insurance Numbers: nine digits in `NNN-NNN-NNN` (or
/// space-separated, or bare), leading digit 1-9.
pub struct CaSinRecognizer {
	base: PatternRecognizer,
}

impl CaSinRecognizer {
	pub fn new() -> Self {
		Self {
			base: PatternRecognizer::new(
				"CA_SIN",
				vec![
					Pattern::new("sin_grouped", r"\b[1-9][0-9]{2}[- ][0-9]{3}[- ][0-9]{3}\b", 0.6),
					Pattern::new("sin_bare", r"\b[1-9][0-9]{8}\b", 0.3),
				],
			),
		}
	}
}

impl Default for CaSinRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for CaSinRecognizer {
	fn entity_type(&self) -> &'static str {
		self.base.entity_type()
	}

	fn recognize(&self, text: &str) -> Vec<RecognizerResult> {
		self.base.find_all(text)
	}
}
