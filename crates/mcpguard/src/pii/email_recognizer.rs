use super::pattern_recognizer::{Pattern, PatternRecognizer};
use super::recognizer::Recognizer;
use super::RecognizerResult;

/// Email addresses: a pragmatic RFC 5322 subset (`local@domain.tld`).
pub struct EmailRecognizer {
	base: PatternRecognizer,
}

impl EmailRecognizer {
	pub fn new() -> Self {
		Self {
			base: PatternRecognizer::new(
				"EMAIL_ADDRESS",
				vec![Pattern::new(
					"email",
					r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}\b",
					1.0,
				)],
			),
		}
	}
}

impl Default for EmailRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for EmailRecognizer {
	fn entity_type(&self) -> &'static str {
		self.base.entity_type()
	}

	fn recognize(&self, text: &str) -> Vec<RecognizerResult> {
		self.base.find_all(text)
	}
}
