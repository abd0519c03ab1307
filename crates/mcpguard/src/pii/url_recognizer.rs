use super::pattern_recognizer::{Pattern, PatternRecognizer};
use super::recognizer::Recognizer;
use super::RecognizerResult;

/// URLs with an explicit http/https scheme.
pub struct UrlRecognizer {
	base: PatternRecognizer,
}

impl UrlRecognizer {
	pub fn new() -> Self {
		Self {
			base: PatternRecognizer::new(
				"URL",
				vec![Pattern::new("url", r#"https?://[^\s<>"']+"#, 0.6)],
			),
		}
	}
}

impl Default for UrlRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for UrlRecognizer {
	fn entity_type(&self) -> &'static str {
		self.base.entity_type()
	}

	fn recognize(&self, text: &str) -> Vec<RecognizerResult> {
		self.base.find_all(text)
	}
}
