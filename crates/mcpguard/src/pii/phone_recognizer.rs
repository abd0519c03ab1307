use super::pattern_recognizer::{Pattern, PatternRecognizer};
use super::recognizer::Recognizer;
use super::RecognizerResult;

/// Phone numbers: NANP `(NXX) NXX-XXXX` shapes with area and exchange
/// leading digits constrained to 2-9, plus a weaker `+`-prefixed
/// international form.
pub struct PhoneRecognizer {
	base: PatternRecognizer,
}

impl PhoneRecognizer {
	pub fn new() -> Self {
		Self {
			base: PatternRecognizer::new(
				"PHONE_NUMBER",
				vec![
					Pattern::new(
						"nanp",
						r"(?:\+1[-.\s]?)?\(?[2-9][0-9]{2}\)?[-.\s]?[2-9][0-9]{2}[-.\s]?[0-9]{4}\b",
						0.7,
					),
					Pattern::new("international", r"\+(?:[0-9][-.\s]?){6,13}[0-9]\b", 0.5),
				],
			),
		}
	}
}

impl Default for PhoneRecognizer {
	fn default() -> Self {
		Self::new()
	}
}

impl Recognizer for PhoneRecognizer {
	fn entity_type(&self) -> &'static str {
		self.base.entity_type()
	}

	fn recognize(&self, text: &str) -> Vec<RecognizerResult> {
		self.base.find_all(text)
	}
}
