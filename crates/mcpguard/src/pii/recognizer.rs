use super::RecognizerResult;

/// An entity recognizer: finds all spans of one entity type in a string.
pub trait Recognizer {
	/// Entity type this recognizer emits (e.g. `EMAIL_ADDRESS`).
	fn entity_type(&self) -> &'static str;

	/// Find all matches in `text`. Byte offsets, always on char
	/// boundaries, with a confidence score in [0, 1].
	fn recognize(&self, text: &str) -> Vec<RecognizerResult>;
}
