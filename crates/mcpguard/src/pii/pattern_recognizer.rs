use regex::Regex;

use super::RecognizerResult;

/// A named regex pattern with a base confidence score.
pub struct Pattern {
	pub name: &'static str,
	pub regex: Regex,
	pub score: f32,
}

impl Pattern {
	/// Build a pattern from a source string. Patterns are compile-time
	/// constants owned by the recognizers, so a failure here is a
	/// programming error, not an input error.
	pub fn new(name: &'static str, pattern: &str, score: f32) -> Self {
		Self {
			name,
			regex: Regex::new(pattern).expect("built-in recognizer pattern must compile"),
			score,
		}
	}
}

/// Shared base for regex-driven recognizers: runs every pattern over the
/// text and emits one result per match, deduplicating identical spans in
/// favor of the higher-scoring pattern.
pub struct PatternRecognizer {
	entity_type: &'static str,
	patterns: Vec<Pattern>,
}

impl PatternRecognizer {
	pub fn new(entity_type: &'static str, patterns: Vec<Pattern>) -> Self {
		Self {
			entity_type,
			patterns,
		}
	}

	pub fn entity_type(&self) -> &'static str {
		self.entity_type
	}

	/// All pattern matches over `text`, one result per distinct span.
	pub fn find_all(&self, text: &str) -> Vec<RecognizerResult> {
		let mut results: Vec<RecognizerResult> = Vec::new();

		for pattern in &self.patterns {
			for m in pattern.regex.find_iter(text) {
				let candidate =
					RecognizerResult::new(self.entity_type, m.start(), m.end(), pattern.score);

				match results
					.iter_mut()
					.find(|r| r.start == candidate.start && r.end == candidate.end)
				{
					Some(existing) => {
						if candidate.score > existing.score {
							existing.score = candidate.score;
						}
					},
					None => results.push(candidate),
				}
			}
		}

		results.sort_by_key(|r| (r.start, r.end));
		results
	}
}
