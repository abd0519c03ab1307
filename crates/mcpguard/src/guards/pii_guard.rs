// PII Detection Guard
//
// Detects sensitive strings in tool call responses. Two action modes:
// mask rewrites each detected span in place and allows the response;
// reject denies the whole response without touching it.
//
// The guard walks the response payload as a tree and runs recognizers on
// every string leaf. Object keys are never scanned, which preserves the
// payload shape and avoids false positives on JSON structure.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Guard;
use crate::host::{Host, LogLevel};
use crate::pii::{self, PiiType, RecognizerResult};
use crate::{Decision, GuardContext, GuardResult};

/// Action to take when PII is detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
	/// Replace each detected span with the mask template and allow
	#[default]
	Mask,
	/// Deny the response entirely
	Reject,
}

fn default_recognisers() -> Vec<PiiType> {
	PiiType::all()
}

fn default_min_score() -> f32 {
	0.3
}

fn default_mask_template() -> String {
	"<{ENTITY_TYPE}>".to_string()
}

/// Configuration for the PII guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PiiGuardConfig {
	/// Action on detection
	#[serde(default)]
	pub mode: PiiAction,

	/// Entity types to detect (defaults to all)
	#[serde(default = "default_recognisers")]
	pub recognisers_enabled: Vec<PiiType>,

	/// Minimum confidence score for a span to count
	#[serde(default = "default_min_score")]
	pub min_score: f32,

	/// Replacement template in mask mode; `{ENTITY_TYPE}` expands to the
	/// span's entity type
	#[serde(default = "default_mask_template")]
	pub mask_template: String,
}

impl Default for PiiGuardConfig {
	fn default() -> Self {
		Self {
			mode: PiiAction::default(),
			recognisers_enabled: default_recognisers(),
			min_score: default_min_score(),
			mask_template: default_mask_template(),
		}
	}
}

pub struct PiiGuard {
	config: PiiGuardConfig,
	host: Arc<dyn Host>,
}

impl PiiGuard {
	pub fn new(config: PiiGuardConfig, host: Arc<dyn Host>) -> Self {
		Self { config, host }
	}

	/// All spans in `text` that clear the score filter.
	fn scan_text(&self, text: &str) -> Vec<RecognizerResult> {
		pii::scan_text(text, &self.config.recognisers_enabled)
			.into_iter()
			.filter(|r| r.score >= self.config.min_score)
			.collect()
	}

	/// Resolve overlapping spans: prefer the longer match, break ties by
	/// higher score, then by earlier start.
	fn select_spans(mut results: Vec<RecognizerResult>) -> Vec<RecognizerResult> {
		results.sort_by(|a, b| {
			b.len()
				.cmp(&a.len())
				.then_with(|| {
					b.score
						.partial_cmp(&a.score)
						.unwrap_or(std::cmp::Ordering::Equal)
				})
				.then_with(|| a.start.cmp(&b.start))
		});

		let mut selected: Vec<RecognizerResult> = Vec::new();
		for candidate in results {
			if !selected.iter().any(|kept| kept.overlaps(&candidate)) {
				selected.push(candidate);
			}
		}
		selected
	}

	/// Mask every surviving span in `text`, replacing from the end so
	/// earlier offsets stay valid.
	fn mask_text(&self, text: &str) -> Option<String> {
		let spans = Self::select_spans(self.scan_text(text));
		if spans.is_empty() {
			return None;
		}

		let mut spans = spans;
		spans.sort_by(|a, b| b.start.cmp(&a.start));

		let mut masked = text.to_string();
		for span in spans {
			if span.end > masked.len()
				|| !masked.is_char_boundary(span.start)
				|| !masked.is_char_boundary(span.end)
			{
				continue;
			}
			let replacement = self
				.config
				.mask_template
				.replace("{ENTITY_TYPE}", &span.entity_type);
			masked.replace_range(span.start..span.end, &replacement);
		}

		Some(masked)
	}

	/// Rewrite string leaves in place; returns true if anything changed.
	fn mask_value(&self, value: &mut serde_json::Value) -> bool {
		match value {
			serde_json::Value::String(s) => match self.mask_text(s) {
				Some(masked) => {
					*s = masked;
					true
				},
				None => false,
			},
			serde_json::Value::Array(items) => {
				let mut changed = false;
				for item in items {
					changed |= self.mask_value(item);
				}
				changed
			},
			serde_json::Value::Object(map) => {
				let mut changed = false;
				// Values only: keys are structure, not content
				for (_, item) in map.iter_mut() {
					changed |= self.mask_value(item);
				}
				changed
			},
			_ => false,
		}
	}

	/// Count surviving spans per entity type across all string leaves.
	fn collect_entities(&self, value: &serde_json::Value, counts: &mut BTreeMap<String, usize>) {
		match value {
			serde_json::Value::String(s) => {
				for span in Self::select_spans(self.scan_text(s)) {
					*counts.entry(span.entity_type).or_insert(0) += 1;
				}
			},
			serde_json::Value::Array(items) => {
				for item in items {
					self.collect_entities(item, counts);
				}
			},
			serde_json::Value::Object(map) => {
				for (_, item) in map.iter() {
					self.collect_entities(item, counts);
				}
			},
			_ => {},
		}
	}
}

impl Guard for PiiGuard {
	fn evaluate_tool_response(
		&self,
		tool_name: &str,
		payload: &mut serde_json::Value,
		ctx: &GuardContext,
	) -> GuardResult {
		match self.config.mode {
			PiiAction::Reject => {
				let mut counts = BTreeMap::new();
				self.collect_entities(payload, &mut counts);
				if counts.is_empty() {
					return Ok(Decision::Allow);
				}

				let total: usize = counts.values().sum();
				self.host.log(
					LogLevel::Warn,
					&format!(
						"rejecting response from tool '{tool_name}' on '{}': {total} PII span(s)",
						ctx.server_name
					),
				);
				let entities: Vec<serde_json::Value> = counts
					.into_iter()
					.map(|(entity_type, span_count)| {
						serde_json::json!({
							"entity_type": entity_type,
							"span_count": span_count,
						})
					})
					.collect();
				Ok(Decision::deny(
					"pii_detected",
					format!("Response from tool '{tool_name}' contains {total} PII item(s)"),
					Some(serde_json::json!({"entities": entities})),
				))
			},
			PiiAction::Mask => {
				if self.mask_value(payload) {
					self.host.log(
						LogLevel::Info,
						&format!(
							"masked PII in response from tool '{tool_name}' on '{}'",
							ctx.server_name
						),
					);
				}
				Ok(Decision::Allow)
			},
		}
	}

	fn settings_schema(&self) -> String {
		serde_json::json!({
			"$schema": "https://json-schema.org/draft/2020-12/schema",
			"$id": "mcpguard://guards/pii/v1",
			"title": "PII Guard",
			"description": "Detects sensitive strings in tool responses and masks them in place or rejects the response",
			"type": "object",
			"properties": {
				"mode": {
					"type": "string",
					"title": "Action",
					"description": "mask rewrites detected spans and allows the response; reject denies it untouched",
					"enum": ["mask", "reject"],
					"default": "mask",
					"x-ui": {"component": "radio", "order": 1, "group": "action"},
				},
				"recognisers_enabled": {
					"type": "array",
					"title": "Recognizers",
					"description": "Entity types to detect",
					"items": {
						"type": "string",
						"enum": ["email", "phone_number", "ssn", "credit_card", "ca_sin", "url"],
					},
					"default": ["email", "phone_number", "ssn", "credit_card", "ca_sin", "url"],
					"x-ui": {"component": "multi-select", "order": 2, "group": "detection"},
				},
				"min_score": {
					"type": "number",
					"title": "Minimum Score",
					"description": "Confidence score below which a detected span is ignored",
					"default": 0.3,
					"minimum": 0.0,
					"maximum": 1.0,
					"x-ui": {
						"component": "slider",
						"helpText": "Raise to suppress weak signals such as bare 9-digit runs",
						"order": 3,
						"group": "detection",
					},
				},
				"mask_template": {
					"type": "string",
					"title": "Mask Template",
					"description": "Replacement text in mask mode; {ENTITY_TYPE} expands to the span's entity type",
					"default": "<{ENTITY_TYPE}>",
					"x-ui": {"component": "text", "order": 4, "group": "action"},
				},
			},
			"x-ui-groups": {
				"action": {"title": "Action", "order": 1, "description": "What to do when PII is found"},
				"detection": {"title": "Detection", "order": 2, "description": "What counts as PII"},
			},
			"x-guard-meta": {
				"guardType": "pii",
				"version": "1.0.0",
				"category": "mitigation",
				"defaultRunsOn": ["tool_response"],
				"icon": "eye-off",
			},
		})
		.to_string()
	}

	fn default_config(&self) -> String {
		serde_json::to_string(&PiiGuardConfig::default()).unwrap_or_else(|_| "{}".to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use crate::host::TracingHost;

	fn guard(config: PiiGuardConfig) -> PiiGuard {
		PiiGuard::new(config, Arc::new(TracingHost::new()))
	}

	fn ctx() -> GuardContext {
		GuardContext::new("test-server")
	}

	#[test]
	fn test_mask_email_and_ssn_in_string() {
		let guard = guard(PiiGuardConfig::default());
		let mut payload =
			serde_json::json!("contact me at alice@example.com or 555-12-3456");

		let decision = guard
			.evaluate_tool_response("lookup", &mut payload, &ctx())
			.unwrap();
		assert_matches!(decision, Decision::Allow);
		assert_eq!(payload, serde_json::json!("contact me at <EMAIL_ADDRESS> or <SSN>"));
	}

	#[test]
	fn test_reject_mode_denies_and_leaves_payload() {
		let config = PiiGuardConfig {
			mode: PiiAction::Reject,
			..Default::default()
		};
		let guard = guard(config);
		let original = serde_json::json!("contact me at alice@example.com or 555-12-3456");
		let mut payload = original.clone();

		let decision = guard
			.evaluate_tool_response("lookup", &mut payload, &ctx())
			.unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "pii_detected");
			let details = reason.details.unwrap();
			let entities = details["entities"].as_array().unwrap();
			assert_eq!(entities.len(), 2);
			let types: Vec<&str> = entities
				.iter()
				.map(|e| e["entity_type"].as_str().unwrap())
				.collect();
			assert!(types.contains(&"EMAIL_ADDRESS"));
			assert!(types.contains(&"SSN"));
		});
		// Reject never rewrites
		assert_eq!(payload, original);
	}

	#[test]
	fn test_clean_payload_is_byte_identical() {
		let guard = guard(PiiGuardConfig::default());
		let original = serde_json::json!({
			"query": "What is the weather today?",
			"location": "New York",
			"count": 3,
			"flags": [true, null],
		});
		let mut payload = original.clone();

		let decision = guard
			.evaluate_tool_response("weather", &mut payload, &ctx())
			.unwrap();
		assert_matches!(decision, Decision::Allow);
		assert_eq!(
			serde_json::to_vec(&payload).unwrap(),
			serde_json::to_vec(&original).unwrap()
		);
	}

	#[test]
	fn test_nested_and_array_leaves_are_masked() {
		let guard = guard(PiiGuardConfig::default());
		let mut payload = serde_json::json!({
			"result": {
				"users": [
					{"name": "John", "email": "john@example.com"},
					{"name": "Jane", "email": "jane@example.com"}
				]
			}
		});

		guard
			.evaluate_tool_response("search", &mut payload, &ctx())
			.unwrap();
		for user in payload["result"]["users"].as_array().unwrap() {
			assert_eq!(user["email"], "<EMAIL_ADDRESS>");
		}
		assert_eq!(payload["result"]["users"][0]["name"], "John");
	}

	#[test]
	fn test_object_keys_are_not_scanned() {
		let guard = guard(PiiGuardConfig::default());
		// The key looks like an email; only the value may be rewritten
		let mut payload = serde_json::json!({"alice@example.com": "no pii here"});

		guard
			.evaluate_tool_response("echo", &mut payload, &ctx())
			.unwrap();
		assert!(payload.get("alice@example.com").is_some());
		assert_eq!(payload["alice@example.com"], "no pii here");
	}

	#[test]
	fn test_min_score_filters_weak_spans() {
		let config = PiiGuardConfig {
			mode: PiiAction::Reject,
			min_score: 0.6,
			..Default::default()
		};
		let guard = guard(config);
		// A bare 9-digit run scores 0.3, below the raised floor
		let mut payload = serde_json::json!({"data": "ID: 123456789"});

		let decision = guard
			.evaluate_tool_response("ids", &mut payload, &ctx())
			.unwrap();
		assert_matches!(decision, Decision::Allow);
	}

	#[test]
	fn test_overlap_prefers_longer_match() {
		let guard = guard(PiiGuardConfig::default());
		// The card digits contain shapes weaker recognizers also match;
		// the longer credit card span must win
		let mut payload = serde_json::json!("card: 4111 1111 1111 1111");

		guard
			.evaluate_tool_response("billing", &mut payload, &ctx())
			.unwrap();
		assert_eq!(payload, serde_json::json!("card: <CREDIT_CARD>"));
	}

	#[test]
	fn test_custom_mask_template() {
		let config = PiiGuardConfig {
			mask_template: "[redacted:{ENTITY_TYPE}]".to_string(),
			..Default::default()
		};
		let guard = guard(config);
		let mut payload = serde_json::json!("mail bob@corp.io");

		guard
			.evaluate_tool_response("echo", &mut payload, &ctx())
			.unwrap();
		assert_eq!(payload, serde_json::json!("mail [redacted:EMAIL_ADDRESS]"));
	}

	#[test]
	fn test_disabled_recognizers_are_skipped() {
		let config = PiiGuardConfig {
			mode: PiiAction::Reject,
			recognisers_enabled: vec![PiiType::CreditCard],
			..Default::default()
		};
		let guard = guard(config);
		let mut payload = serde_json::json!("contact alice@example.com");

		let decision = guard
			.evaluate_tool_response("echo", &mut payload, &ctx())
			.unwrap();
		assert_matches!(decision, Decision::Allow);
	}

	#[test]
	fn test_multiple_spans_per_entity_counted() {
		let config = PiiGuardConfig {
			mode: PiiAction::Reject,
			recognisers_enabled: vec![PiiType::Email],
			..Default::default()
		};
		let guard = guard(config);
		let mut payload = serde_json::json!({
			"a": "first@example.com",
			"b": "second@example.com",
		});

		let decision = guard
			.evaluate_tool_response("echo", &mut payload, &ctx())
			.unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			let details = reason.details.unwrap();
			assert_eq!(details["entities"][0]["entity_type"], "EMAIL_ADDRESS");
			assert_eq!(details["entities"][0]["span_count"], 2);
		});
	}

	#[test]
	fn test_url_masking() {
		let config = PiiGuardConfig {
			recognisers_enabled: vec![PiiType::Url],
			..Default::default()
		};
		let guard = guard(config);
		let mut payload = serde_json::json!("docs at https://internal.corp/wiki/page today");

		guard
			.evaluate_tool_response("docs", &mut payload, &ctx())
			.unwrap();
		assert_eq!(payload, serde_json::json!("docs at <URL> today"));
	}

	#[test]
	fn test_config_deserialization() {
		let yaml = r#"
mode: reject
recognisers_enabled:
  - email
  - phone_number
  - credit_card
min_score: 0.5
mask_template: "<{ENTITY_TYPE}>"
"#;
		let config: PiiGuardConfig = serde_yaml::from_str(yaml).unwrap();
		assert_eq!(config.mode, PiiAction::Reject);
		assert_eq!(config.recognisers_enabled.len(), 3);
		assert_eq!(config.min_score, 0.5);
	}

	#[test]
	fn test_default_config() {
		let config = PiiGuardConfig::default();
		assert_eq!(config.mode, PiiAction::Mask);
		assert_eq!(config.recognisers_enabled.len(), 6);
		assert_eq!(config.min_score, 0.3);
		assert_eq!(config.mask_template, "<{ENTITY_TYPE}>");
	}
}
