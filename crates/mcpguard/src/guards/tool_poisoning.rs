// Tool Poisoning Detection
//
// Scans advertised tool names, descriptions and input schemas for embedded
// instructions that try to subvert the agent: prompt injection, system
// override, safety bypass, role manipulation, hidden instruction markers
// and prompt leaking.
//
// Each category carries a pattern list and a risk weight. The score for an
// advertisement is the sum of weights over distinct (tool, pattern)
// matches; reaching the threshold denies the whole catalogue. Detection
// only: the guard never rewrites tools, and it runs purely on tools_list.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use super::Guard;
use crate::host::{Host, LogLevel};
use crate::{Decision, GuardContext, GuardError, GuardResult, Tool};

struct BuiltinCategory {
	name: &'static str,
	weight: u32,
	patterns: &'static [&'static str],
}

// Case-insensitivity is applied at compile time; patterns stay readable.
const BUILT_IN_CATEGORIES: &[BuiltinCategory] = &[
	BuiltinCategory {
		name: "hidden_instructions",
		weight: 3,
		patterns: &[r"\[HIDDEN\]", r"\[SECRET\]", r"<!--\s*INJECT"],
	},
	BuiltinCategory {
		name: "prompt_injection",
		weight: 3,
		patterns: &[
			r"ignore.{0,30}previous.{0,30}instructions",
			r"disregard.{0,30}above",
			r"forget\s+(all\s+)?(previous|prior|earlier)\s+(instructions?|commands?)",
		],
	},
	BuiltinCategory {
		name: "system_override",
		weight: 2,
		patterns: &[
			r"SYSTEM:\s*override",
			r"<\|system\|>",
			r"ADMIN:\s*(override|execute|run|bypass)",
			r"execute\s+as\s+(root|admin|system)",
		],
	},
	BuiltinCategory {
		name: "safety_bypass",
		weight: 2,
		patterns: &[
			r"bypass.{0,30}security",
			r"bypass.{0,30}restrictions",
			r"jailbreak",
			r"disable\s+(all\s+)?(safety|security|guardrails?)",
		],
	},
	BuiltinCategory {
		name: "role_manipulation",
		weight: 2,
		patterns: &[
			r"you.{0,30}are.{0,30}now.{0,30}(admin|jailbroken|root)",
			r"act as .{0,40}unrestricted",
			r"pretend\s+(you\s+are|to\s+be)\s+(admin|root|system)",
		],
	},
	BuiltinCategory {
		name: "prompt_leaking",
		weight: 1,
		patterns: &[
			r"reveal.{0,30}system.{0,30}prompt",
			r"print.{0,30}your.{0,30}instructions",
			r"show\s+(me\s+)?(your|the)\s+(system\s+)?prompt",
		],
	},
];

fn default_enabled_categories() -> BTreeSet<String> {
	BUILT_IN_CATEGORIES
		.iter()
		.map(|c| c.name.to_string())
		.collect()
}

fn default_risk_threshold() -> u32 {
	5
}

/// Configuration for Tool Poisoning Detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ToolPoisoningConfig {
	/// Categories to scan. Defaults to every built-in category; may also
	/// name custom categories defined entirely through the overrides.
	#[serde(default = "default_enabled_categories")]
	pub enabled_categories: BTreeSet<String>,

	/// category -> replacement pattern list
	#[serde(default)]
	pub patterns_override: BTreeMap<String, Vec<String>>,

	/// category -> replacement risk weight
	#[serde(default)]
	pub weights_override: BTreeMap<String, u32>,

	/// Cumulative score at which the advertisement is denied
	#[serde(default = "default_risk_threshold")]
	pub risk_threshold: u32,
}

impl Default for ToolPoisoningConfig {
	fn default() -> Self {
		Self {
			enabled_categories: default_enabled_categories(),
			patterns_override: BTreeMap::new(),
			weights_override: BTreeMap::new(),
			risk_threshold: default_risk_threshold(),
		}
	}
}

struct CompiledCategory {
	name: String,
	weight: u32,
	patterns: Vec<String>,
	set: RegexSet,
}

pub struct ToolPoisoningDetector {
	config: ToolPoisoningConfig,
	categories: Vec<CompiledCategory>,
	host: Arc<dyn Host>,
}

impl std::fmt::Debug for ToolPoisoningDetector {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ToolPoisoningDetector").finish_non_exhaustive()
	}
}

impl ToolPoisoningDetector {
	pub fn new(config: ToolPoisoningConfig, host: Arc<dyn Host>) -> Result<Self, GuardError> {
		let mut categories = Vec::new();

		for name in &config.enabled_categories {
			let builtin = BUILT_IN_CATEGORIES.iter().find(|c| c.name == name.as_str());

			let patterns: Vec<String> = match (config.patterns_override.get(name), builtin) {
				(Some(overridden), _) => overridden.clone(),
				(None, Some(builtin)) => builtin.patterns.iter().map(|p| p.to_string()).collect(),
				(None, None) => {
					return Err(GuardError::ConfigError(format!(
						"unknown pattern category '{name}' with no patterns_override"
					)));
				},
			};

			let weight = config
				.weights_override
				.get(name)
				.copied()
				.or(builtin.map(|c| c.weight))
				.unwrap_or(1);

			let set = RegexSet::new(patterns.iter().map(|p| format!("(?i:{p})")))
				.map_err(|e| GuardError::ConfigError(format!("invalid pattern in '{name}': {e}")))?;

			categories.push(CompiledCategory {
				name: name.clone(),
				weight,
				patterns,
				set,
			});
		}

		Ok(Self {
			config,
			categories,
			host,
		})
	}

	/// Distinct (pattern, category) matches for one tool's scan text.
	fn scan_tool(&self, tool: &Tool) -> Vec<PatternMatch> {
		let text = format!(
			"{}\n{}\n{}",
			tool.name,
			tool.description.as_deref().unwrap_or_default(),
			tool.input_schema
		);

		let mut matches = Vec::new();
		for category in &self.categories {
			for idx in category.set.matches(&text) {
				matches.push(PatternMatch {
					category: category.name.clone(),
					pattern: category.patterns[idx].clone(),
					weight: category.weight,
				});
			}
		}
		matches
	}
}

#[derive(Debug, Clone)]
struct PatternMatch {
	category: String,
	pattern: String,
	weight: u32,
}

impl Guard for ToolPoisoningDetector {
	fn evaluate_tools_list(&self, tools: &[Tool], ctx: &GuardContext) -> GuardResult {
		let mut score: u32 = 0;
		let mut category_hits: BTreeMap<String, u32> = BTreeMap::new();
		let mut offending_tools: BTreeSet<String> = BTreeSet::new();
		let mut match_details: Vec<serde_json::Value> = Vec::new();

		for tool in tools {
			for m in self.scan_tool(tool) {
				score += m.weight;
				*category_hits.entry(m.category.clone()).or_insert(0) += 1;
				offending_tools.insert(tool.name.clone());
				match_details.push(serde_json::json!({
					"tool": tool.name,
					"category": m.category,
					"pattern": m.pattern,
					"weight": m.weight,
				}));
			}
		}

		if score >= self.config.risk_threshold {
			self.host.log(
				LogLevel::Warn,
				&format!(
					"tool poisoning detected on '{}': score {score} >= {} across {} tool(s)",
					ctx.server_name,
					self.config.risk_threshold,
					offending_tools.len()
				),
			);
			return Ok(Decision::deny(
				"tool_poisoning_detected",
				format!(
					"Detected potential tool poisoning in {} tool(s) (risk score {score} >= threshold {})",
					offending_tools.len(),
					self.config.risk_threshold
				),
				Some(serde_json::json!({
					"categories": category_hits,
					"offending_tool_count": offending_tools.len(),
					"matches": match_details,
					"score": score,
					"threshold": self.config.risk_threshold,
				})),
			));
		}

		if score > 0 {
			self.host.log(
				LogLevel::Debug,
				&format!(
					"suspicious patterns on '{}' below threshold (score {score} < {})",
					ctx.server_name, self.config.risk_threshold
				),
			);
		}

		Ok(Decision::Allow)
	}

	fn settings_schema(&self) -> String {
		serde_json::json!({
			"$schema": "https://json-schema.org/draft/2020-12/schema",
			"$id": "mcpguard://guards/tool-poisoning/v1",
			"title": "Tool Poisoning Guard",
			"description": "Scans advertised tool names, descriptions and schemas for embedded instructions that attempt to subvert the agent",
			"type": "object",
			"properties": {
				"enabled_categories": {
					"type": "array",
					"title": "Enabled Categories",
					"description": "Pattern categories to scan for",
					"items": {
						"type": "string",
						"examples": [
							"hidden_instructions",
							"prompt_injection",
							"system_override",
							"safety_bypass",
							"role_manipulation",
							"prompt_leaking",
						],
					},
					"default": [
						"hidden_instructions",
						"prompt_injection",
						"prompt_leaking",
						"role_manipulation",
						"safety_bypass",
						"system_override",
					],
					"x-ui": {"component": "multi-select", "order": 1, "group": "patterns"},
				},
				"patterns_override": {
					"type": "object",
					"title": "Pattern Overrides",
					"description": "Replace a category's built-in pattern list with custom case-insensitive regexes",
					"additionalProperties": {"type": "array", "items": {"type": "string", "format": "regex"}},
					"default": {},
					"x-ui": {"component": "key-value-list", "order": 2, "group": "patterns"},
				},
				"weights_override": {
					"type": "object",
					"title": "Weight Overrides",
					"description": "Replace a category's risk weight",
					"additionalProperties": {"type": "integer", "minimum": 0},
					"default": {},
					"x-ui": {"component": "key-value-list", "order": 3, "group": "scoring"},
				},
				"risk_threshold": {
					"type": "integer",
					"title": "Risk Threshold",
					"description": "Cumulative score at which the tool catalogue is denied",
					"default": 5,
					"minimum": 1,
					"x-ui": {
						"component": "number",
						"helpText": "The score is the sum of category weights over distinct pattern matches",
						"order": 4,
						"group": "scoring",
					},
				},
			},
			"x-ui-groups": {
				"patterns": {"title": "Patterns", "order": 1, "description": "What to scan for"},
				"scoring": {"title": "Scoring", "order": 2, "description": "When to deny"},
			},
			"x-guard-meta": {
				"guardType": "tool_poisoning",
				"version": "1.0.0",
				"category": "detection",
				"defaultRunsOn": ["tools_list"],
				"icon": "flask-conical",
			},
		})
		.to_string()
	}

	fn default_config(&self) -> String {
		serde_json::to_string(&ToolPoisoningConfig::default())
			.unwrap_or_else(|_| "{}".to_string())
	}
}
