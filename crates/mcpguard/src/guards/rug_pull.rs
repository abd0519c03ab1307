// Rug Pull Detection
//
// Detects a server altering its advertised tool catalogue mid-session, the
// classic bait-and-switch: benign tools at approval time, hostile
// descriptions or schemas once trust is established.
//
// The first successful tools_list for a target captures a baseline. Every
// later advertisement is diffed against that baseline tool-by-tool and the
// changes are scored. The baseline never drifts on an allowed
// advertisement; it is cleared only by an explicit reset. Letting it
// follow low-risk changes would allow an attacker to walk the catalogue
// to a hostile state one cheap step at a time.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Guard;
use crate::fingerprint::CanonicalTool;
use crate::host::{Host, LogLevel};
use crate::store::{Baseline, GuardStore};
use crate::{Decision, GuardContext, GuardResult, Tool};

/// A kind of catalogue change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
	/// A tool's description changed
	Description,
	/// A tool's input schema changed
	Schema,
	/// A baseline tool disappeared
	Remove,
	/// A tool not in the baseline appeared
	Add,
}

impl ChangeKind {
	fn as_str(&self) -> &'static str {
		match self {
			ChangeKind::Description => "description",
			ChangeKind::Schema => "schema",
			ChangeKind::Remove => "remove",
			ChangeKind::Add => "add",
		}
	}
}

/// Risk weight per change kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ChangeWeights {
	#[serde(default = "default_description_weight")]
	pub description: u32,
	#[serde(default = "default_schema_weight")]
	pub schema: u32,
	#[serde(default = "default_remove_weight")]
	pub remove: u32,
	#[serde(default = "default_add_weight")]
	pub add: u32,
}

fn default_description_weight() -> u32 {
	2
}

fn default_schema_weight() -> u32 {
	3
}

fn default_remove_weight() -> u32 {
	3
}

fn default_add_weight() -> u32 {
	1
}

impl Default for ChangeWeights {
	fn default() -> Self {
		Self {
			description: default_description_weight(),
			schema: default_schema_weight(),
			remove: default_remove_weight(),
			add: default_add_weight(),
		}
	}
}

impl ChangeWeights {
	fn weight_of(&self, kind: ChangeKind) -> u32 {
		match kind {
			ChangeKind::Description => self.description,
			ChangeKind::Schema => self.schema,
			ChangeKind::Remove => self.remove,
			ChangeKind::Add => self.add,
		}
	}
}

fn default_mode_filter() -> Vec<ChangeKind> {
	vec![
		ChangeKind::Description,
		ChangeKind::Schema,
		ChangeKind::Remove,
		ChangeKind::Add,
	]
}

fn default_risk_threshold() -> u32 {
	5
}

/// Configuration for Rug Pull Detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RugPullConfig {
	/// Cumulative change score at which the advertisement is denied
	#[serde(default = "default_risk_threshold")]
	pub risk_threshold: u32,

	/// Risk weight per change kind
	#[serde(default)]
	pub weights: ChangeWeights,

	/// Change kinds that participate in scoring; kinds not listed are
	/// ignored (used for tuning)
	#[serde(default = "default_mode_filter")]
	pub mode_filter: Vec<ChangeKind>,
}

impl Default for RugPullConfig {
	fn default() -> Self {
		Self {
			risk_threshold: default_risk_threshold(),
			weights: ChangeWeights::default(),
			mode_filter: default_mode_filter(),
		}
	}
}

/// A single scored change against the baseline.
#[derive(Debug, Clone)]
struct ToolChange {
	name: String,
	kind: ChangeKind,
	before_fingerprint: Option<String>,
	after_fingerprint: Option<String>,
}

pub struct RugPullDetector {
	config: RugPullConfig,
	store: Arc<GuardStore>,
	host: Arc<dyn Host>,
}

impl RugPullDetector {
	pub fn new(config: RugPullConfig, store: Arc<GuardStore>, host: Arc<dyn Host>) -> Self {
		Self { config, store, host }
	}

	fn scores(&self, kind: ChangeKind) -> bool {
		self.config.mode_filter.contains(&kind)
	}

	/// Classify the differences between baseline and current catalogue.
	fn detect_changes(
		&self,
		baseline: &Baseline,
		current: &HashMap<String, CanonicalTool>,
	) -> Vec<ToolChange> {
		let mut changes = Vec::new();

		for (name, base) in &baseline.tools {
			match current.get(name) {
				None => {
					if self.scores(ChangeKind::Remove) {
						changes.push(ToolChange {
							name: name.clone(),
							kind: ChangeKind::Remove,
							before_fingerprint: Some(base.fingerprint.clone()),
							after_fingerprint: None,
						});
					}
				},
				Some(now) => {
					if self.scores(ChangeKind::Description) && base.description != now.description {
						changes.push(ToolChange {
							name: name.clone(),
							kind: ChangeKind::Description,
							before_fingerprint: Some(base.fingerprint.clone()),
							after_fingerprint: Some(now.fingerprint.clone()),
						});
					}
					if self.scores(ChangeKind::Schema)
						&& base.canonical_schema != now.canonical_schema
					{
						changes.push(ToolChange {
							name: name.clone(),
							kind: ChangeKind::Schema,
							before_fingerprint: Some(base.fingerprint.clone()),
							after_fingerprint: Some(now.fingerprint.clone()),
						});
					}
				},
			}
		}

		if self.scores(ChangeKind::Add) {
			for (name, now) in current {
				if !baseline.tools.contains_key(name) {
					changes.push(ToolChange {
						name: name.clone(),
						kind: ChangeKind::Add,
						before_fingerprint: None,
						after_fingerprint: Some(now.fingerprint.clone()),
					});
				}
			}
		}

		changes
	}

	fn risk_score(&self, changes: &[ToolChange]) -> u32 {
		changes
			.iter()
			.map(|c| self.config.weights.weight_of(c.kind))
			.sum()
	}

	fn change_details(&self, changes: &[ToolChange], score: u32) -> serde_json::Value {
		let entries: Vec<serde_json::Value> = changes
			.iter()
			.map(|c| {
				serde_json::json!({
					"name": c.name,
					"kind": c.kind.as_str(),
					"before_fingerprint": c.before_fingerprint,
					"after_fingerprint": c.after_fingerprint,
					"weight": self.config.weights.weight_of(c.kind),
				})
			})
			.collect();

		serde_json::json!({
			"changes": entries,
			"score": score,
			"threshold": self.config.risk_threshold,
		})
	}
}

impl Guard for RugPullDetector {
	fn evaluate_tools_list(&self, tools: &[Tool], ctx: &GuardContext) -> GuardResult {
		let target = ctx.target();

		let current: HashMap<String, CanonicalTool> = tools
			.iter()
			.map(|tool| (tool.name.clone(), CanonicalTool::from_tool(tool)))
			.collect();

		// First advertisement for this target captures the baseline; the
		// write lock's double-check makes the first writer win under
		// concurrent capture attempts.
		if self.store.with_baseline(target, |_| ()).is_none() {
			let captured = self.store.try_capture_baseline(target, || Baseline {
				captured_at: self.host.get_time(),
				tools: current.clone(),
			});
			if captured {
				self.host.log(
					LogLevel::Info,
					&format!(
						"established rug pull baseline for '{target}' with {} tools",
						tools.len()
					),
				);
				return Ok(Decision::Allow);
			}
			// Lost the capture race: a baseline now exists, diff against it.
		}

		let evaluation = self
			.store
			.with_baseline(target, |baseline| {
				// A pure identity re-advertisement needs no diff work
				let identical = baseline.tools.len() == current.len()
					&& baseline.tools.iter().all(|(name, base)| {
						current
							.get(name)
							.is_some_and(|now| now.fingerprint == base.fingerprint)
					});
				if identical {
					return None;
				}

				let changes = self.detect_changes(baseline, &current);
				let score = self.risk_score(&changes);
				Some((self.change_details(&changes, score), changes.len(), score))
			})
			.unwrap_or(None);

		let Some((details, change_count, score)) = evaluation else {
			return Ok(Decision::Allow);
		};

		self.host.log(
			LogLevel::Info,
			&format!(
				"'{target}' changed {change_count} tool(s) since baseline, score {score} (threshold {})",
				self.config.risk_threshold
			),
		);

		if change_count > 0 && score >= self.config.risk_threshold {
			return Ok(Decision::deny(
				"rug_pull_detected",
				format!(
					"Suspicious tool changes detected for '{target}' (risk score {score} >= threshold {})",
					self.config.risk_threshold
				),
				Some(details),
			));
		}

		// Below threshold: allow, and leave the baseline untouched
		Ok(Decision::Allow)
	}

	fn settings_schema(&self) -> String {
		serde_json::json!({
			"$schema": "https://json-schema.org/draft/2020-12/schema",
			"$id": "mcpguard://guards/rug-pull/v1",
			"title": "Rug Pull Guard",
			"description": "Captures a per-target baseline of the advertised tool catalogue and denies suspicious changes in later advertisements",
			"type": "object",
			"properties": {
				"risk_threshold": {
					"type": "integer",
					"title": "Risk Threshold",
					"description": "Cumulative change score at which the advertisement is denied",
					"default": 5,
					"minimum": 1,
					"x-ui": {"component": "number", "order": 1, "group": "scoring"},
				},
				"weights": {
					"type": "object",
					"title": "Change Weights",
					"description": "Risk weight per change kind",
					"properties": {
						"description": {"type": "integer", "default": 2, "minimum": 0},
						"schema": {"type": "integer", "default": 3, "minimum": 0},
						"remove": {"type": "integer", "default": 3, "minimum": 0},
						"add": {"type": "integer", "default": 1, "minimum": 0},
					},
					"default": {"description": 2, "schema": 3, "remove": 3, "add": 1},
					"x-ui": {
						"component": "object",
						"helpText": "Schema changes and removals are the strongest rug pull signals",
						"order": 2,
						"group": "scoring",
					},
				},
				"mode_filter": {
					"type": "array",
					"title": "Scored Change Kinds",
					"description": "Change kinds that participate in scoring; kinds not listed are ignored",
					"items": {"type": "string", "enum": ["description", "schema", "remove", "add"]},
					"default": ["description", "schema", "remove", "add"],
					"x-ui": {"component": "multi-select", "order": 3, "group": "scoring"},
				},
			},
			"x-ui-groups": {
				"scoring": {"title": "Scoring", "order": 1, "description": "How catalogue changes are weighed"},
			},
			"x-guard-meta": {
				"guardType": "rug_pull",
				"version": "1.0.0",
				"category": "detection",
				"defaultRunsOn": ["tools_list"],
				"icon": "trending-down",
			},
		})
		.to_string()
	}

	fn default_config(&self) -> String {
		serde_json::to_string(&RugPullConfig::default()).unwrap_or_else(|_| "{}".to_string())
	}

	fn reset_server(&self, server_name: &str) {
		if self.store.remove_baseline(server_name) {
			self.host.log(
				LogLevel::Info,
				&format!("reset rug pull baseline for '{server_name}'"),
			);
		}
	}
}
