// Server Spoofing & Whitelisting
//
// Protects against:
// - Fake servers not in the whitelist
// - Typosquatting ("finance-too1s" vs "finance-tools")
// - Tool mimicry (a server copying a trusted server's tool signatures)
// - Tool namespace collisions across servers
//
// Connection-phase checks run against the configured whitelist; the
// tools_list phase compares incoming tool fingerprints against trusted
// fingerprints and the shared tool registry, then records this server's
// catalogue in the registry (last successful advertisement wins).

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::Guard;
use crate::fingerprint::tool_fingerprint;
use crate::host::{Host, LogLevel};
use crate::similarity::{is_single_substitution, levenshtein_ratio, normalize_homoglyphs};
use crate::store::GuardStore;
use crate::{Decision, GuardContext, GuardResult, Tool};

/// An approved server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct WhitelistEntry {
	/// Exact server name to whitelist (matched case-insensitively)
	pub name: String,

	/// Regex matched case-insensitively against the start of the server URL
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url_pattern: Option<String>,

	/// tool_name -> expected fingerprint, used for mimicry detection
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub tool_fingerprints: BTreeMap<String, String>,

	/// Tools this server may advertise; None allows all
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub allowed_tools: Option<Vec<String>>,

	/// Whether the server must present TLS (data for the deployment layer;
	/// probing is not performed here)
	#[serde(default = "default_true")]
	pub required_tls: bool,

	/// Whether the server must sit behind authentication
	#[serde(default = "default_true")]
	pub required_auth: bool,
}

impl WhitelistEntry {
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			url_pattern: None,
			tool_fingerprints: BTreeMap::new(),
			allowed_tools: None,
			required_tls: true,
			required_auth: true,
		}
	}
}

/// Configuration for the Server Spoofing guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ServerSpoofingConfig {
	/// Enable whitelist checking; when disabled, all servers are allowed
	#[serde(default = "default_true")]
	pub whitelist_enabled: bool,

	/// Approved servers
	#[serde(default)]
	pub whitelist: Vec<WhitelistEntry>,

	/// Deny servers not in the whitelist; when disabled they warn instead
	#[serde(default = "default_true")]
	pub block_unknown_servers: bool,

	/// Detect names suspiciously similar to approved servers
	#[serde(default = "default_true")]
	pub typosquat_detection_enabled: bool,

	/// Levenshtein similarity ratio above which a name is a typosquat
	/// candidate
	#[serde(default = "default_similarity_threshold")]
	pub typosquat_similarity_threshold: f64,

	/// Detect tools matching trusted fingerprints or names from other
	/// servers
	#[serde(default = "default_true")]
	pub tool_mimicry_detection_enabled: bool,
}

fn default_true() -> bool {
	true
}

fn default_similarity_threshold() -> f64 {
	0.85
}

impl Default for ServerSpoofingConfig {
	fn default() -> Self {
		Self {
			whitelist_enabled: true,
			whitelist: Vec::new(),
			block_unknown_servers: true,
			typosquat_detection_enabled: true,
			typosquat_similarity_threshold: default_similarity_threshold(),
			tool_mimicry_detection_enabled: true,
		}
	}
}

/// A detected mimicry match.
#[derive(Debug, Clone, Serialize)]
struct MimicryMatch {
	tool_name: String,
	mimics_server: String,
	mimics_tool: String,
	match_type: &'static str,
}

pub struct ServerSpoofingGuard {
	config: ServerSpoofingConfig,
	/// Runtime-mutable copy of the configured whitelist
	whitelist: RwLock<Vec<WhitelistEntry>>,
	store: Arc<GuardStore>,
	host: Arc<dyn Host>,
}

impl ServerSpoofingGuard {
	pub fn new(config: ServerSpoofingConfig, store: Arc<GuardStore>, host: Arc<dyn Host>) -> Self {
		let whitelist = RwLock::new(config.whitelist.clone());
		Self {
			config,
			whitelist,
			store,
			host,
		}
	}

	/// Add a server to the whitelist, replacing any entry with the same
	/// name (case-insensitive).
	pub fn add_to_whitelist(&self, entry: WhitelistEntry) {
		let mut whitelist = self.whitelist.write().expect("whitelist lock poisoned");
		let name_lower = entry.name.to_lowercase();
		whitelist.retain(|e| e.name.to_lowercase() != name_lower);
		whitelist.push(entry);
	}

	/// Remove a server from the whitelist. Returns true if an entry was
	/// removed.
	pub fn remove_from_whitelist(&self, server_name: &str) -> bool {
		let mut whitelist = self.whitelist.write().expect("whitelist lock poisoned");
		let before = whitelist.len();
		let name_lower = server_name.to_lowercase();
		whitelist.retain(|e| e.name.to_lowercase() != name_lower);
		whitelist.len() < before
	}

	fn is_whitelisted(&self, server_name: &str, server_url: Option<&str>) -> bool {
		let whitelist = self.whitelist.read().expect("whitelist lock poisoned");
		let server_lower = server_name.to_lowercase();

		for entry in whitelist.iter() {
			if entry.name.to_lowercase() == server_lower {
				return true;
			}

			if let (Some(url), Some(pattern)) = (server_url, entry.url_pattern.as_deref()) {
				match regex::Regex::new(&format!("(?i){pattern}")) {
					Ok(re) => {
						// Anchored at the start, like a prefix match
						if re.find(url).is_some_and(|m| m.start() == 0) {
							return true;
						}
					},
					Err(_) => {
						self.host.log(
							LogLevel::Warn,
							&format!("invalid url_pattern in whitelist entry '{}'", entry.name),
						);
					},
				}
			}
		}

		false
	}

	/// Find an approved server this name appears to typosquat. A candidate
	/// must clear the similarity threshold and show a concrete typosquat
	/// shape: a single-character substitution or a homoglyph swap.
	fn detect_typosquat(&self, server_name: &str) -> Option<String> {
		let threshold = self.config.typosquat_similarity_threshold;
		let test_name = server_name.to_lowercase();
		let whitelist = self.whitelist.read().expect("whitelist lock poisoned");

		for entry in whitelist.iter() {
			let approved = entry.name.to_lowercase();
			if approved == test_name {
				continue;
			}

			if levenshtein_ratio(&approved, &test_name) < threshold {
				continue;
			}

			let single_substitution = is_single_substitution(&approved, &test_name);
			let homoglyph_swap = normalize_homoglyphs(&approved) == normalize_homoglyphs(&test_name);

			if single_substitution || homoglyph_swap {
				return Some(entry.name.clone());
			}
		}

		None
	}

	/// Compare incoming tools against trusted fingerprints from *other*
	/// whitelist entries: an exact fingerprint match means a copied tool, a
	/// name match with a different implementation is a lookalike.
	fn detect_mimicry(&self, server_name: &str, tools: &[Tool]) -> Vec<MimicryMatch> {
		let server_lower = server_name.to_lowercase();
		let whitelist = self.whitelist.read().expect("whitelist lock poisoned");
		let mut mimicked = Vec::new();

		for tool in tools {
			let fingerprint = tool_fingerprint(tool);
			let tool_lower = tool.name.to_lowercase();

			for entry in whitelist.iter() {
				if entry.name.to_lowercase() == server_lower {
					continue;
				}

				for (trusted_name, trusted_fp) in &entry.tool_fingerprints {
					if *trusted_fp == fingerprint {
						mimicked.push(MimicryMatch {
							tool_name: tool.name.clone(),
							mimics_server: entry.name.clone(),
							mimics_tool: trusted_name.clone(),
							match_type: "exact_fingerprint",
						});
					} else if trusted_name.to_lowercase() == tool_lower {
						mimicked.push(MimicryMatch {
							tool_name: tool.name.clone(),
							mimics_server: entry.name.clone(),
							mimics_tool: trusted_name.clone(),
							match_type: "name_collision",
						});
					}
				}
			}
		}

		mimicked
	}
}

impl Guard for ServerSpoofingGuard {
	fn evaluate_server_connection(&self, ctx: &GuardContext) -> GuardResult {
		let server_name = &ctx.server_name;

		if !self.config.whitelist_enabled {
			return Ok(Decision::Allow);
		}

		if self.is_whitelisted(server_name, ctx.server_url.as_deref()) {
			self.host.log(
				LogLevel::Debug,
				&format!("server '{server_name}' is whitelisted"),
			);
			return Ok(Decision::Allow);
		}

		if self.config.typosquat_detection_enabled {
			if let Some(similar_to) = self.detect_typosquat(server_name) {
				self.host.log(
					LogLevel::Warn,
					&format!("typosquat detected: '{server_name}' similar to '{similar_to}'"),
				);
				return Ok(Decision::deny(
					"typosquat_detected",
					format!(
						"Server '{server_name}' appears to be typosquatting approved server '{similar_to}'"
					),
					Some(serde_json::json!({
						"detected_name": server_name,
						"similar_to": similar_to,
						"attack_type": "typosquatting",
					})),
				));
			}
		}

		if self.config.block_unknown_servers {
			self.host.log(
				LogLevel::Warn,
				&format!("blocking unknown server: {server_name}"),
			);
			return Ok(Decision::deny(
				"server_not_whitelisted",
				format!("Server '{server_name}' is not in the approved server registry"),
				Some(serde_json::json!({
					"server_name": server_name,
					"server_url": ctx.server_url,
					"action": "Add server to whitelist if this is a legitimate server",
				})),
			));
		}

		Ok(Decision::Warn(vec![format!(
			"Server '{server_name}' is not in whitelist"
		)]))
	}

	fn evaluate_tools_list(&self, tools: &[Tool], ctx: &GuardContext) -> GuardResult {
		let server_name = &ctx.server_name;

		if self.config.tool_mimicry_detection_enabled {
			let mimicked = self.detect_mimicry(server_name, tools);
			if !mimicked.is_empty() {
				let match_type = mimicked[0].match_type;
				return Ok(Decision::deny(
					"tool_mimicry_detected",
					format!("Server '{server_name}' contains tools that mimic trusted server tools"),
					Some(serde_json::json!({
						"server_name": server_name,
						"mimicked_tools": mimicked,
						"match_type": match_type,
						"attack_type": "tool_mimicry",
					})),
				));
			}
		}

		let tool_names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
		let collisions = self.store.find_collisions(server_name, &tool_names);
		if !collisions.is_empty() {
			let collision_details: Vec<serde_json::Value> = collisions
				.iter()
				.map(|c| {
					serde_json::json!({
						"tool_name": c.tool_name,
						"this_server": c.this_server,
						"other_server": c.other_server,
					})
				})
				.collect();
			return Ok(Decision::deny(
				"tool_namespace_collision",
				format!("Server '{server_name}' has tools that collide with other servers"),
				Some(serde_json::json!({
					"collisions": collision_details,
					"recommendation": "Use namespaced tool names (e.g. server_name.tool_name)",
				})),
			));
		}

		let fingerprints: HashMap<String, String> = tools
			.iter()
			.map(|tool| (tool.name.clone(), tool_fingerprint(tool)))
			.collect();
		self.store.register_tools(server_name, fingerprints);
		self.host.log(
			LogLevel::Debug,
			&format!("registered {} tools for server '{server_name}'", tools.len()),
		);

		Ok(Decision::Allow)
	}

	fn settings_schema(&self) -> String {
		serde_json::json!({
			"$schema": "https://json-schema.org/draft/2020-12/schema",
			"$id": "mcpguard://guards/server-spoofing/v1",
			"title": "Server Spoofing Guard",
			"description": "Detects and blocks server spoofing attacks including fake servers, typosquatting, and tool mimicry",
			"type": "object",
			"properties": {
				"whitelist_enabled": {
					"type": "boolean",
					"title": "Enable Whitelist",
					"description": "Enable server whitelist checking. When disabled, all servers are allowed.",
					"default": true,
					"x-ui": {"component": "checkbox", "order": 1, "group": "whitelist"},
				},
				"whitelist": {
					"type": "array",
					"title": "Approved Servers",
					"description": "List of approved MCP servers with optional URL patterns and tool fingerprints",
					"default": [],
					"items": {
						"type": "object",
						"properties": {
							"name": {
								"type": "string",
								"title": "Server Name",
								"description": "Exact server name to whitelist",
							},
							"url_pattern": {
								"type": "string",
								"title": "URL Pattern",
								"description": "Regex pattern to match server URL (optional)",
								"format": "regex",
							},
							"tool_fingerprints": {
								"type": "object",
								"title": "Tool Fingerprints",
								"description": "Map of tool name to expected fingerprint hash for mimicry detection",
								"additionalProperties": {"type": "string"},
							},
							"allowed_tools": {
								"type": "array",
								"title": "Allowed Tools",
								"description": "Tools this server may advertise; omit to allow all",
								"items": {"type": "string"},
							},
							"required_tls": {"type": "boolean", "title": "Require TLS", "default": true},
							"required_auth": {"type": "boolean", "title": "Require Auth", "default": true},
						},
						"required": ["name"],
					},
					"x-ui": {
						"component": "object-array",
						"placeholder": "Add approved server",
						"helpText": "Each entry defines an approved server. Tool fingerprints are used for mimicry detection.",
						"order": 2,
						"group": "whitelist",
					},
				},
				"block_unknown_servers": {
					"type": "boolean",
					"title": "Block Unknown Servers",
					"description": "Deny connections from servers not in the whitelist. When disabled, unknown servers generate warnings instead.",
					"default": true,
					"x-ui": {
						"component": "checkbox",
						"helpText": "If disabled, unrecognized servers will be allowed with a warning",
						"order": 3,
						"group": "whitelist",
					},
				},
				"typosquat_detection_enabled": {
					"type": "boolean",
					"title": "Enable Typosquat Detection",
					"description": "Detect server names that are suspiciously similar to approved servers (e.g. 'finance-too1s' vs 'finance-tools')",
					"default": true,
					"x-ui": {"component": "checkbox", "order": 4, "group": "typosquat"},
				},
				"typosquat_similarity_threshold": {
					"type": "number",
					"title": "Similarity Threshold",
					"description": "Levenshtein similarity ratio (0.0-1.0) above which a server name is flagged as a potential typosquat. Higher values are stricter.",
					"default": 0.85,
					"minimum": 0.0,
					"maximum": 1.0,
					"x-ui": {
						"component": "slider",
						"helpText": "0.85 means names must be 85% similar to trigger detection. Lower values catch more but may produce false positives.",
						"order": 5,
						"group": "typosquat",
					},
				},
				"tool_mimicry_detection_enabled": {
					"type": "boolean",
					"title": "Enable Tool Mimicry Detection",
					"description": "Detect when an untrusted server provides tools that match fingerprints or names of tools from trusted servers",
					"default": true,
					"x-ui": {
						"component": "checkbox",
						"helpText": "Compares tool fingerprints (SHA-256 of name+description+schema) and tool names across servers",
						"order": 6,
						"group": "mimicry",
					},
				},
			},
			"x-ui-groups": {
				"whitelist": {
					"title": "Server Whitelist",
					"order": 1,
					"description": "Control which MCP servers are allowed to connect",
				},
				"typosquat": {
					"title": "Typosquat Detection",
					"order": 2,
					"description": "Detect servers with names similar to approved servers",
				},
				"mimicry": {
					"title": "Tool Mimicry Detection",
					"order": 3,
					"description": "Detect tools that impersonate tools from trusted servers",
				},
			},
			"x-guard-meta": {
				"guardType": "server_spoofing",
				"version": "1.0.0",
				"category": "detection",
				"defaultRunsOn": ["connection", "tools_list"],
				"icon": "shield-alert",
			},
		})
		.to_string()
	}

	fn default_config(&self) -> String {
		serde_json::to_string(&ServerSpoofingConfig::default())
			.unwrap_or_else(|_| "{}".to_string())
	}

	fn reset_server(&self, server_name: &str) {
		self.store.remove_server_tools(server_name);
		self.host.log(
			LogLevel::Debug,
			&format!("cleared registered tools for server '{server_name}'"),
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;
	use crate::host::TracingHost;

	fn guard_with(config: ServerSpoofingConfig) -> ServerSpoofingGuard {
		ServerSpoofingGuard::new(config, Arc::new(GuardStore::new()), Arc::new(TracingHost::new()))
	}

	fn whitelisted(names: &[&str]) -> ServerSpoofingConfig {
		ServerSpoofingConfig {
			whitelist: names.iter().map(|n| WhitelistEntry::named(*n)).collect(),
			..Default::default()
		}
	}

	#[test]
	fn test_whitelisted_server_allowed() {
		let guard = guard_with(whitelisted(&["finance-tools"]));
		let ctx = GuardContext::new("finance-tools");
		assert_matches!(guard.evaluate_server_connection(&ctx), Ok(Decision::Allow));

		// Name matching is case-insensitive
		let ctx = GuardContext::new("Finance-Tools");
		assert_matches!(guard.evaluate_server_connection(&ctx), Ok(Decision::Allow));
	}

	#[test]
	fn test_url_pattern_match_allows() {
		let mut config = whitelisted(&[]);
		config.whitelist.push(WhitelistEntry {
			url_pattern: Some(r"https://tools\.internal\.example\.com/.*".to_string()),
			..WhitelistEntry::named("internal-tools")
		});
		let guard = guard_with(config);

		let ctx = GuardContext::new("some-other-name")
			.with_url("https://tools.internal.example.com/mcp");
		assert_matches!(guard.evaluate_server_connection(&ctx), Ok(Decision::Allow));

		// Pattern is anchored at the start of the URL
		let ctx = GuardContext::new("some-other-name")
			.with_url("https://evil.example.com/?https://tools.internal.example.com/");
		assert_matches!(guard.evaluate_server_connection(&ctx), Ok(Decision::Deny(_)));
	}

	#[test]
	fn test_typosquat_single_substitution_denied() {
		let guard = guard_with(whitelisted(&["finance-tools"]));
		let ctx = GuardContext::new("finance-too1s");

		let decision = guard.evaluate_server_connection(&ctx).unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "typosquat_detected");
			let details = reason.details.unwrap();
			assert_eq!(details["similar_to"], "finance-tools");
			assert_eq!(details["detected_name"], "finance-too1s");
			assert_eq!(details["attack_type"], "typosquatting");
		});
	}

	#[test]
	fn test_typosquat_homoglyph_denied() {
		let guard = guard_with(whitelisted(&["hr-platform"]));
		// '@' for 'a': same length, homoglyph normalization makes them equal
		let ctx = GuardContext::new("hr-pl@tform");

		let decision = guard.evaluate_server_connection(&ctx).unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "typosquat_detected");
		});
	}

	#[test]
	fn test_dissimilar_unknown_server_blocked_not_typosquat() {
		let guard = guard_with(whitelisted(&["finance-tools"]));
		let ctx = GuardContext::new("weather-service");

		let decision = guard.evaluate_server_connection(&ctx).unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "server_not_whitelisted");
		});
	}

	#[test]
	fn test_unknown_server_warns_when_blocking_disabled() {
		let config = ServerSpoofingConfig {
			block_unknown_servers: false,
			..whitelisted(&["finance-tools"])
		};
		let guard = guard_with(config);
		let ctx = GuardContext::new("weather-service");

		let decision = guard.evaluate_server_connection(&ctx).unwrap();
		assert_matches!(decision, Decision::Warn(messages) => {
			assert_eq!(messages.len(), 1);
			assert!(messages[0].contains("weather-service"));
		});
	}

	#[test]
	fn test_whitelist_disabled_allows_anything() {
		let config = ServerSpoofingConfig {
			whitelist_enabled: false,
			..whitelisted(&["finance-tools"])
		};
		let guard = guard_with(config);
		let ctx = GuardContext::new("finance-too1s");
		assert_matches!(guard.evaluate_server_connection(&ctx), Ok(Decision::Allow));
	}

	#[test]
	fn test_typosquat_disabled_falls_through_to_block() {
		let config = ServerSpoofingConfig {
			typosquat_detection_enabled: false,
			..whitelisted(&["finance-tools"])
		};
		let guard = guard_with(config);
		let ctx = GuardContext::new("finance-too1s");

		let decision = guard.evaluate_server_connection(&ctx).unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "server_not_whitelisted");
		});
	}

	#[test]
	fn test_mimicry_exact_fingerprint_denied() {
		let trusted_tool = Tool::new(
			"calc_invoice",
			Some("Compute an invoice total"),
			r#"{"type": "object"}"#,
		);
		let trusted_fp = tool_fingerprint(&trusted_tool);

		let mut config = whitelisted(&["hr-tools"]);
		config.whitelist[0]
			.tool_fingerprints
			.insert("calc_invoice".to_string(), trusted_fp);
		let guard = guard_with(config);

		// An unwhitelisted server advertises a byte-identical tool
		let ctx = GuardContext::new("shady-server");
		let decision = guard.evaluate_tools_list(&[trusted_tool], &ctx).unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "tool_mimicry_detected");
			let details = reason.details.unwrap();
			assert_eq!(details["match_type"], "exact_fingerprint");
			assert_eq!(details["mimicked_tools"][0]["mimics_server"], "hr-tools");
		});
	}

	#[test]
	fn test_mimicry_name_collision_denied() {
		let mut config = whitelisted(&["hr-tools"]);
		config.whitelist[0]
			.tool_fingerprints
			.insert("calc_invoice".to_string(), "0".repeat(32));
		let guard = guard_with(config);

		// Same name, different implementation
		let lookalike = Tool::new("Calc_Invoice", Some("Totally different"), "{}");
		let ctx = GuardContext::new("shady-server");
		let decision = guard.evaluate_tools_list(&[lookalike], &ctx).unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "tool_mimicry_detected");
			let details = reason.details.unwrap();
			assert_eq!(details["match_type"], "name_collision");
		});
	}

	#[test]
	fn test_mimicry_ignores_own_whitelist_entry() {
		let trusted_tool = Tool::new("calc_invoice", Some("Compute"), "{}");
		let mut config = whitelisted(&["hr-tools"]);
		config.whitelist[0]
			.tool_fingerprints
			.insert("calc_invoice".to_string(), tool_fingerprint(&trusted_tool));
		let guard = guard_with(config);

		// hr-tools advertising its own fingerprinted tool is fine
		let ctx = GuardContext::new("hr-tools");
		assert_matches!(
			guard.evaluate_tools_list(&[trusted_tool], &ctx),
			Ok(Decision::Allow)
		);
	}

	#[test]
	fn test_namespace_collision_denied() {
		let store = Arc::new(GuardStore::new());
		let guard = ServerSpoofingGuard::new(
			ServerSpoofingConfig::default(),
			store.clone(),
			Arc::new(TracingHost::new()),
		);

		// server-a registers first
		let ctx_a = GuardContext::new("server-a");
		let shared = Tool::new("shared_tool", Some("A"), "{}");
		assert_matches!(guard.evaluate_tools_list(&[shared], &ctx_a), Ok(Decision::Allow));

		// server-b advertises the same tool name
		let ctx_b = GuardContext::new("server-b");
		let imposter = Tool::new("shared_tool", Some("B"), "{}");
		let decision = guard.evaluate_tools_list(&[imposter], &ctx_b).unwrap();
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "tool_namespace_collision");
			let details = reason.details.unwrap();
			assert_eq!(details["collisions"][0]["tool_name"], "shared_tool");
			assert_eq!(details["collisions"][0]["other_server"], "server-a");
		});
	}

	#[test]
	fn test_reregistration_same_server_is_not_collision() {
		let guard = guard_with(ServerSpoofingConfig::default());
		let ctx = GuardContext::new("server-a");
		let tool = Tool::new("my_tool", Some("v1"), "{}");
		assert_matches!(guard.evaluate_tools_list(&[tool], &ctx), Ok(Decision::Allow));

		let tool_v2 = Tool::new("my_tool", Some("v2"), "{}");
		assert_matches!(guard.evaluate_tools_list(&[tool_v2], &ctx), Ok(Decision::Allow));
	}

	#[test]
	fn test_reset_server_clears_registry() {
		let guard = guard_with(ServerSpoofingConfig::default());
		let ctx_a = GuardContext::new("server-a");
		let tool = Tool::new("shared_tool", Some("A"), "{}");
		guard.evaluate_tools_list(&[tool], &ctx_a).unwrap();

		guard.reset_server("server-a");

		// After the reset, server-b can claim the name
		let ctx_b = GuardContext::new("server-b");
		let tool_b = Tool::new("shared_tool", Some("B"), "{}");
		assert_matches!(guard.evaluate_tools_list(&[tool_b], &ctx_b), Ok(Decision::Allow));
	}

	#[test]
	fn test_whitelist_add_remove() {
		let guard = guard_with(whitelisted(&[]));
		let ctx = GuardContext::new("late-addition");
		assert_matches!(guard.evaluate_server_connection(&ctx), Ok(Decision::Deny(_)));

		guard.add_to_whitelist(WhitelistEntry::named("late-addition"));
		assert_matches!(guard.evaluate_server_connection(&ctx), Ok(Decision::Allow));

		assert!(guard.remove_from_whitelist("LATE-ADDITION"));
		assert!(!guard.remove_from_whitelist("late-addition"));
		assert_matches!(guard.evaluate_server_connection(&ctx), Ok(Decision::Deny(_)));
	}

	#[test]
	fn test_config_deserialization() {
		let yaml = r#"
whitelist_enabled: true
whitelist:
  - name: finance-tools
    url_pattern: "https://finance\\..*"
    tool_fingerprints:
      calc_invoice: abc123
block_unknown_servers: true
typosquat_detection_enabled: true
typosquat_similarity_threshold: 0.9
tool_mimicry_detection_enabled: false
"#;
		let config: ServerSpoofingConfig = serde_yaml::from_str(yaml).unwrap();
		assert_eq!(config.whitelist.len(), 1);
		assert_eq!(config.whitelist[0].name, "finance-tools");
		assert_eq!(config.typosquat_similarity_threshold, 0.9);
		assert!(!config.tool_mimicry_detection_enabled);
		assert!(config.whitelist[0].required_tls);
	}
}
