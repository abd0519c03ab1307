// MCP Security Guards
//
// A pluggable security guard suite for MCP (Model Context Protocol) gateways.
// Guards inspect structured records at three phases of an MCP session and
// return a ternary decision: allow, warn, or deny with a structured reason.
//
// Phases:
// - connection: a new MCP server is attached (server spoofing)
// - tools_list: a server advertises its tool catalogue (tool poisoning,
//   rug pull, tool mimicry)
// - tool_response: a tool call response flows back to the client (PII)
//
// The gateway is out of scope: transport framing, JSON-RPC routing and
// session multiplexing happen elsewhere. Guards only see `Tool` and
// `GuardContext` records and produce `Decision` values.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

pub mod fingerprint;
pub mod guards;
pub mod host;
pub mod pii;
pub mod similarity;
pub mod store;

pub use guards::pii_guard::{PiiAction, PiiGuard, PiiGuardConfig};
pub use guards::rug_pull::{ChangeKind, ChangeWeights, RugPullConfig, RugPullDetector};
pub use guards::server_spoofing::{ServerSpoofingConfig, ServerSpoofingGuard, WhitelistEntry};
pub use guards::tool_poisoning::{ToolPoisoningConfig, ToolPoisoningDetector};
pub use guards::Guard;
pub use host::{Host, LogLevel, TracingHost};
pub use store::GuardStore;

/// An advertised MCP tool as seen by guards.
///
/// `input_schema` is the JSON Schema fragment serialized as a string; guards
/// canonicalize it (key-sorted, whitespace-normalized) before comparison or
/// fingerprinting, so two advertisements of the same schema with different
/// formatting are structurally equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Tool {
	/// ASCII identifier, at most 128 characters
	pub name: String,

	/// Free-text description shown to the agent
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,

	/// JSON Schema fragment for the tool's arguments, as a string
	#[serde(default = "default_input_schema")]
	pub input_schema: String,
}

fn default_input_schema() -> String {
	"{}".to_string()
}

impl Tool {
	pub fn new(
		name: impl Into<String>,
		description: Option<&str>,
		input_schema: impl Into<String>,
	) -> Self {
		Self {
			name: name.into(),
			description: description.map(|s| s.to_string()),
			input_schema: input_schema.into(),
		}
	}
}

/// Context provided to guards for evaluation. Immutable for the duration of
/// a guard call.
#[derive(Debug, Clone)]
pub struct GuardContext {
	/// Stable identifier of the upstream MCP server within this deployment
	pub server_name: String,

	/// URL the gateway uses to reach the server, when known
	pub server_url: Option<String>,

	/// Authenticated principal, if any
	pub identity: Option<String>,

	/// Free-form metadata supplied by the gateway
	pub metadata: serde_json::Value,
}

impl GuardContext {
	pub fn new(server_name: impl Into<String>) -> Self {
		Self {
			server_name: server_name.into(),
			server_url: None,
			identity: None,
			metadata: serde_json::json!({}),
		}
	}

	pub fn with_url(mut self, url: impl Into<String>) -> Self {
		self.server_url = Some(url.into());
		self
	}

	/// The logical target identifier used for per-target guard state.
	///
	/// The gateway may expose one server under several routes; when it does,
	/// it supplies `metadata["target"]` and stateful guards key off that
	/// instead of the server name.
	pub fn target(&self) -> &str {
		self
			.metadata
			.get("target")
			.and_then(|v| v.as_str())
			.unwrap_or(&self.server_name)
	}
}

/// Decision made by a security guard. Every evaluation terminates with
/// exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
	/// Allow the operation to proceed
	Allow,

	/// Allow, but surface advisory messages to the caller
	Warn(Vec<String>),

	/// Block the operation
	Deny(DenyReason),
}

impl Decision {
	pub fn deny(
		code: impl Into<String>,
		message: impl Into<String>,
		details: Option<serde_json::Value>,
	) -> Self {
		Decision::Deny(DenyReason {
			code: code.into(),
			message: message.into(),
			details,
		})
	}

	pub fn is_allow(&self) -> bool {
		matches!(self, Decision::Allow)
	}
}

/// Reason for denying an operation. `code` values are stable and part of
/// the wire contract:
/// `server_not_whitelisted`, `typosquat_detected`, `tool_mimicry_detected`,
/// `tool_namespace_collision`, `tool_poisoning_detected`,
/// `rug_pull_detected`, `pii_detected`, `guard_internal_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyReason {
	/// Short snake_case reason code
	pub code: String,

	/// Human-readable message
	pub message: String,

	/// Optional details for debugging/auditing
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Errors that can occur inside a guard. These never cross the host
/// boundary: the executor converts them into a fail-closed deny with code
/// `guard_internal_error`.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
	#[error("guard execution error: {0}")]
	ExecutionError(String),

	#[error("guard configuration error: {0}")]
	ConfigError(String),
}

/// Result of a single guard evaluation
pub type GuardResult = Result<Decision, GuardError>;

/// Execution phase for guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum GuardPhase {
	/// A new MCP server is being attached
	Connection,

	/// The server advertised its tool catalogue
	ToolsList,

	/// A tool call response is returned to the client
	ToolResponse,
}

/// A configured guard instance as provided by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SecurityGuard {
	/// Unique identifier for this guard
	pub id: String,

	/// Human-readable description
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,

	/// Execution priority (lower = runs first)
	#[serde(default = "default_priority")]
	pub priority: u32,

	/// Phases this guard runs on. Empty means the guard kind's defaults.
	#[serde(default)]
	pub runs_on: Vec<GuardPhase>,

	/// Whether the guard is enabled
	#[serde(default = "default_enabled")]
	pub enabled: bool,

	/// The specific guard implementation
	#[serde(flatten)]
	pub kind: GuardKind,
}

fn default_priority() -> u32 {
	100
}

fn default_enabled() -> bool {
	true
}

/// Guard implementation types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardKind {
	/// Server whitelist, typosquat and tool mimicry detection
	ServerSpoofing(ServerSpoofingConfig),

	/// Embedded-instruction scanning of advertised tools
	ToolPoisoning(ToolPoisoningConfig),

	/// Baseline + diff detection of hostile catalogue changes
	RugPull(RugPullConfig),

	/// PII detection and masking in tool responses
	Pii(PiiGuardConfig),
}

impl GuardKind {
	/// Phases a guard of this kind runs on when the config does not say
	/// otherwise. Mirrors each guard's `x-guard-meta.defaultRunsOn`.
	pub fn default_phases(&self) -> &'static [GuardPhase] {
		match self {
			GuardKind::ServerSpoofing(_) => &[GuardPhase::Connection, GuardPhase::ToolsList],
			GuardKind::ToolPoisoning(_) => &[GuardPhase::ToolsList],
			GuardKind::RugPull(_) => &[GuardPhase::ToolsList],
			GuardKind::Pii(_) => &[GuardPhase::ToolResponse],
		}
	}
}

/// Settings schema and default config exported by a guard, consumed by the
/// control plane to render configuration UI without guard-specific code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardSchema {
	/// JSON Schema 2020-12 describing the guard's configurable parameters
	pub settings_schema: serde_json::Value,
	/// Default configuration values
	pub default_config: serde_json::Value,
}

struct InitializedGuard {
	id: String,
	priority: u32,
	runs_on: Vec<GuardPhase>,
	guard: Arc<dyn Guard>,
}

impl InitializedGuard {
	fn handles(&self, phase: GuardPhase) -> bool {
		self.runs_on.contains(&phase)
	}
}

/// Initialize guards from config (shared between `new()` and `update()`)
fn initialize_guards(
	configs: Vec<SecurityGuard>,
	store: &Arc<GuardStore>,
	host: &Arc<dyn Host>,
) -> Result<Vec<InitializedGuard>, GuardError> {
	let mut guards = Vec::new();

	for config in configs {
		if !config.enabled {
			host.log(
				LogLevel::Debug,
				&format!("guard '{}' disabled, skipping", config.id),
			);
			continue;
		}

		let guard: Arc<dyn Guard> = match &config.kind {
			GuardKind::ServerSpoofing(cfg) => Arc::new(ServerSpoofingGuard::new(
				cfg.clone(),
				store.clone(),
				host.clone(),
			)),
			GuardKind::ToolPoisoning(cfg) => {
				Arc::new(ToolPoisoningDetector::new(cfg.clone(), host.clone())?)
			},
			GuardKind::RugPull(cfg) => {
				Arc::new(RugPullDetector::new(cfg.clone(), store.clone(), host.clone()))
			},
			GuardKind::Pii(cfg) => Arc::new(PiiGuard::new(cfg.clone(), host.clone())),
		};

		let runs_on = if config.runs_on.is_empty() {
			config.kind.default_phases().to_vec()
		} else {
			config.runs_on.clone()
		};

		guards.push(InitializedGuard {
			id: config.id,
			priority: config.priority,
			runs_on,
			guard,
		});
	}

	// Lower priority runs first
	guards.sort_by_key(|g| g.priority);

	Ok(guards)
}

/// Executor that runs registered guards at each phase.
///
/// Guards are independent: the first deny short-circuits the phase, warn
/// messages accumulate across guards into a single warn result, and an
/// internal guard failure is converted into a fail-closed deny with code
/// `guard_internal_error` (never an allow).
#[derive(Clone)]
pub struct GuardExecutor {
	/// Guards are stored behind a lock to support atomic config hot-reload
	guards: Arc<RwLock<Vec<InitializedGuard>>>,
	store: Arc<GuardStore>,
	host: Arc<dyn Host>,
}

impl GuardExecutor {
	/// Create an executor from a list of guard configurations.
	pub fn new(configs: Vec<SecurityGuard>, host: Arc<dyn Host>) -> Result<Self, GuardError> {
		let store = Arc::new(GuardStore::new());
		let guards = initialize_guards(configs, &store, &host)?;
		Ok(Self {
			guards: Arc::new(RwLock::new(guards)),
			store,
			host,
		})
	}

	/// Create an executor with no guards.
	pub fn empty(host: Arc<dyn Host>) -> Self {
		Self {
			guards: Arc::new(RwLock::new(Vec::new())),
			store: Arc::new(GuardStore::new()),
			host,
		}
	}

	/// Create an executor from the host-provided `"guards"` config key.
	///
	/// A missing or unparsable document falls back to an empty guard list
	/// with an error log; config failures never block traffic silently.
	pub fn from_host_config(host: Arc<dyn Host>) -> Self {
		let raw = host.get_config("guards");
		if raw.is_empty() {
			return Self::empty(host);
		}
		match serde_json::from_str::<Vec<SecurityGuard>>(&raw) {
			Ok(configs) => match Self::new(configs, host.clone()) {
				Ok(executor) => executor,
				Err(e) => {
					host.log(
						LogLevel::Error,
						&format!("failed to initialize guards from host config: {e}"),
					);
					Self::empty(host)
				},
			},
			Err(e) => {
				host.log(
					LogLevel::Error,
					&format!("failed to parse guard config, running without guards: {e}"),
				);
				Self::empty(host)
			},
		}
	}

	/// Returns true if any guards are configured
	pub fn has_guards(&self) -> bool {
		let guards = self.guards.read().expect("guards lock poisoned");
		!guards.is_empty()
	}

	/// Replace all guards atomically with a new configuration (hot-reload).
	pub fn update(&self, configs: Vec<SecurityGuard>) -> Result<(), GuardError> {
		let new_guards = initialize_guards(configs, &self.store, &self.host)?;
		let mut guards = self.guards.write().expect("guards lock poisoned");
		*guards = new_guards;
		self.host.log(LogLevel::Info, "security guards updated");
		Ok(())
	}

	/// Register an externally-built guard (e.g. a sandboxed guest) for the
	/// given phases. It participates in phase evaluation like any built-in
	/// guard, including the fail-closed conversion of internal errors.
	pub fn register_custom(
		&self,
		id: impl Into<String>,
		priority: u32,
		runs_on: Vec<GuardPhase>,
		guard: Arc<dyn Guard>,
	) {
		let mut guards = self.guards.write().expect("guards lock poisoned");
		guards.push(InitializedGuard {
			id: id.into(),
			priority,
			runs_on,
			guard,
		});
		guards.sort_by_key(|g| g.priority);
	}

	/// Run guards at the `connection` phase.
	pub fn evaluate_server_connection(&self, ctx: &GuardContext) -> Decision {
		self.run_phase(GuardPhase::Connection, |guard| {
			guard.evaluate_server_connection(ctx)
		})
	}

	/// Run guards at the `tools_list` phase.
	pub fn evaluate_tools_list(&self, tools: &[Tool], ctx: &GuardContext) -> Decision {
		self.run_phase(GuardPhase::ToolsList, |guard| {
			guard.evaluate_tools_list(tools, ctx)
		})
	}

	/// Run guards at the `tool_response` phase.
	///
	/// Mitigation guards (PII in mask mode) rewrite `payload` in place and
	/// return `Allow`; the gateway forwards the rewritten payload.
	pub fn evaluate_tool_response(
		&self,
		tool_name: &str,
		payload: &mut serde_json::Value,
		ctx: &GuardContext,
	) -> Decision {
		self.run_phase(GuardPhase::ToolResponse, |guard| {
			guard.evaluate_tool_response(tool_name, payload, ctx)
		})
	}

	fn run_phase<F>(&self, phase: GuardPhase, mut eval: F) -> Decision
	where
		F: FnMut(&dyn Guard) -> GuardResult,
	{
		let guards = self.guards.read().expect("guards lock poisoned");
		let mut warnings: Vec<String> = Vec::new();

		for entry in guards.iter() {
			if !entry.handles(phase) {
				continue;
			}

			let result = panic::catch_unwind(AssertUnwindSafe(|| eval(entry.guard.as_ref())))
				.unwrap_or_else(|_| {
					Err(GuardError::ExecutionError("guard panicked during evaluation".to_string()))
				});

			match result {
				Ok(Decision::Allow) => {},
				Ok(Decision::Warn(mut messages)) => warnings.append(&mut messages),
				Ok(deny @ Decision::Deny(_)) => return deny,
				Err(e) => {
					self.host.log(
						LogLevel::Error,
						&format!("guard '{}' failed: {e}", entry.id),
					);
					return Decision::deny(
						"guard_internal_error",
						format!("guard '{}' failed during evaluation", entry.id),
						Some(serde_json::json!({
							"guard": entry.id,
							"error": e.to_string(),
						})),
					);
				},
			}
		}

		if warnings.is_empty() {
			Decision::Allow
		} else {
			Decision::Warn(warnings)
		}
	}

	/// Collect every guard's settings schema and default config, keyed by
	/// guard id. Used by the control plane to render configuration forms.
	pub fn guard_schemas(&self) -> Vec<(String, GuardSchema)> {
		let guards = self.guards.read().expect("guards lock poisoned");
		guards
			.iter()
			.map(|entry| {
				let settings_schema = serde_json::from_str(&entry.guard.settings_schema())
					.unwrap_or(serde_json::Value::Null);
				let default_config = serde_json::from_str(&entry.guard.default_config())
					.unwrap_or(serde_json::Value::Null);
				(
					entry.id.clone(),
					GuardSchema {
						settings_schema,
						default_config,
					},
				)
			})
			.collect()
	}

	/// Wipe per-target state (tool registry entry, rug pull baseline) for a
	/// server. Called by the gateway on session re-initialization.
	pub fn reset_server(&self, server_name: &str) {
		let guards = self.guards.read().expect("guards lock poisoned");
		for entry in guards.iter() {
			entry.guard.reset_server(server_name);
		}
		self.host.log(
			LogLevel::Debug,
			&format!("reset state for server '{server_name}' across {} guards", guards.len()),
		);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_matches::assert_matches;

	fn test_host() -> Arc<dyn Host> {
		Arc::new(TracingHost::new())
	}

	#[test]
	fn test_guard_deserialization() {
		let yaml = r#"
id: test-guard
priority: 100
runs_on:
  - tools_list
type: tool_poisoning
risk_threshold: 5
"#;

		let guard: SecurityGuard = serde_yaml::from_str(yaml).unwrap();
		assert_eq!(guard.id, "test-guard");
		assert_eq!(guard.priority, 100);
		assert_eq!(guard.runs_on, vec![GuardPhase::ToolsList]);
		assert!(matches!(guard.kind, GuardKind::ToolPoisoning(_)));
	}

	#[test]
	fn test_pii_guard_deserialization() {
		let yaml = r#"
id: pii-guard
priority: 50
type: pii
mode: reject
recognisers_enabled:
  - email
  - credit_card
"#;

		let guard: SecurityGuard = serde_yaml::from_str(yaml).unwrap();
		assert_eq!(guard.id, "pii-guard");
		// No runs_on in config: falls back to the kind's defaults
		assert!(guard.runs_on.is_empty());
		match &guard.kind {
			GuardKind::Pii(config) => {
				assert_eq!(config.recognisers_enabled.len(), 2);
				assert_eq!(config.mode, PiiAction::Reject);
			},
			other => panic!("expected pii guard kind, got {other:?}"),
		}
		assert_eq!(guard.kind.default_phases(), &[GuardPhase::ToolResponse]);
	}

	#[test]
	fn test_empty_executor_allows_everything() {
		let executor = GuardExecutor::empty(test_host());
		let ctx = GuardContext::new("any-server");

		assert!(!executor.has_guards());
		assert_matches!(executor.evaluate_server_connection(&ctx), Decision::Allow);
		assert_matches!(executor.evaluate_tools_list(&[], &ctx), Decision::Allow);
		let mut payload = serde_json::json!({"ok": true});
		assert_matches!(
			executor.evaluate_tool_response("t", &mut payload, &ctx),
			Decision::Allow
		);
	}

	#[test]
	fn test_from_host_config_bad_json_falls_back_to_empty() {
		let host = Arc::new(TracingHost::new());
		host.set_config("guards", "{not json");
		let executor = GuardExecutor::from_host_config(host);
		assert!(!executor.has_guards());
	}

	#[test]
	fn test_from_host_config_parses_guard_list() {
		let host = Arc::new(TracingHost::new());
		host.set_config(
			"guards",
			r#"[{"id": "poison", "type": "tool_poisoning"}]"#,
		);
		let executor = GuardExecutor::from_host_config(host);
		assert!(executor.has_guards());
	}

	#[test]
	fn test_deny_short_circuits_phase() {
		let host = test_host();
		let configs = vec![
			SecurityGuard {
				id: "spoofing".to_string(),
				description: None,
				priority: 10,
				runs_on: vec![],
				enabled: true,
				kind: GuardKind::ServerSpoofing(ServerSpoofingConfig::default()),
			},
			SecurityGuard {
				id: "poison".to_string(),
				description: None,
				priority: 20,
				runs_on: vec![],
				enabled: true,
				kind: GuardKind::ToolPoisoning(ToolPoisoningConfig::default()),
			},
		];
		let executor = GuardExecutor::new(configs, host).unwrap();
		let ctx = GuardContext::new("unknown-server");

		// Default spoofing config blocks unknown servers at connection time
		let decision = executor.evaluate_server_connection(&ctx);
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "server_not_whitelisted");
		});
	}

	#[test]
	fn test_hot_reload_replaces_guards() {
		let executor = GuardExecutor::empty(test_host());
		assert!(!executor.has_guards());

		executor
			.update(vec![SecurityGuard {
				id: "poison".to_string(),
				description: None,
				priority: 100,
				runs_on: vec![],
				enabled: true,
				kind: GuardKind::ToolPoisoning(ToolPoisoningConfig::default()),
			}])
			.unwrap();
		assert!(executor.has_guards());

		executor.update(vec![]).unwrap();
		assert!(!executor.has_guards());
	}

	#[test]
	fn test_disabled_guard_is_skipped() {
		let configs = vec![SecurityGuard {
			id: "spoofing".to_string(),
			description: None,
			priority: 100,
			runs_on: vec![],
			enabled: false,
			kind: GuardKind::ServerSpoofing(ServerSpoofingConfig::default()),
		}];
		let executor = GuardExecutor::new(configs, test_host()).unwrap();
		let ctx = GuardContext::new("unknown-server");
		assert_matches!(executor.evaluate_server_connection(&ctx), Decision::Allow);
	}

	struct FailingGuard;

	impl Guard for FailingGuard {
		fn evaluate_tools_list(&self, _tools: &[Tool], _ctx: &GuardContext) -> GuardResult {
			Err(GuardError::ExecutionError("recognizer state corrupted".to_string()))
		}

		fn settings_schema(&self) -> String {
			"{}".to_string()
		}

		fn default_config(&self) -> String {
			"{}".to_string()
		}
	}

	struct PanickingGuard;

	impl Guard for PanickingGuard {
		fn evaluate_tools_list(&self, _tools: &[Tool], _ctx: &GuardContext) -> GuardResult {
			panic!("index out of range");
		}

		fn settings_schema(&self) -> String {
			"{}".to_string()
		}

		fn default_config(&self) -> String {
			"{}".to_string()
		}
	}

	#[test]
	fn test_guard_error_becomes_fail_closed_deny() {
		let executor = GuardExecutor::empty(test_host());
		executor.register_custom(
			"failing",
			100,
			vec![GuardPhase::ToolsList],
			Arc::new(FailingGuard),
		);

		let ctx = GuardContext::new("any-server");
		let decision = executor.evaluate_tools_list(&[], &ctx);
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "guard_internal_error");
			let details = reason.details.unwrap();
			assert_eq!(details["guard"], "failing");
			assert!(details["error"].as_str().unwrap().contains("recognizer state corrupted"));
		});
	}

	#[test]
	fn test_guard_panic_becomes_fail_closed_deny() {
		let executor = GuardExecutor::empty(test_host());
		executor.register_custom(
			"panicking",
			100,
			vec![GuardPhase::ToolsList],
			Arc::new(PanickingGuard),
		);

		let ctx = GuardContext::new("any-server");
		let decision = executor.evaluate_tools_list(&[], &ctx);
		assert_matches!(decision, Decision::Deny(reason) => {
			assert_eq!(reason.code, "guard_internal_error");
		});
	}

	#[test]
	fn test_custom_guard_only_runs_on_registered_phases() {
		let executor = GuardExecutor::empty(test_host());
		executor.register_custom(
			"failing",
			100,
			vec![GuardPhase::ToolsList],
			Arc::new(FailingGuard),
		);

		// The failing guard is not registered for the connection phase
		let ctx = GuardContext::new("any-server");
		assert_matches!(executor.evaluate_server_connection(&ctx), Decision::Allow);
	}

	#[test]
	fn test_context_target_prefers_metadata() {
		let mut ctx = GuardContext::new("server-a");
		assert_eq!(ctx.target(), "server-a");
		ctx.metadata = serde_json::json!({"target": "route-1"});
		assert_eq!(ctx.target(), "route-1");
	}
}
