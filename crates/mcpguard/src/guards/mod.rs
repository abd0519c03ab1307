// Guard implementations
//
// Each guard satisfies the `Guard` trait: per-phase evaluation with
// allow defaults for phases it does not handle, plus the introspection
// pair (`settings_schema`, `default_config`) the control plane uses to
// render configuration forms.

pub mod pii_guard;
pub mod rug_pull;
pub mod server_spoofing;
pub mod tool_poisoning;

use crate::{Decision, GuardContext, GuardResult, Tool};

/// Common trait for all guards.
pub trait Guard: Send + Sync {
	/// Evaluate a new server attachment (`connection` phase).
	fn evaluate_server_connection(&self, ctx: &GuardContext) -> GuardResult {
		let _ = ctx;
		Ok(Decision::Allow)
	}

	/// Evaluate an advertised tool catalogue (`tools_list` phase).
	fn evaluate_tools_list(&self, tools: &[Tool], ctx: &GuardContext) -> GuardResult {
		let _ = (tools, ctx);
		Ok(Decision::Allow)
	}

	/// Evaluate a tool call response (`tool_response` phase).
	///
	/// Mitigation guards may rewrite `payload` in place; the decision
	/// stays ternary (a masked payload is an `Allow`).
	fn evaluate_tool_response(
		&self,
		tool_name: &str,
		payload: &mut serde_json::Value,
		ctx: &GuardContext,
	) -> GuardResult {
		let _ = (tool_name, payload, ctx);
		Ok(Decision::Allow)
	}

	/// JSON Schema 2020-12 text describing this guard's configuration.
	/// Carries `x-ui` rendering hints and an `x-guard-meta` block.
	fn settings_schema(&self) -> String;

	/// Default configuration as JSON text. Key set matches the schema's
	/// `properties` exactly.
	fn default_config(&self) -> String;

	/// Reset per-target state (called on session re-initialization).
	fn reset_server(&self, server_name: &str) {
		let _ = server_name;
	}
}
