// Guard state store
//
// Owns the two pieces of process-wide mutable guard state: the tool
// registry written by the spoofing guard and the per-target rug-pull
// baselines. Modeled as an explicit object created per executor rather
// than hidden globals, so tests (and multi-tenant hosts) can instantiate
// fresh stores.
//
// Locking discipline: readers take the shared lock for mimicry and
// collision scans; writers take the exclusive lock for registry
// replacement and baseline capture. Baseline capture double-checks under
// the write lock so the first writer wins and later writers observe the
// captured baseline (tools_list calls for one target are serialized by
// the gateway, but nothing orders calls across targets or sessions).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::fingerprint::CanonicalTool;

/// A namespace collision between two servers advertising the same tool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCollision {
	pub tool_name: String,
	pub this_server: String,
	pub other_server: String,
}

/// Tool catalogue captured on the first successful `tools_list` for a
/// target. Immutable until an explicit reset; allowing it to drift would
/// defeat rug-pull detection.
#[derive(Debug, Clone)]
pub struct Baseline {
	/// Capture time, seconds since epoch (from the host clock)
	pub captured_at: u64,
	/// Tool name -> canonical content
	pub tools: HashMap<String, CanonicalTool>,
}

#[derive(Default)]
pub struct GuardStore {
	/// server_name -> (tool_name -> fingerprint); last writer wins
	tool_registry: RwLock<HashMap<String, HashMap<String, String>>>,
	/// target -> baseline
	baselines: RwLock<HashMap<String, Baseline>>,
}

impl GuardStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replace the registry record for a server with its latest catalogue.
	pub fn register_tools(&self, server_name: &str, fingerprints: HashMap<String, String>) {
		let mut registry = self.tool_registry.write().expect("tool registry lock poisoned");
		registry.insert(server_name.to_string(), fingerprints);
	}

	/// Find tool names this server shares with any *other* registered
	/// server (server comparison is case-insensitive).
	pub fn find_collisions(&self, server_name: &str, tool_names: &[&str]) -> Vec<ToolCollision> {
		let registry = self.tool_registry.read().expect("tool registry lock poisoned");
		let server_lower = server_name.to_lowercase();
		let mut collisions = Vec::new();

		for name in tool_names {
			for (other_server, other_tools) in registry.iter() {
				if other_server.to_lowercase() == server_lower {
					continue;
				}
				if other_tools.contains_key(*name) {
					collisions.push(ToolCollision {
						tool_name: (*name).to_string(),
						this_server: server_name.to_string(),
						other_server: other_server.clone(),
					});
				}
			}
		}

		collisions
	}

	/// Capture a baseline for a target if none exists yet. Returns true if
	/// this call captured it; false if a baseline was already present (the
	/// caller then diffs against the existing one).
	pub fn try_capture_baseline<F>(&self, target: &str, make: F) -> bool
	where
		F: FnOnce() -> Baseline,
	{
		let mut baselines = self.baselines.write().expect("baselines lock poisoned");
		if baselines.contains_key(target) {
			return false;
		}
		baselines.insert(target.to_string(), make());
		true
	}

	/// Run `f` against the target's baseline, if one has been captured.
	pub fn with_baseline<R>(&self, target: &str, f: impl FnOnce(&Baseline) -> R) -> Option<R> {
		let baselines = self.baselines.read().expect("baselines lock poisoned");
		baselines.get(target).map(f)
	}

	/// Drop a server's registry record. Returns true if one existed.
	pub fn remove_server_tools(&self, server_name: &str) -> bool {
		let mut registry = self.tool_registry.write().expect("tool registry lock poisoned");
		registry.remove(server_name).is_some()
	}

	/// Drop a target's baseline. Returns true if one existed.
	pub fn remove_baseline(&self, target: &str) -> bool {
		let mut baselines = self.baselines.write().expect("baselines lock poisoned");
		baselines.remove(target).is_some()
	}

	/// Drop all state for a target: registry record and baseline.
	pub fn reset_target(&self, target: &str) {
		self.remove_server_tools(target);
		self.remove_baseline(target);
	}

	#[cfg(test)]
	pub(crate) fn registered_servers(&self) -> Vec<String> {
		let registry = self.tool_registry.read().expect("tool registry lock poisoned");
		registry.keys().cloned().collect()
	}
}
