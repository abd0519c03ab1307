// Tool fingerprinting
//
// A fingerprint identifies a tool by structural content only: the hex
// encoding of the first 16 bytes of SHA-256 over
// `name <US> description <US> canonical_schema`, where <US> is U+001F.
// The advertising server never participates, so the same tool advertised
// from two servers produces the same fingerprint (the property tool
// mimicry detection relies on).

use sha2::{Digest, Sha256};

use crate::Tool;

/// Unit separator between fingerprint fields
const FIELD_SEPARATOR: char = '\u{1f}';

/// Number of SHA-256 prefix bytes kept in a fingerprint
const FINGERPRINT_BYTES: usize = 16;

/// A tool reduced to its canonical structural content.
///
/// Kept in rug-pull baselines so diffs can classify which field changed
/// without reparsing the original advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTool {
	pub name: String,
	pub description: Option<String>,
	pub canonical_schema: String,
	pub fingerprint: String,
}

impl CanonicalTool {
	pub fn from_tool(tool: &Tool) -> Self {
		let canonical_schema = canonicalize_schema(&tool.input_schema);
		let fingerprint = fingerprint_parts(
			&tool.name,
			tool.description.as_deref(),
			&canonical_schema,
		);
		Self {
			name: tool.name.clone(),
			description: tool.description.clone(),
			canonical_schema,
			fingerprint,
		}
	}
}

/// Compute the fingerprint of an advertised tool.
pub fn tool_fingerprint(tool: &Tool) -> String {
	let canonical_schema = canonicalize_schema(&tool.input_schema);
	fingerprint_parts(&tool.name, tool.description.as_deref(), &canonical_schema)
}

fn fingerprint_parts(name: &str, description: Option<&str>, canonical_schema: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(name.as_bytes());
	hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
	hasher.update(description.unwrap_or_default().as_bytes());
	hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
	hasher.update(canonical_schema.as_bytes());
	let digest = hasher.finalize();
	hex::encode(&digest[..FINGERPRINT_BYTES])
}

/// Canonicalize a JSON Schema fragment: keys sorted recursively, compact
/// whitespace. Non-JSON input falls back to the whitespace-trimmed source
/// so malformed schemas still fingerprint deterministically.
pub fn canonicalize_schema(schema: &str) -> String {
	match serde_json::from_str::<serde_json::Value>(schema) {
		Ok(value) => {
			let mut out = String::with_capacity(schema.len());
			write_canonical(&value, &mut out);
			out
		},
		Err(_) => schema.split_whitespace().collect::<Vec<_>>().join(" "),
	}
}

// serde_json is built with preserve_order, so object key order follows the
// advertisement; sort explicitly to make the canonical form stable.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
	match value {
		serde_json::Value::Object(map) => {
			let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
			entries.sort_by(|a, b| a.0.cmp(b.0));
			out.push('{');
			for (i, (key, val)) in entries.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				out.push_str(&serde_json::Value::String((*key).clone()).to_string());
				out.push(':');
				write_canonical(val, out);
			}
			out.push('}');
		},
		serde_json::Value::Array(items) => {
			out.push('[');
			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				write_canonical(item, out);
			}
			out.push(']');
		},
		scalar => out.push_str(&scalar.to_string()),
	}
}
