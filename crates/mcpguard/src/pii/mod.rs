//! PII (Personally Identifiable Information) detection
//!
//! Entity recognizers shared by the PII guard. Each recognizer finds all
//! spans of one entity type in an input string and scores them; the guard
//! layers score filtering, overlap resolution and the mask/reject action
//! on top.
//!
//! # Supported entity types
//! - Email addresses
//! - Phone numbers (NANP plus common international formats)
//! - US Social Security Numbers
//! - Credit card numbers (Luhn-validated)
//! - Canadian Social Insurance Numbers
//! - URLs
//!
//! The set is data-driven: adding a recognizer means adding a `PiiType`
//! variant and its module, with no changes to the guard.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

mod ca_sin_recognizer;
mod credit_card_recognizer;
mod email_recognizer;
mod pattern_recognizer;
mod phone_recognizer;
mod recognizer;
mod recognizer_result;
mod url_recognizer;
mod us_ssn_recognizer;

pub use pattern_recognizer::{Pattern, PatternRecognizer};
pub use recognizer::Recognizer;
pub use recognizer_result::RecognizerResult;

use ca_sin_recognizer::CaSinRecognizer;
use credit_card_recognizer::CreditCardRecognizer;
use email_recognizer::EmailRecognizer;
use phone_recognizer::PhoneRecognizer;
use url_recognizer::UrlRecognizer;
use us_ssn_recognizer::UsSsnRecognizer;

/// PII entity types that can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
	/// Email addresses (e.g. user@example.com)
	Email,
	/// Phone numbers
	#[serde(alias = "phone")]
	PhoneNumber,
	/// US Social Security Numbers (e.g. 123-45-6789)
	Ssn,
	/// Credit card numbers (Luhn-validated)
	CreditCard,
	/// Canadian Social Insurance Numbers (e.g. 453-987-123)
	CaSin,
	/// URLs (http/https)
	Url,
}

impl PiiType {
	/// All available PII types.
	pub fn all() -> Vec<PiiType> {
		vec![
			PiiType::Email,
			PiiType::PhoneNumber,
			PiiType::Ssn,
			PiiType::CreditCard,
			PiiType::CaSin,
			PiiType::Url,
		]
	}

	/// The recognizer for this PII type.
	pub fn recognizer(&self) -> &'static (dyn Recognizer + Sync + Send) {
		match self {
			PiiType::Email => EMAIL.as_ref(),
			PiiType::PhoneNumber => PHONE.as_ref(),
			PiiType::Ssn => SSN.as_ref(),
			PiiType::CreditCard => CC.as_ref(),
			PiiType::CaSin => CA_SIN.as_ref(),
			PiiType::Url => URL.as_ref(),
		}
	}
}

// Lazy-initialized singleton recognizers
pub static EMAIL: Lazy<Box<dyn Recognizer + Sync + Send + 'static>> =
	Lazy::new(|| Box::new(EmailRecognizer::new()));

pub static PHONE: Lazy<Box<dyn Recognizer + Sync + Send + 'static>> =
	Lazy::new(|| Box::new(PhoneRecognizer::new()));

pub static SSN: Lazy<Box<dyn Recognizer + Sync + Send + 'static>> =
	Lazy::new(|| Box::new(UsSsnRecognizer::new()));

pub static CC: Lazy<Box<dyn Recognizer + Sync + Send + 'static>> =
	Lazy::new(|| Box::new(CreditCardRecognizer::new()));

pub static CA_SIN: Lazy<Box<dyn Recognizer + Sync + Send + 'static>> =
	Lazy::new(|| Box::new(CaSinRecognizer::new()));

pub static URL: Lazy<Box<dyn Recognizer + Sync + Send + 'static>> =
	Lazy::new(|| Box::new(UrlRecognizer::new()));

/// Scan text for specific PII types and return all matches.
pub fn scan_text(text: &str, types: &[PiiType]) -> Vec<RecognizerResult> {
	let mut results = Vec::new();
	for pii_type in types {
		results.extend(pii_type.recognizer().recognize(text));
	}
	results
}

/// Scan text for all PII types and return all matches.
pub fn scan_all(text: &str) -> Vec<RecognizerResult> {
	scan_text(text, &PiiType::all())
}
