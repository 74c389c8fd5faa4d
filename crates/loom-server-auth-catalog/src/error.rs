// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_catalog_core::{EntityRef, LookupError};

/// Result type for sign-in resolution.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors that end a sign-in resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
	/// The bearer token has no payload segment or the payload is not a JSON
	/// object.
	#[error("malformed token: {0}")]
	MalformedToken(String),

	#[error("upstream profile has no email")]
	MissingEmail,

	#[error("missing claim: {0}")]
	MissingClaim(&'static str),

	/// The profile and the separately signed ID token disagree about the
	/// user's UUID.
	#[error("uuid mismatch between profile ({profile}) and id token ({token})")]
	UuidMismatch { profile: String, token: String },

	#[error("user not found in catalog: {0}")]
	NotFound(String),

	#[error("catalog did not converge on {reference} after {attempts} attempts")]
	NotConverged { reference: EntityRef, attempts: u32 },

	/// A catalog lookup failed for a reason other than "not found".
	#[error(transparent)]
	Lookup(LookupError),
}

impl From<LookupError> for ResolveError {
	fn from(err: LookupError) -> Self {
		match err {
			LookupError::NotFound(query) => ResolveError::NotFound(query),
			other => ResolveError::Lookup(other),
		}
	}
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// A configuration value was empty or invalid.
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
}
