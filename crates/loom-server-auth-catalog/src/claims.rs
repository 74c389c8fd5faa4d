// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Token claims and the user entity derived from them.
//!
//! Tokens are decoded, never verified: the upstream handshake has already
//! validated them by the time a resolver runs.
//!
//! # Entitlements
//!
//! A user's groups in the catalog come from two claims:
//!
//! ```text
//! {
//!   "groups": ["a"],                                  ─┐
//!   "resource_access": { "app": { "roles": ["b"] } }  ─┼─► ["a", "b"]
//! }                                                    │
//!                                                      └─► memberOf: group:default/a,
//!                                                                    group:default/b
//! ```
//!
//! Groups come first, then roles; duplicates are kept. Entitlements are used
//! verbatim as group names, so a role such as `realm:admin` becomes
//! `group:default/realm:admin` and reads back with
//! [`EntityRef::parse_qualified`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use loom_catalog_core::{
	Entity, EntityRef, UserEntitySpec, UserProfile, DEFAULT_NAMESPACE,
};
use serde_json::{Map, Value};

use crate::error::{ResolveError, Result};
use crate::types::ProviderProfile;

/// Client under `resource_access` whose roles are read by default.
pub const DEFAULT_ROLES_CLIENT: &str = "app";

/// A claim holding a list of strings at a fixed path.
///
/// An absent claim (or absent intermediate object) reads as `None`; a claim
/// that is present but not a list of strings is a malformed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringListClaim {
	path: Vec<String>,
}

impl StringListClaim {
	pub fn new<I, S>(path: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			path: path.into_iter().map(Into::into).collect(),
		}
	}

	/// `groups`
	pub fn groups() -> Self {
		Self::new(["groups"])
	}

	/// `resource_access.<client>.roles`
	pub fn client_roles(client: &str) -> Self {
		Self::new(["resource_access", client, "roles"])
	}

	pub fn path(&self) -> String {
		self.path.join(".")
	}

	pub fn read(&self, claims: &TokenClaims) -> Result<Option<Vec<String>>> {
		let Some(value) = claims.lookup(&self.path) else {
			return Ok(None);
		};
		let malformed = || ResolveError::MalformedToken(format!("claim {} is not a list of strings", self.path()));
		let items = value.as_array().ok_or_else(malformed)?;
		items
			.iter()
			.map(|item| item.as_str().map(str::to_string).ok_or_else(malformed))
			.collect::<Result<Vec<_>>>()
			.map(Some)
	}

	/// Read the claim, treating an absent claim as an empty list.
	pub fn read_or_empty(&self, claims: &TokenClaims) -> Result<Vec<String>> {
		Ok(self.read(claims)?.unwrap_or_default())
	}
}

/// Decoded payload of a compact (JWT-style) token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenClaims {
	claims: Map<String, Value>,
}

impl TokenClaims {
	/// Decode the payload segment of `header.payload[.signature]`.
	pub fn decode(token: &str) -> Result<Self> {
		let mut segments = token.split('.');
		let payload = match (segments.next(), segments.next()) {
			(Some(_), Some(payload)) => payload,
			_ => {
				return Err(ResolveError::MalformedToken(
					"token has no payload segment".to_string(),
				))
			}
		};

		let decoded = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|e| ResolveError::MalformedToken(format!("failed to decode payload: {e}")))?;

		let value: Value = serde_json::from_slice(&decoded)
			.map_err(|e| ResolveError::MalformedToken(format!("failed to parse claims: {e}")))?;

		match value {
			Value::Object(claims) => Ok(Self { claims }),
			_ => Err(ResolveError::MalformedToken(
				"claims are not a JSON object".to_string(),
			)),
		}
	}

	fn lookup(&self, path: &[String]) -> Option<&Value> {
		let (first, rest) = path.split_first()?;
		rest
			.iter()
			.try_fold(self.claims.get(first)?, |value, segment| value.get(segment))
	}

	/// A top-level string claim, if present.
	pub fn string(&self, name: &str) -> Option<&str> {
		self.claims.get(name).and_then(Value::as_str)
	}
}

/// Builds the catalog user entity for a sign-in.
#[derive(Debug, Clone)]
pub struct ClaimExtractor {
	subsystem_id: String,
	groups: StringListClaim,
	roles: StringListClaim,
}

impl ClaimExtractor {
	/// `subsystem_id` is recorded in the entity's provenance annotations;
	/// roles are read from `resource_access.<roles_client>.roles`.
	pub fn new(subsystem_id: impl Into<String>, roles_client: &str) -> Self {
		Self {
			subsystem_id: subsystem_id.into(),
			groups: StringListClaim::groups(),
			roles: StringListClaim::client_roles(roles_client),
		}
	}

	/// Groups followed by roles, duplicates preserved.
	pub fn entitlements(&self, claims: &TokenClaims) -> Result<Vec<String>> {
		let mut entitlements = self.groups.read_or_empty(claims)?;
		entitlements.extend(self.roles.read_or_empty(claims)?);
		Ok(entitlements)
	}

	/// Decode `token` and build the user entity for `profile`.
	pub fn extract(&self, token: &str, profile: &ProviderProfile) -> Result<Entity> {
		let claims = TokenClaims::decode(token)?;
		let entitlements = self.entitlements(&claims)?;

		let email = profile
			.email
			.as_deref()
			.map(str::trim)
			.filter(|email| !email.is_empty())
			.ok_or(ResolveError::MissingEmail)?;
		let name = user_name_from_email(email).ok_or(ResolveError::MissingEmail)?;

		let spec = UserEntitySpec {
			profile: UserProfile {
				display_name: Some(name.to_string()),
				email: Some(email.to_string()),
			},
			member_of: entitlements
				.iter()
				.map(|entitlement| EntityRef::group(entitlement).to_string())
				.collect(),
		};

		Ok(Entity::user(DEFAULT_NAMESPACE, name, spec).with_managed_by(&self.subsystem_id))
	}
}

/// The part of an email before the first `@`.
pub fn user_name_from_email(email: &str) -> Option<&str> {
	let name = email.split('@').next().unwrap_or(email);
	(!name.is_empty()).then_some(name)
}
