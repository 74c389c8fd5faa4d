// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for catalog-backed sign-in.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `LOOM_SERVER_AUTH_CATALOG_SUBSYSTEM_ID` | `loom-auth-provisioner` |
//! | `LOOM_SERVER_AUTH_CATALOG_ROLES_CLIENT` | `app` |
//! | `LOOM_SERVER_AUTH_CATALOG_DANGEROUS_FALLBACK` | `false` |
//! | `LOOM_SERVER_AUTH_CATALOG_USER_HEADER` | unset (use the built-in header list) |

use std::env;

use crate::claims::DEFAULT_ROLES_CLIENT;
use crate::error::ConfigError;

pub const SUBSYSTEM_ID_ENV_VAR: &str = "LOOM_SERVER_AUTH_CATALOG_SUBSYSTEM_ID";
pub const ROLES_CLIENT_ENV_VAR: &str = "LOOM_SERVER_AUTH_CATALOG_ROLES_CLIENT";
pub const DANGEROUS_FALLBACK_ENV_VAR: &str = "LOOM_SERVER_AUTH_CATALOG_DANGEROUS_FALLBACK";
pub const USER_HEADER_ENV_VAR: &str = "LOOM_SERVER_AUTH_CATALOG_USER_HEADER";

/// Subsystem id used when none is configured.
pub const DEFAULT_SUBSYSTEM_ID: &str = "loom-auth-provisioner";

/// Headers read by the header resolver, in order, when no override is set.
pub const DEFAULT_USER_HEADERS: [&str; 2] = ["x-forwarded-preferred-username", "x-forwarded-user"];

/// Settings shared by the catalog resolvers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogAuthConfig {
	/// Identifies this subsystem as the source of provisioned entities. Used in
	/// provenance annotations and location keys.
	pub subsystem_id: String,
	/// Client under `resource_access` whose roles become group memberships.
	pub roles_client: String,
	/// DANGEROUS: let the simple resolvers sign in users that have no catalog
	/// record.
	pub dangerous_entity_ref_fallback: bool,
}

impl Default for CatalogAuthConfig {
	fn default() -> Self {
		Self {
			subsystem_id: DEFAULT_SUBSYSTEM_ID.to_string(),
			roles_client: DEFAULT_ROLES_CLIENT.to_string(),
			dangerous_entity_ref_fallback: false,
		}
	}
}

impl CatalogAuthConfig {
	/// Load configuration from environment variables, falling back to defaults.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::InvalidConfig`] if a value is empty or the
	/// fallback flag is not a boolean.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let defaults = Self::default();
		let config = Self {
			subsystem_id: get(SUBSYSTEM_ID_ENV_VAR).unwrap_or(defaults.subsystem_id),
			roles_client: get(ROLES_CLIENT_ENV_VAR).unwrap_or(defaults.roles_client),
			dangerous_entity_ref_fallback: match get(DANGEROUS_FALLBACK_ENV_VAR) {
				Some(value) => parse_bool(DANGEROUS_FALLBACK_ENV_VAR, &value)?,
				None => defaults.dangerous_entity_ref_fallback,
			},
		};
		config.validate()?;
		Ok(config)
	}

	/// Validate that all configuration fields are non-empty.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.subsystem_id.trim().is_empty() {
			return Err(ConfigError::InvalidConfig(
				"subsystem_id cannot be empty".to_string(),
			));
		}
		if self.roles_client.trim().is_empty() {
			return Err(ConfigError::InvalidConfig(
				"roles_client cannot be empty".to_string(),
			));
		}
		Ok(())
	}
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_lowercase().as_str() {
		"1" | "true" | "yes" => Ok(true),
		"0" | "false" | "no" | "" => Ok(false),
		other => Err(ConfigError::InvalidConfig(format!(
			"{name} must be a boolean, got {other:?}"
		))),
	}
}

/// Which headers the header resolver reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderResolverConfig {
	/// Header names tried in order; the first one present wins.
	pub headers: Vec<String>,
}

impl Default for HeaderResolverConfig {
	fn default() -> Self {
		Self {
			headers: DEFAULT_USER_HEADERS.iter().map(|h| h.to_string()).collect(),
		}
	}
}

impl HeaderResolverConfig {
	/// Read only `header` instead of the built-in list.
	pub fn with_override(header: impl Into<String>) -> Self {
		Self {
			headers: vec![header.into()],
		}
	}

	/// Use `LOOM_SERVER_AUTH_CATALOG_USER_HEADER` when set and non-empty.
	pub fn from_env() -> Self {
		Self::from_lookup(|name| env::var(name).ok())
	}

	pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
		match get(USER_HEADER_ENV_VAR).map(|h| h.trim().to_lowercase()) {
			Some(header) if !header.is_empty() => Self::with_override(header),
			_ => Self::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn defaults_when_unset() {
		let config = CatalogAuthConfig::from_lookup(lookup(&[])).unwrap();
		assert_eq!(config, CatalogAuthConfig::default());
		assert!(!config.dangerous_entity_ref_fallback);
	}

	#[test]
	fn reads_overrides() {
		let config = CatalogAuthConfig::from_lookup(lookup(&[
			(SUBSYSTEM_ID_ENV_VAR, "sso-provisioner"),
			(ROLES_CLIENT_ENV_VAR, "portal"),
			(DANGEROUS_FALLBACK_ENV_VAR, "TRUE"),
		]))
		.unwrap();
		assert_eq!(config.subsystem_id, "sso-provisioner");
		assert_eq!(config.roles_client, "portal");
		assert!(config.dangerous_entity_ref_fallback);
	}

	#[test]
	fn rejects_non_boolean_fallback() {
		let err = CatalogAuthConfig::from_lookup(lookup(&[(DANGEROUS_FALLBACK_ENV_VAR, "maybe")]))
			.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidConfig(_)));
	}

	#[test]
	fn rejects_empty_subsystem_id() {
		let err = CatalogAuthConfig::from_lookup(lookup(&[(SUBSYSTEM_ID_ENV_VAR, " ")])).unwrap_err();
		assert!(err.to_string().contains("subsystem_id"));
	}

	#[test]
	fn header_config_defaults_to_two_headers() {
		let config = HeaderResolverConfig::from_lookup(lookup(&[]));
		assert_eq!(
			config.headers,
			vec!["x-forwarded-preferred-username", "x-forwarded-user"]
		);
	}

	#[test]
	fn header_override_replaces_defaults() {
		let config = HeaderResolverConfig::from_lookup(lookup(&[(USER_HEADER_ENV_VAR, "X-Remote-User")]));
		assert_eq!(config.headers, vec!["x-remote-user"]);
	}

	#[test]
	fn empty_header_override_is_ignored() {
		let config = HeaderResolverConfig::from_lookup(lookup(&[(USER_HEADER_ENV_VAR, "")]));
		assert_eq!(config, HeaderResolverConfig::default());
	}
}
