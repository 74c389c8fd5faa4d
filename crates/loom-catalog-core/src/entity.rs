// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Catalog entity types.
//!
//! This module provides:
//! - [`Entity`] - a versioned user record as stored by the catalog
//! - [`EntityRef`] - the `kind:namespace/name` reference that identifies an entity
//! - [`DeferredEntity`] - an entity paired with the location key of the source
//!   that manages it
//!
//! # Stable Keys
//!
//! Every entity has exactly one stable key, derived from its reference:
//!
//! ```text
//! user:default/jdoe
//! ─┬── ───┬─── ──┬─
//!  │      │      └── name (case preserved)
//!  │      └───────── namespace (lower-cased)
//!  └──────────────── kind (lower-cased)
//! ```
//!
//! Two entities with the same stable key are the same entity as far as the
//! catalog is concerned.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CatalogError;

/// API version stamped on every entity produced by this subsystem.
pub const ENTITY_API_VERSION: &str = "loom.dev/v1alpha1";

/// Kind of entity managed by this subsystem.
pub const USER_KIND: &str = "User";

/// Kind used for group-membership references.
pub const GROUP_KIND: &str = "Group";

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Annotation naming the location that currently manages an entity.
pub const ANNOTATION_MANAGED_BY_LOCATION: &str = "loom.dev/managed-by-location";

/// Annotation naming the location that originally created an entity.
pub const ANNOTATION_MANAGED_BY_ORIGIN_LOCATION: &str = "loom.dev/managed-by-origin-location";

/// Builds the `"<subsystem-id>:<stable key>"` location key.
pub fn location_key(subsystem_id: &str, stable_key: &str) -> String {
	format!("{subsystem_id}:{stable_key}")
}

// =============================================================================
// Entity
// =============================================================================

/// A user record in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
	pub api_version: String,
	pub kind: String,
	pub metadata: EntityMetadata,
	pub spec: UserEntitySpec,
}

/// Identifying metadata of an [`Entity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
	pub namespace: String,
	pub name: String,
	/// Free-form string annotations. Ordered so serialized output is stable.
	#[serde(default)]
	pub annotations: BTreeMap<String, String>,
}

/// The `spec` block of a user entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntitySpec {
	pub profile: UserProfile,
	/// Group references (`group:default/<name>`) the user belongs to.
	#[serde(default)]
	pub member_of: Vec<String>,
}

/// Display profile of a user entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
}

impl Entity {
	/// Create a user entity in the given namespace with no annotations.
	pub fn user(namespace: impl Into<String>, name: impl Into<String>, spec: UserEntitySpec) -> Self {
		Self {
			api_version: ENTITY_API_VERSION.to_string(),
			kind: USER_KIND.to_string(),
			metadata: EntityMetadata {
				namespace: namespace.into(),
				name: name.into(),
				annotations: BTreeMap::new(),
			},
			spec,
		}
	}

	/// The reference identifying this entity.
	pub fn entity_ref(&self) -> EntityRef {
		EntityRef::new(&self.kind, &self.metadata.namespace, &self.metadata.name)
	}

	/// The `kind:namespace/name` key used for de-duplication.
	pub fn stable_key(&self) -> String {
		self.entity_ref().to_string()
	}

	/// Returns the value of an annotation, if set.
	pub fn annotation(&self, key: &str) -> Option<&str> {
		self.metadata.annotations.get(key).map(String::as_str)
	}

	/// Set an annotation, replacing any previous value.
	pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.metadata.annotations.insert(key.into(), value.into());
		self
	}

	/// Mark this entity as managed by the given subsystem.
	///
	/// Both provenance annotations point at the subsystem's location key for
	/// this entity.
	pub fn with_managed_by(self, subsystem_id: &str) -> Self {
		let location = location_key(subsystem_id, &self.stable_key());
		self
			.with_annotation(ANNOTATION_MANAGED_BY_LOCATION, location.clone())
			.with_annotation(ANNOTATION_MANAGED_BY_ORIGIN_LOCATION, location)
	}
}

// =============================================================================
// Entity references
// =============================================================================

/// A reference to a catalog entity.
///
/// `kind` and `namespace` are normalized to lower case on construction so that
/// references compare the same way their stable keys do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityRef {
	kind: String,
	namespace: String,
	name: String,
}

impl EntityRef {
	pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
		Self {
			kind: kind.to_lowercase(),
			namespace: namespace.to_lowercase(),
			name: name.to_string(),
		}
	}

	/// Reference to a user in the default namespace.
	pub fn user(name: &str) -> Self {
		Self::new(USER_KIND, DEFAULT_NAMESPACE, name)
	}

	/// Reference to a group in the default namespace.
	pub fn group(name: &str) -> Self {
		Self::new(GROUP_KIND, DEFAULT_NAMESPACE, name)
	}

	pub fn kind(&self) -> &str {
		&self.kind
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Parse a reference, filling in `default_kind` when the string has no
	/// `kind:` prefix. The namespace defaults to [`DEFAULT_NAMESPACE`].
	pub fn parse_with_default_kind(s: &str, default_kind: &str) -> Result<Self, CatalogError> {
		let (kind, rest) = match s.split_once(':') {
			Some((kind, rest)) => (kind, rest),
			None => (default_kind, s),
		};
		let (namespace, name) = match rest.split_once('/') {
			Some((namespace, name)) => (namespace, name),
			None => (DEFAULT_NAMESPACE, rest),
		};

		if kind.is_empty() || namespace.is_empty() || name.is_empty() {
			return Err(CatalogError::InvalidEntityRef(s.to_string()));
		}
		if name.contains(['/', ':']) {
			return Err(CatalogError::InvalidEntityRef(s.to_string()));
		}

		Ok(Self::new(kind, namespace, name))
	}

	/// Parse a fully qualified `kind:namespace/name` reference, keeping
	/// everything after the first `/` as the name.
	///
	/// This reads back any reference produced by `Display`, including names
	/// that contain `:` or `/` (such as a `realm:admin` role), which
	/// [`FromStr`] rejects as ambiguous.
	pub fn parse_qualified(s: &str) -> Result<Self, CatalogError> {
		let invalid = || CatalogError::InvalidEntityRef(s.to_string());
		let (kind, rest) = s.split_once(':').ok_or_else(invalid)?;
		let (namespace, name) = rest.split_once('/').ok_or_else(invalid)?;

		if kind.is_empty() || namespace.is_empty() || name.is_empty() || kind.contains('/') {
			return Err(invalid());
		}

		Ok(Self::new(kind, namespace, name))
	}
}

impl fmt::Display for EntityRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}/{}", self.kind, self.namespace, self.name)
	}
}

impl FromStr for EntityRef {
	type Err = CatalogError;

	/// Parses `[kind:][namespace/]name`; the kind defaults to `user`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse_with_default_kind(s, USER_KIND)
	}
}

impl TryFrom<String> for EntityRef {
	type Error = CatalogError;

	fn try_from(s: String) -> Result<Self, Self::Error> {
		s.parse()
	}
}

impl From<EntityRef> for String {
	fn from(r: EntityRef) -> Self {
		r.to_string()
	}
}

// =============================================================================
// Deferred entities
// =============================================================================

/// An entity paired with the key of the location that provides it.
///
/// The catalog uses the location key to attribute provenance and to detect
/// the same entity being emitted by two different sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredEntity {
	pub entity: Entity,
	pub location_key: String,
}

impl DeferredEntity {
	/// Wrap an entity, deriving its location key from the subsystem id.
	pub fn new(entity: Entity, subsystem_id: &str) -> Self {
		let location_key = location_key(subsystem_id, &entity.stable_key());
		Self {
			entity,
			location_key,
		}
	}
}
