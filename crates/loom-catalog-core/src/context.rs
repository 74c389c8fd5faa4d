// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sign-in contract between resolvers and the catalog.
//!
//! Resolvers never talk to the catalog directly. They describe which user
//! they are looking for with a [`CatalogUserQuery`] and hand it to a
//! [`ResolverContext`], which performs the lookup and issues the
//! [`SignInResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::entity::EntityRef;
use crate::error::LookupError;

/// Which catalog user to sign in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogUserQuery {
	/// Look the user up by reference.
	EntityRef(EntityRef),
	/// Find the single user whose annotations contain every given pair.
	Annotations(BTreeMap<String, String>),
}

impl CatalogUserQuery {
	/// Query a single annotation.
	pub fn annotation(key: impl Into<String>, value: impl Into<String>) -> Self {
		let mut annotations = BTreeMap::new();
		annotations.insert(key.into(), value.into());
		CatalogUserQuery::Annotations(annotations)
	}
}

impl fmt::Display for CatalogUserQuery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CatalogUserQuery::EntityRef(r) => write!(f, "{r}"),
			CatalogUserQuery::Annotations(annotations) => {
				let pairs: Vec<String> = annotations
					.iter()
					.map(|(k, v)| format!("{k}={v}"))
					.collect();
				write!(f, "annotations[{}]", pairs.join(","))
			}
		}
	}
}

/// Options for [`ResolverContext::sign_in_with_catalog_user`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInOptions {
	/// DANGEROUS: if the lookup fails, sign in as this bare reference without
	/// a catalog-backed record. No ownership is derived for it.
	pub dangerous_entity_ref_fallback: Option<EntityRef>,
}

impl SignInOptions {
	pub fn with_dangerous_fallback(fallback: EntityRef) -> Self {
		Self {
			dangerous_entity_ref_fallback: Some(fallback),
		}
	}
}

/// Identity issued after a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResult {
	pub user_entity_ref: EntityRef,
	/// The user itself followed by every group it is a member of.
	pub ownership_entity_refs: Vec<EntityRef>,
}

impl SignInResult {
	/// A result for a reference with no catalog record behind it.
	pub fn bare(user_entity_ref: EntityRef) -> Self {
		Self {
			ownership_entity_refs: vec![user_entity_ref.clone()],
			user_entity_ref,
		}
	}
}

/// Catalog-backed sign-in, provided by the surrounding auth service.
#[async_trait]
pub trait ResolverContext: Send + Sync {
	/// Look up a catalog user and issue a sign-in result for it.
	///
	/// Fails with [`LookupError::NotFound`] when no user matches and no
	/// fallback was given; any other error kind is a hard failure.
	async fn sign_in_with_catalog_user(
		&self,
		query: CatalogUserQuery,
		options: SignInOptions,
	) -> Result<SignInResult, LookupError>;
}
