// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for catalog model operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised by the catalog model itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
	#[error("invalid entity reference: {0}")]
	InvalidEntityRef(String),
}

/// Errors returned by a [`CatalogConnection`](crate::CatalogConnection) when a
/// mutation could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
	#[error("catalog rejected mutation: {message}")]
	Rejected { message: String },

	#[error("catalog connection unavailable: {message}")]
	Unavailable { message: String },
}

/// Errors returned by a [`ResolverContext`](crate::ResolverContext) lookup.
///
/// Only [`LookupError::NotFound`] means "the entity is not (yet) visible";
/// every other variant is a hard failure that must not be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
	#[error("entity not found: {0}")]
	NotFound(String),

	#[error("ambiguous lookup, {count} entities matched: {query}")]
	Ambiguous { query: String, count: usize },

	#[error("catalog lookup failed: {0}")]
	Catalog(String),
}

impl LookupError {
	/// Returns true if the lookup failed only because nothing matched.
	pub fn is_not_found(&self) -> bool {
		matches!(self, LookupError::NotFound(_))
	}
}
