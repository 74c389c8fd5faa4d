// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Outbound channel from an entity provider to the catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::entity::DeferredEntity;
use crate::error::PublishError;

/// How the catalog should interpret a batch of entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
	/// The batch is the complete set of entities from the source. Anything the
	/// catalog previously received from the same source and that is missing
	/// from the batch is removed.
	Full,
}

impl fmt::Display for MutationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MutationKind::Full => write!(f, "full"),
		}
	}
}

/// A batch of entities sent to the catalog in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMutation {
	#[serde(rename = "type")]
	pub kind: MutationKind,
	pub entities: Vec<DeferredEntity>,
}

impl EntityMutation {
	/// A full-state mutation carrying every entity the source knows about.
	pub fn full(entities: Vec<DeferredEntity>) -> Self {
		Self {
			kind: MutationKind::Full,
			entities,
		}
	}
}

/// Connection used by an entity provider to publish mutations.
#[async_trait]
pub trait CatalogConnection: Send + Sync {
	/// Apply a mutation atomically.
	async fn apply_mutation(&self, mutation: EntityMutation) -> Result<(), PublishError>;
}

/// Shared reference to a catalog connection.
pub type SharedCatalogConnection = Arc<dyn CatalogConnection>;
