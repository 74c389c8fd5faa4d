// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory catalog for tests and local development.
//!
//! [`InMemoryCatalog`] implements both sides of the catalog contract: each
//! provider gets a [`SourceConnection`] to publish full mutations through, and
//! the catalog itself serves sign-in lookups as a [`ResolverContext`].
//!
//! Reads can be configured to lag behind writes with
//! [`InMemoryCatalog::with_read_lag`], which reproduces the window in which a
//! freshly provisioned user is not yet visible.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::connection::{CatalogConnection, EntityMutation, MutationKind};
use crate::context::{CatalogUserQuery, ResolverContext, SignInOptions, SignInResult};
use crate::entity::{Entity, EntityRef, GROUP_KIND};
use crate::error::{LookupError, PublishError};

#[derive(Debug, Clone)]
struct StoredEntity {
	entity: Entity,
	/// Provider that emitted the entity; `None` for seeded entities.
	source: Option<String>,
}

type EntityTable = BTreeMap<String, StoredEntity>;

#[derive(Debug, Default)]
struct CatalogState {
	visible: EntityTable,
	pending: Option<EntityTable>,
	read_lag: u32,
	stale_reads_remaining: u32,
	mutations_applied: usize,
}

impl CatalogState {
	fn latest(&self) -> &EntityTable {
		self.pending.as_ref().unwrap_or(&self.visible)
	}

	/// Advance the read-lag clock by one read and return the table it sees.
	fn read(&mut self) -> &EntityTable {
		if self.stale_reads_remaining > 0 {
			self.stale_reads_remaining -= 1;
		} else if let Some(pending) = self.pending.take() {
			self.visible = pending;
		}
		&self.visible
	}
}

/// A catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
	state: Arc<Mutex<CatalogState>>,
}

impl InMemoryCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	/// After each mutation, the next `reads` lookups still see the previous
	/// state.
	pub fn with_read_lag(reads: u32) -> Self {
		Self {
			state: Arc::new(Mutex::new(CatalogState {
				read_lag: reads,
				..Default::default()
			})),
		}
	}

	/// A connection that publishes on behalf of `source_id`.
	pub fn connection(&self, source_id: impl Into<String>) -> SourceConnection {
		SourceConnection {
			catalog: self.clone(),
			source_id: source_id.into(),
		}
	}

	/// Insert an entity that does not belong to any provider. Visible
	/// immediately.
	pub async fn insert(&self, entity: Entity) {
		let mut state = self.state.lock().await;
		let key = entity.stable_key();
		let stored = StoredEntity {
			entity,
			source: None,
		};
		if let Some(pending) = state.pending.as_mut() {
			pending.insert(key.clone(), stored.clone());
		}
		state.visible.insert(key, stored);
	}

	/// Every entity in the latest applied state, regardless of read lag.
	pub async fn entities(&self) -> Vec<Entity> {
		let state = self.state.lock().await;
		state.latest().values().map(|s| s.entity.clone()).collect()
	}

	/// Number of mutations applied so far.
	pub async fn mutations_applied(&self) -> usize {
		self.state.lock().await.mutations_applied
	}

	async fn apply(&self, source_id: &str, mutation: EntityMutation) -> Result<(), PublishError> {
		let mut state = self.state.lock().await;

		let mut next: EntityTable = match mutation.kind {
			MutationKind::Full => state
				.latest()
				.iter()
				.filter(|(_, stored)| stored.source.as_deref() != Some(source_id))
				.map(|(k, v)| (k.clone(), v.clone()))
				.collect(),
		};

		for deferred in mutation.entities {
			let key = deferred.entity.stable_key();
			if let Some(existing) = next.get(&key) {
				if existing.source.as_deref() != Some(source_id) {
					warn!(
						key = %key,
						location_key = %deferred.location_key,
						"entity already provided by another source, skipping"
					);
					continue;
				}
			}
			next.insert(
				key,
				StoredEntity {
					entity: deferred.entity,
					source: Some(source_id.to_string()),
				},
			);
		}

		state.mutations_applied += 1;
		if state.read_lag == 0 {
			state.visible = next;
			state.pending = None;
		} else {
			state.pending = Some(next);
			state.stale_reads_remaining = state.read_lag;
		}

		debug!(source = %source_id, "applied full mutation");
		Ok(())
	}

	fn find<'a>(table: &'a EntityTable, query: &CatalogUserQuery) -> Result<&'a Entity, LookupError> {
		match query {
			CatalogUserQuery::EntityRef(entity_ref) => table
				.get(&entity_ref.to_string())
				.map(|s| &s.entity)
				.ok_or_else(|| LookupError::NotFound(query.to_string())),
			CatalogUserQuery::Annotations(wanted) => {
				let matches: Vec<&Entity> = table
					.values()
					.map(|s| &s.entity)
					.filter(|e| {
						wanted
							.iter()
							.all(|(k, v)| e.annotation(k) == Some(v.as_str()))
					})
					.collect();
				match matches.as_slice() {
					[] => Err(LookupError::NotFound(query.to_string())),
					[entity] => Ok(entity),
					_ => Err(LookupError::Ambiguous {
						query: query.to_string(),
						count: matches.len(),
					}),
				}
			}
		}
	}
}

fn sign_in_result_for(entity: &Entity) -> SignInResult {
	let user_entity_ref = entity.entity_ref();
	let mut ownership_entity_refs = vec![user_entity_ref.clone()];
	for group in &entity.spec.member_of {
		let parsed = EntityRef::parse_with_default_kind(group, GROUP_KIND)
			.or_else(|_| EntityRef::parse_qualified(group));
		match parsed {
			Ok(group_ref) => ownership_entity_refs.push(group_ref),
			Err(e) => warn!(user = %user_entity_ref, error = %e, "ignoring invalid group reference"),
		}
	}
	SignInResult {
		user_entity_ref,
		ownership_entity_refs,
	}
}

#[async_trait]
impl ResolverContext for InMemoryCatalog {
	async fn sign_in_with_catalog_user(
		&self,
		query: CatalogUserQuery,
		options: SignInOptions,
	) -> Result<SignInResult, LookupError> {
		let mut state = self.state.lock().await;
		let table = state.read();
		match Self::find(table, &query) {
			Ok(entity) => Ok(sign_in_result_for(entity)),
			Err(e) if e.is_not_found() => match options.dangerous_entity_ref_fallback {
				Some(fallback) => {
					warn!(query = %query, fallback = %fallback, "user not in catalog, using dangerous fallback");
					Ok(SignInResult::bare(fallback))
				}
				None => Err(e),
			},
			Err(e) => Err(e),
		}
	}
}

/// A provider's connection into an [`InMemoryCatalog`].
#[derive(Debug, Clone)]
pub struct SourceConnection {
	catalog: InMemoryCatalog,
	source_id: String,
}

#[async_trait]
impl CatalogConnection for SourceConnection {
	async fn apply_mutation(&self, mutation: EntityMutation) -> Result<(), PublishError> {
		self.catalog.apply(&self.source_id, mutation).await
	}
}
