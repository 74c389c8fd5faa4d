// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::Arc;

use loom_catalog_core::{
	DeferredEntity, Entity, EntityMutation, PublishError, SharedCatalogConnection,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// An [`EntityCache`] shared between resolvers.
///
/// The mutex is held across the publish, so one sign-in's cache edit and the
/// snapshot it publishes are never interleaved with another's.
pub type SharedEntityCache = Arc<Mutex<EntityCache>>;

/// The set of users provisioned by this subsystem, keyed by stable key.
///
/// The cache does no locking of its own. Mutating methods take `&mut self`;
/// callers sharing a cache wrap it in a [`SharedEntityCache`].
pub struct EntityCache {
	subsystem_id: String,
	entries: HashMap<String, DeferredEntity>,
	/// Stable keys in first-insertion order, for deterministic snapshots.
	order: Vec<String>,
	connection: Option<SharedCatalogConnection>,
}

impl EntityCache {
	/// Create an empty, unconnected cache for the given subsystem.
	pub fn new(subsystem_id: impl Into<String>) -> Self {
		Self {
			subsystem_id: subsystem_id.into(),
			entries: HashMap::new(),
			order: Vec::new(),
			connection: None,
		}
	}

	/// Wrap the cache for sharing.
	pub fn into_shared(self) -> SharedEntityCache {
		Arc::new(Mutex::new(self))
	}

	pub fn subsystem_id(&self) -> &str {
		&self.subsystem_id
	}

	/// Register the channel used for publishing. Replaces any previous one.
	pub fn connect(&mut self, connection: SharedCatalogConnection) {
		if self.connection.is_some() {
			debug!(subsystem_id = %self.subsystem_id, "replacing catalog connection");
		}
		self.connection = Some(connection);
	}

	pub fn is_connected(&self) -> bool {
		self.connection.is_some()
	}

	/// Insert or overwrite an entity and publish the full snapshot.
	///
	/// Without a connection the edit is kept locally and `Ok(())` is returned.
	/// A publish failure is returned to the caller but the edit stays in the
	/// cache; the next successful publish carries it.
	#[instrument(skip(self, entity), fields(subsystem_id = %self.subsystem_id, key = tracing::field::Empty))]
	pub async fn upsert(&mut self, entity: Entity) -> Result<(), PublishError> {
		let key = entity.stable_key();
		tracing::Span::current().record("key", key.as_str());

		let deferred = DeferredEntity::new(entity, &self.subsystem_id);
		if self.entries.insert(key.clone(), deferred).is_none() {
			self.order.push(key);
		}

		self.publish().await
	}

	/// Remove an entity by stable key and publish the full snapshot.
	///
	/// Removing a key that is not cached does nothing and publishes nothing.
	#[instrument(skip(self), fields(subsystem_id = %self.subsystem_id))]
	pub async fn remove(&mut self, key: &str) -> Result<(), PublishError> {
		if self.entries.remove(key).is_none() {
			debug!(key = %key, "remove of uncached entity ignored");
			return Ok(());
		}
		self.order.retain(|k| k != key);

		self.publish().await
	}

	/// Every cached entity, in first-insertion order.
	pub fn snapshot(&self) -> Vec<DeferredEntity> {
		self
			.order
			.iter()
			.filter_map(|key| self.entries.get(key))
			.cloned()
			.collect()
	}

	pub fn get(&self, key: &str) -> Option<&DeferredEntity> {
		self.entries.get(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.entries.contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	async fn publish(&self) -> Result<(), PublishError> {
		let Some(connection) = &self.connection else {
			warn!(
				subsystem_id = %self.subsystem_id,
				cached = self.entries.len(),
				"catalog connection not registered, entity kept locally"
			);
			return Ok(());
		};

		let snapshot = self.snapshot();
		let count = snapshot.len();
		connection
			.apply_mutation(EntityMutation::full(snapshot))
			.await?;
		debug!(subsystem_id = %self.subsystem_id, count, "published full snapshot");
		Ok(())
	}
}

impl std::fmt::Debug for EntityCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EntityCache")
			.field("subsystem_id", &self.subsystem_id)
			.field("keys", &self.order)
			.field("connected", &self.connection.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use loom_catalog_core::{CatalogConnection, MutationKind, UserEntitySpec};
	use proptest::prelude::*;
	use std::sync::Mutex as StdMutex;

	/// Records every mutation; optionally fails every call.
	#[derive(Default)]
	struct RecordingConnection {
		mutations: StdMutex<Vec<EntityMutation>>,
		fail: bool,
	}

	impl RecordingConnection {
		fn failing() -> Self {
			Self {
				fail: true,
				..Default::default()
			}
		}

		fn mutations(&self) -> Vec<EntityMutation> {
			self.mutations.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl CatalogConnection for RecordingConnection {
		async fn apply_mutation(&self, mutation: EntityMutation) -> Result<(), PublishError> {
			self.mutations.lock().unwrap().push(mutation);
			if self.fail {
				return Err(PublishError::Unavailable {
					message: "connection reset".to_string(),
				});
			}
			Ok(())
		}
	}

	fn user(name: &str, groups: &[&str]) -> Entity {
		Entity::user(
			"default",
			name,
			UserEntitySpec {
				member_of: groups.iter().map(|g| g.to_string()).collect(),
				..Default::default()
			},
		)
	}

	fn connected() -> (EntityCache, Arc<RecordingConnection>) {
		let conn = Arc::new(RecordingConnection::default());
		let mut cache = EntityCache::new("provisioner");
		cache.connect(conn.clone());
		(cache, conn)
	}

	fn names(entities: &[DeferredEntity]) -> Vec<&str> {
		entities
			.iter()
			.map(|d| d.entity.metadata.name.as_str())
			.collect()
	}

	#[tokio::test]
	async fn upsert_publishes_full_snapshot() {
		let (mut cache, conn) = connected();

		cache.upsert(user("alice", &[])).await.unwrap();
		cache.upsert(user("bob", &[])).await.unwrap();

		let mutations = conn.mutations();
		assert_eq!(mutations.len(), 2);
		assert!(mutations.iter().all(|m| m.kind == MutationKind::Full));
		assert_eq!(names(&mutations[0].entities), vec!["alice"]);
		assert_eq!(names(&mutations[1].entities), vec!["alice", "bob"]);
	}

	#[tokio::test]
	async fn upsert_same_key_overwrites_in_place() {
		let (mut cache, conn) = connected();

		cache.upsert(user("alice", &["group:default/a"])).await.unwrap();
		cache.upsert(user("bob", &[])).await.unwrap();
		cache.upsert(user("alice", &["group:default/b"])).await.unwrap();

		let snapshot = cache.snapshot();
		assert_eq!(names(&snapshot), vec!["alice", "bob"]);
		assert_eq!(snapshot[0].entity.spec.member_of, vec!["group:default/b"]);
		assert_eq!(conn.mutations().last().unwrap().entities, snapshot);
	}

	#[tokio::test]
	async fn snapshot_carries_location_keys() {
		let (mut cache, _conn) = connected();
		cache.upsert(user("alice", &[])).await.unwrap();

		let snapshot = cache.snapshot();
		assert_eq!(snapshot[0].location_key, "provisioner:user:default/alice");
	}

	#[tokio::test]
	async fn upsert_without_connection_keeps_entity() {
		let mut cache = EntityCache::new("provisioner");

		cache.upsert(user("alice", &[])).await.unwrap();

		assert!(!cache.is_connected());
		assert!(cache.contains("user:default/alice"));
	}

	#[tokio::test]
	async fn publish_failure_is_returned_and_not_rolled_back() {
		let conn = Arc::new(RecordingConnection::failing());
		let mut cache = EntityCache::new("provisioner");
		cache.connect(conn.clone());

		let err = cache.upsert(user("alice", &[])).await.unwrap_err();

		assert!(matches!(err, PublishError::Unavailable { .. }));
		assert_eq!(cache.len(), 1);
		assert_eq!(conn.mutations().len(), 1, "publish must not be retried");
	}

	#[tokio::test]
	async fn remove_republishes_smaller_snapshot() {
		let (mut cache, conn) = connected();
		cache.upsert(user("alice", &[])).await.unwrap();
		cache.upsert(user("bob", &[])).await.unwrap();

		cache.remove("user:default/alice").await.unwrap();

		let mutations = conn.mutations();
		assert_eq!(mutations.len(), 3);
		assert_eq!(names(&mutations[2].entities), vec!["bob"]);
	}

	#[tokio::test]
	async fn remove_last_entity_publishes_empty_snapshot() {
		let (mut cache, conn) = connected();
		cache.upsert(user("alice", &[])).await.unwrap();

		cache.remove("user:default/alice").await.unwrap();

		assert!(cache.is_empty());
		assert!(conn.mutations().last().unwrap().entities.is_empty());
	}

	#[tokio::test]
	async fn remove_absent_key_does_not_publish() {
		let (mut cache, conn) = connected();
		cache.upsert(user("alice", &[])).await.unwrap();
		let before = cache.snapshot();

		cache.remove("user:default/nobody").await.unwrap();

		assert_eq!(cache.snapshot(), before);
		assert_eq!(conn.mutations().len(), 1);
	}

	#[tokio::test]
	async fn connect_replaces_previous_connection() {
		let (mut cache, first) = connected();
		let second = Arc::new(RecordingConnection::default());
		cache.connect(second.clone());

		cache.upsert(user("alice", &[])).await.unwrap();

		assert!(first.mutations().is_empty());
		assert_eq!(second.mutations().len(), 1);
	}

	#[tokio::test]
	async fn late_connection_publishes_everything_cached_so_far() {
		let mut cache = EntityCache::new("provisioner");
		cache.upsert(user("alice", &[])).await.unwrap();

		let conn = Arc::new(RecordingConnection::default());
		cache.connect(conn.clone());
		cache.upsert(user("bob", &[])).await.unwrap();

		assert_eq!(names(&conn.mutations()[0].entities), vec!["alice", "bob"]);
	}

	proptest! {
		#[test]
		fn snapshot_len_equals_distinct_keys(picks in proptest::collection::vec(0usize..8, 0..40)) {
			let (mut cache, conn) = connected();
			tokio_test::block_on(async {
				for pick in &picks {
					cache.upsert(user(&format!("user{pick}"), &[])).await.unwrap();
				}
			});

			let distinct: std::collections::HashSet<_> = picks.iter().collect();
			prop_assert_eq!(cache.snapshot().len(), distinct.len());
			prop_assert_eq!(conn.mutations().len(), picks.len());
		}

		#[test]
		fn last_write_wins_on_repeated_key(groups in proptest::collection::vec("[a-z]{1,6}", 1..10)) {
			let (mut cache, _conn) = connected();
			tokio_test::block_on(async {
				for group in &groups {
					let member_of = format!("group:default/{group}");
					cache.upsert(user("alice", &[member_of.as_str()])).await.unwrap();
				}
			});

			let snapshot = cache.snapshot();
			prop_assert_eq!(snapshot.len(), 1);
			let expected = format!("group:default/{}", groups.last().unwrap());
			prop_assert_eq!(&snapshot[0].entity.spec.member_of, &vec![expected]);
		}
	}
}
