// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use loom_catalog_core::{CatalogUserQuery, ResolverContext, SignInOptions, SignInResult};
use loom_catalog_provider::SharedEntityCache;
use tracing::{instrument, warn};

use super::{ResolverKind, SignInResolver};
use crate::claims::ClaimExtractor;
use crate::convergence::ConvergenceRetrier;
use crate::error::Result;
use crate::types::AuthenticationResult;

/// Provisions the signing-in user into the catalog, then waits for the
/// catalog to serve it.
///
/// 1. Build the user entity from the access token claims and profile email.
/// 2. Upsert it into the entity cache, which publishes the full snapshot.
///    A publish failure is logged and resolution continues, since the user
///    may already be visible from an earlier sign-in.
/// 3. Poll the catalog for the user until it is found or the retrier gives
///    up.
pub struct ProvisioningMatchResolver {
	extractor: ClaimExtractor,
	cache: SharedEntityCache,
	retrier: ConvergenceRetrier,
}

impl ProvisioningMatchResolver {
	/// The extractor's subsystem id should match the cache's.
	pub fn new(extractor: ClaimExtractor, cache: SharedEntityCache, retrier: ConvergenceRetrier) -> Self {
		Self {
			extractor,
			cache,
			retrier,
		}
	}
}

#[async_trait]
impl SignInResolver for ProvisioningMatchResolver {
	fn kind(&self) -> ResolverKind {
		ResolverKind::ProvisioningMatch
	}

	#[instrument(skip_all, fields(provider = %result.provider_id, user = tracing::field::Empty))]
	async fn resolve(
		&self,
		result: &AuthenticationResult,
		ctx: &dyn ResolverContext,
	) -> Result<SignInResult> {
		let entity = self
			.extractor
			.extract(result.session.access_token.expose(), &result.profile)?;
		let entity_ref = entity.entity_ref();
		tracing::Span::current().record("user", tracing::field::display(&entity_ref));

		{
			let mut cache = self.cache.lock().await;
			if let Err(e) = cache.upsert(entity).await {
				warn!(user = %entity_ref, error = %e, "failed to publish provisioned user, continuing");
			}
		}

		self
			.retrier
			.run(&entity_ref, || {
				ctx.sign_in_with_catalog_user(
					CatalogUserQuery::EntityRef(entity_ref.clone()),
					SignInOptions::default(),
				)
			})
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::claims::DEFAULT_ROLES_CLIENT;
	use crate::convergence::{ConvergencePolicy, Delay};
	use crate::error::ResolveError;
	use crate::types::{BearerToken, ProviderProfile};
	use base64::engine::general_purpose::URL_SAFE_NO_PAD;
	use base64::Engine;
	use loom_catalog_core::{
		CatalogConnection, EntityMutation, EntityRef, InMemoryCatalog, LookupError, PublishError,
	};
	use loom_catalog_provider::EntityCache;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;
	use std::time::Duration;

	struct NoDelay;

	#[async_trait]
	impl Delay for NoDelay {
		async fn sleep(&self, _duration: Duration) {}
	}

	struct BrokenConnection;

	#[async_trait]
	impl CatalogConnection for BrokenConnection {
		async fn apply_mutation(&self, _mutation: EntityMutation) -> std::result::Result<(), PublishError> {
			Err(PublishError::Unavailable {
				message: "catalog down".to_string(),
			})
		}
	}

	/// Counts lookups and always fails them with the given error.
	struct FailingContext {
		error: LookupError,
		calls: AtomicU32,
	}

	#[async_trait]
	impl ResolverContext for FailingContext {
		async fn sign_in_with_catalog_user(
			&self,
			_query: CatalogUserQuery,
			_options: SignInOptions,
		) -> std::result::Result<SignInResult, LookupError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Err(self.error.clone())
		}
	}

	const SUBSYSTEM: &str = "provisioner";

	fn auth_result(email: Option<&str>, payload: &str) -> AuthenticationResult {
		let token = format!("header.{}.signature", URL_SAFE_NO_PAD.encode(payload));
		AuthenticationResult::new(
			"oidc",
			ProviderProfile {
				email: email.map(str::to_string),
				..Default::default()
			},
			BearerToken::new(token),
		)
	}

	fn resolver(cache: SharedEntityCache) -> ProvisioningMatchResolver {
		ProvisioningMatchResolver::new(
			ClaimExtractor::new(SUBSYSTEM, DEFAULT_ROLES_CLIENT),
			cache,
			ConvergenceRetrier::with_delay(ConvergencePolicy::default(), Arc::new(NoDelay)),
		)
	}

	async fn connected_cache(catalog: &InMemoryCatalog) -> SharedEntityCache {
		let cache = EntityCache::new(SUBSYSTEM).into_shared();
		cache
			.lock()
			.await
			.connect(Arc::new(catalog.connection(SUBSYSTEM)));
		cache
	}

	#[tokio::test]
	async fn provisions_and_signs_in_new_user() {
		let catalog = InMemoryCatalog::new();
		let cache = connected_cache(&catalog).await;

		let result = resolver(cache.clone())
			.resolve(
				&auth_result(
					Some("jdoe@example.com"),
					r#"{"groups":["a"],"resource_access":{"app":{"roles":["b"]}}}"#,
				),
				&catalog,
			)
			.await
			.unwrap();

		assert_eq!(result.user_entity_ref, EntityRef::user("jdoe"));
		assert_eq!(
			result.ownership_entity_refs,
			vec![EntityRef::user("jdoe"), EntityRef::group("a"), EntityRef::group("b")]
		);
		assert!(cache.lock().await.contains("user:default/jdoe"));
	}

	#[tokio::test]
	async fn roles_with_separators_become_ownership() {
		let catalog = InMemoryCatalog::new();
		let cache = connected_cache(&catalog).await;

		let result = resolver(cache)
			.resolve(
				&auth_result(
					Some("jdoe@example.com"),
					r#"{"resource_access":{"app":{"roles":["realm:admin","team/a"]}}}"#,
				),
				&catalog,
			)
			.await
			.unwrap();

		assert_eq!(
			result.ownership_entity_refs,
			vec![
				EntityRef::user("jdoe"),
				EntityRef::group("realm:admin"),
				EntityRef::group("team/a"),
			]
		);
	}

	#[tokio::test]
	async fn waits_for_lagging_catalog() {
		let catalog = InMemoryCatalog::with_read_lag(3);
		let cache = connected_cache(&catalog).await;

		let result = resolver(cache)
			.resolve(&auth_result(Some("jdoe@example.com"), "{}"), &catalog)
			.await
			.unwrap();

		assert_eq!(result.user_entity_ref, EntityRef::user("jdoe"));
	}

	#[tokio::test]
	async fn repeated_sign_in_refreshes_memberships() {
		let catalog = InMemoryCatalog::new();
		let cache = connected_cache(&catalog).await;
		let resolver = resolver(cache.clone());

		resolver
			.resolve(&auth_result(Some("jdoe@example.com"), r#"{"groups":["old"]}"#), &catalog)
			.await
			.unwrap();
		let result = resolver
			.resolve(&auth_result(Some("jdoe@example.com"), r#"{"groups":["new"]}"#), &catalog)
			.await
			.unwrap();

		assert_eq!(
			result.ownership_entity_refs,
			vec![EntityRef::user("jdoe"), EntityRef::group("new")]
		);
		assert_eq!(cache.lock().await.len(), 1);
		assert_eq!(catalog.mutations_applied().await, 2);
	}

	#[tokio::test]
	async fn missing_email_aborts_before_provisioning() {
		let catalog = InMemoryCatalog::new();
		let cache = connected_cache(&catalog).await;

		let err = resolver(cache.clone())
			.resolve(&auth_result(None, "{}"), &catalog)
			.await
			.unwrap_err();

		assert_eq!(err, ResolveError::MissingEmail);
		assert!(cache.lock().await.is_empty());
		assert_eq!(catalog.mutations_applied().await, 0);
	}

	#[tokio::test]
	async fn malformed_token_aborts_resolution() {
		let catalog = InMemoryCatalog::new();
		let cache = connected_cache(&catalog).await;
		let mut result = auth_result(Some("jdoe@example.com"), "{}");
		result.session.access_token = BearerToken::new("opaque-token");

		let err = resolver(cache)
			.resolve(&result, &catalog)
			.await
			.unwrap_err();

		assert!(matches!(err, ResolveError::MalformedToken(_)));
	}

	#[tokio::test]
	async fn publish_failure_does_not_abort_when_user_already_visible() {
		let catalog = InMemoryCatalog::new();
		catalog
			.insert(loom_catalog_core::Entity::user("default", "jdoe", Default::default()))
			.await;
		let cache = EntityCache::new(SUBSYSTEM).into_shared();
		cache.lock().await.connect(Arc::new(BrokenConnection));

		let result = resolver(cache.clone())
			.resolve(&auth_result(Some("jdoe@example.com"), "{}"), &catalog)
			.await
			.unwrap();

		assert_eq!(result.user_entity_ref, EntityRef::user("jdoe"));
		assert!(cache.lock().await.contains("user:default/jdoe"));
	}

	#[tokio::test]
	async fn unpublished_user_does_not_converge() {
		let catalog = InMemoryCatalog::new();
		let cache = EntityCache::new(SUBSYSTEM).into_shared();
		cache.lock().await.connect(Arc::new(BrokenConnection));

		let err = resolver(cache)
			.resolve(&auth_result(Some("jdoe@example.com"), "{}"), &catalog)
			.await
			.unwrap_err();

		assert_eq!(
			err,
			ResolveError::NotConverged {
				reference: EntityRef::user("jdoe"),
				attempts: 10,
			}
		);
	}

	#[tokio::test]
	async fn hard_lookup_failure_is_not_retried() {
		let cache = EntityCache::new(SUBSYSTEM).into_shared();
		let ctx = FailingContext {
			error: LookupError::Catalog("permission denied".to_string()),
			calls: AtomicU32::new(0),
		};

		let err = resolver(cache)
			.resolve(&auth_result(Some("jdoe@example.com"), "{}"), &ctx)
			.await
			.unwrap_err();

		assert_eq!(
			err,
			ResolveError::Lookup(LookupError::Catalog("permission denied".to_string()))
		);
		assert_eq!(ctx.calls.load(Ordering::SeqCst), 1);
	}
}
