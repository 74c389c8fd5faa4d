// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use loom_catalog_core::{CatalogUserQuery, EntityRef, ResolverContext, SignInResult};
use tracing::instrument;

use super::{sign_in, ResolverKind, SignInResolver};
use crate::error::{ResolveError, Result};
use crate::types::AuthenticationResult;

/// Annotation holding a user's subject identifier at `provider_id`.
pub fn provider_id_annotation(provider_id: &str) -> String {
	format!("loom.dev/{provider_id}-user-id")
}

/// Signs in the user annotated with the provider's subject identifier.
#[derive(Debug, Clone, Default)]
pub struct ProviderIdMatchResolver {
	dangerous_fallback: bool,
}

impl ProviderIdMatchResolver {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sign in `user:default/<subject>` when no user carries the annotation.
	pub fn dangerous_fallback(mut self, enabled: bool) -> Self {
		self.dangerous_fallback = enabled;
		self
	}
}

#[async_trait]
impl SignInResolver for ProviderIdMatchResolver {
	fn kind(&self) -> ResolverKind {
		ResolverKind::ProviderIdMatchingUserEntityAnnotation
	}

	#[instrument(skip_all, fields(provider = %result.provider_id))]
	async fn resolve(
		&self,
		result: &AuthenticationResult,
		ctx: &dyn ResolverContext,
	) -> Result<SignInResult> {
		let subject = result
			.profile
			.subject
			.as_deref()
			.filter(|s| !s.is_empty())
			.ok_or(ResolveError::MissingClaim("subject"))?;

		let query =
			CatalogUserQuery::annotation(provider_id_annotation(&result.provider_id), subject);
		let fallback = self.dangerous_fallback.then(|| EntityRef::user(subject));
		sign_in(ctx, query, fallback).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{BearerToken, ProviderProfile};
	use loom_catalog_core::{Entity, InMemoryCatalog, LookupError};

	fn result(provider: &str, subject: Option<&str>) -> AuthenticationResult {
		AuthenticationResult::new(
			provider,
			ProviderProfile {
				subject: subject.map(str::to_string),
				..Default::default()
			},
			BearerToken::new("opaque"),
		)
	}

	fn annotated(name: &str, provider: &str, subject: &str) -> Entity {
		Entity::user("default", name, Default::default())
			.with_annotation(provider_id_annotation(provider), subject)
	}

	#[test]
	fn annotation_is_scoped_to_provider() {
		assert_eq!(provider_id_annotation("google"), "loom.dev/google-user-id");
	}

	#[tokio::test]
	async fn signs_in_annotated_user() {
		let catalog = InMemoryCatalog::new();
		catalog.insert(annotated("alice", "google", "10769150350006150715113082367")).await;
		catalog.insert(annotated("bob", "github", "10769150350006150715113082367")).await;

		let signed_in = ProviderIdMatchResolver::new()
			.resolve(&result("google", Some("10769150350006150715113082367")), &catalog)
			.await
			.unwrap();

		assert_eq!(signed_in.user_entity_ref, EntityRef::user("alice"));
	}

	#[tokio::test]
	async fn duplicate_annotation_is_ambiguous() {
		let catalog = InMemoryCatalog::new();
		catalog.insert(annotated("alice", "google", "42")).await;
		catalog.insert(annotated("alice2", "google", "42")).await;

		let err = ProviderIdMatchResolver::new()
			.dangerous_fallback(true)
			.resolve(&result("google", Some("42")), &catalog)
			.await
			.unwrap_err();

		assert!(matches!(
			err,
			ResolveError::Lookup(LookupError::Ambiguous { count: 2, .. })
		));
	}

	#[tokio::test]
	async fn dangerous_fallback_uses_subject_as_name() {
		let catalog = InMemoryCatalog::new();

		let signed_in = ProviderIdMatchResolver::new()
			.dangerous_fallback(true)
			.resolve(&result("google", Some("42")), &catalog)
			.await
			.unwrap();

		assert_eq!(signed_in, SignInResult::bare(EntityRef::user("42")));
	}

	#[tokio::test]
	async fn missing_subject_fails() {
		let catalog = InMemoryCatalog::new();

		let err = ProviderIdMatchResolver::new()
			.resolve(&result("google", None), &catalog)
			.await
			.unwrap_err();

		assert_eq!(err, ResolveError::MissingClaim("subject"));
	}
}
