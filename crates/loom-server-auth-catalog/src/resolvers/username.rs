// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use loom_catalog_core::{CatalogUserQuery, EntityRef, ResolverContext, SignInResult};
use tracing::instrument;

use super::{sign_in, ResolverKind, SignInResolver};
use crate::error::{ResolveError, Result};
use crate::types::AuthenticationResult;

/// Signs in `user:default/<username>` using the profile's preferred username.
#[derive(Debug, Clone, Default)]
pub struct UsernameMatchResolver {
	dangerous_fallback: bool,
}

impl UsernameMatchResolver {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sign in the bare reference when the user has no catalog record.
	pub fn dangerous_fallback(mut self, enabled: bool) -> Self {
		self.dangerous_fallback = enabled;
		self
	}
}

#[async_trait]
impl SignInResolver for UsernameMatchResolver {
	fn kind(&self) -> ResolverKind {
		ResolverKind::UsernameMatchingUserEntityName
	}

	#[instrument(skip_all, fields(provider = %result.provider_id))]
	async fn resolve(
		&self,
		result: &AuthenticationResult,
		ctx: &dyn ResolverContext,
	) -> Result<SignInResult> {
		let username = result
			.profile
			.username
			.as_deref()
			.map(str::trim)
			.filter(|u| !u.is_empty())
			.ok_or(ResolveError::MissingClaim("username"))?;

		let entity_ref = EntityRef::user(username);
		let fallback = self.dangerous_fallback.then(|| entity_ref.clone());
		sign_in(ctx, CatalogUserQuery::EntityRef(entity_ref), fallback).await
	}
}
