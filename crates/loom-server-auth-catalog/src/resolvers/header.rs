// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use http::HeaderMap;
use loom_catalog_core::{CatalogUserQuery, EntityRef, ResolverContext, SignInResult};
use tracing::{debug, instrument};

use super::{sign_in, ResolverKind, SignInResolver};
use crate::config::HeaderResolverConfig;
use crate::error::{ResolveError, Result};
use crate::types::AuthenticationResult;

/// Signs in `user:default/<value>` where the value comes from a request
/// header set by a trusted proxy.
#[derive(Debug, Clone)]
pub struct HeaderMatchResolver {
	config: HeaderResolverConfig,
	dangerous_fallback: bool,
}

impl HeaderMatchResolver {
	pub fn new(config: HeaderResolverConfig) -> Self {
		Self {
			config,
			dangerous_fallback: false,
		}
	}

	/// Sign in the bare reference when the user has no catalog record.
	pub fn dangerous_fallback(mut self, enabled: bool) -> Self {
		self.dangerous_fallback = enabled;
		self
	}

	/// First configured header carrying a non-empty UTF-8 value.
	fn username<'a>(&self, headers: &'a HeaderMap) -> Option<(&str, &'a str)> {
		self.config.headers.iter().find_map(|name| {
			let value = headers.get(name.as_str())?.to_str().ok()?.trim();
			(!value.is_empty()).then_some((name.as_str(), value))
		})
	}
}

#[async_trait]
impl SignInResolver for HeaderMatchResolver {
	fn kind(&self) -> ResolverKind {
		ResolverKind::HeaderMatchingUserEntityName
	}

	#[instrument(skip_all, fields(provider = %result.provider_id))]
	async fn resolve(
		&self,
		result: &AuthenticationResult,
		ctx: &dyn ResolverContext,
	) -> Result<SignInResult> {
		let (header, username) = self
			.username(&result.headers)
			.ok_or(ResolveError::MissingClaim("username header"))?;
		debug!(header, "resolved username from header");

		let entity_ref = EntityRef::user(username);
		let fallback = self.dangerous_fallback.then(|| entity_ref.clone());
		sign_in(ctx, CatalogUserQuery::EntityRef(entity_ref), fallback).await
	}
}
