// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use loom_catalog_core::{CatalogUserQuery, EntityRef, ResolverContext, SignInResult};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{sign_in, ResolverKind, SignInResolver};
use crate::claims::TokenClaims;
use crate::error::{ResolveError, Result};
use crate::types::AuthenticationResult;

/// Annotation holding a user's UUID.
pub const ANNOTATION_USER_UUID: &str = "loom.dev/user-uuid";

/// ID token claim carrying the user's UUID.
pub const UUID_CLAIM: &str = "uuid";

/// Signs in the user annotated with a UUID that both the provider profile and
/// the ID token agree on.
///
/// The profile and the ID token are obtained separately, so a disagreement
/// means one of them cannot be trusted and sign-in is refused outright. The
/// dangerous fallback is never applied to a mismatch.
#[derive(Debug, Clone, Default)]
pub struct UuidCrossCheckResolver {
	dangerous_fallback: bool,
}

impl UuidCrossCheckResolver {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sign in `user:default/<uuid>` when no user carries the verified UUID.
	pub fn dangerous_fallback(mut self, enabled: bool) -> Self {
		self.dangerous_fallback = enabled;
		self
	}
}

/// The agreed UUID in canonical form, or the raw value when neither side
/// parses as a UUID but both are identical.
fn cross_check(profile: &str, token: &str) -> Result<String> {
	match (Uuid::parse_str(profile), Uuid::parse_str(token)) {
		(Ok(a), Ok(b)) if a == b => Ok(a.to_string()),
		(Err(_), Err(_)) if profile == token => Ok(profile.to_string()),
		_ => Err(ResolveError::UuidMismatch {
			profile: profile.to_string(),
			token: token.to_string(),
		}),
	}
}

#[async_trait]
impl SignInResolver for UuidCrossCheckResolver {
	fn kind(&self) -> ResolverKind {
		ResolverKind::UuidCrossCheckMatchingUserEntityAnnotation
	}

	#[instrument(skip_all, fields(provider = %result.provider_id))]
	async fn resolve(
		&self,
		result: &AuthenticationResult,
		ctx: &dyn ResolverContext,
	) -> Result<SignInResult> {
		let profile_uuid = result
			.profile
			.uuid
			.as_deref()
			.filter(|u| !u.is_empty())
			.ok_or(ResolveError::MissingClaim(UUID_CLAIM))?;

		// Without an ID token there is no second source for the UUID.
		let id_token = result
			.session
			.id_token
			.as_ref()
			.ok_or(ResolveError::MissingClaim(UUID_CLAIM))?;
		let claims = TokenClaims::decode(id_token.expose())?;
		let token_uuid = claims
			.string(UUID_CLAIM)
			.filter(|u| !u.is_empty())
			.ok_or(ResolveError::MissingClaim(UUID_CLAIM))?;

		let uuid = cross_check(profile_uuid, token_uuid).inspect_err(|e| {
			warn!(error = %e, "refusing sign-in");
		})?;

		let fallback = self.dangerous_fallback.then(|| EntityRef::user(&uuid));
		sign_in(
			ctx,
			CatalogUserQuery::annotation(ANNOTATION_USER_UUID, uuid),
			fallback,
		)
		.await
	}
}
