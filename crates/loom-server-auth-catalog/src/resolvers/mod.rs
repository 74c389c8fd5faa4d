// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sign-in resolvers.
//!
//! A resolver maps an [`AuthenticationResult`] to a catalog user and signs
//! that user in through a [`ResolverContext`].
//!
//! | Kind | Looks up |
//! |------|----------|
//! | `provisioningMatch` | user provisioned from token claims, waiting for the catalog to converge |
//! | `usernameMatchingUserEntityName` | `user:default/<profile username>` |
//! | `headerMatchingUserEntityName` | `user:default/<header value>` |
//! | `providerIdMatchingUserEntityAnnotation` | annotation `loom.dev/<provider>-user-id` = subject |
//! | `uuidCrossCheckMatchingUserEntityAnnotation` | annotation `loom.dev/user-uuid` = verified UUID |
//!
//! Every kind except `provisioningMatch` honours the dangerous fallback.

mod header;
mod provider_id;
mod provisioning;
mod username;
mod uuid_check;

pub use header::HeaderMatchResolver;
pub use provider_id::{provider_id_annotation, ProviderIdMatchResolver};
pub use provisioning::ProvisioningMatchResolver;
pub use username::UsernameMatchResolver;
pub use uuid_check::{UuidCrossCheckResolver, ANNOTATION_USER_UUID, UUID_CLAIM};

use async_trait::async_trait;
use loom_catalog_core::{CatalogUserQuery, EntityRef, ResolverContext, SignInOptions, SignInResult};
use loom_catalog_provider::SharedEntityCache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::claims::ClaimExtractor;
use crate::config::{CatalogAuthConfig, HeaderResolverConfig};
use crate::error::ConfigError;
use crate::convergence::ConvergenceRetrier;
use crate::error::Result;
use crate::types::AuthenticationResult;

/// Maps an authentication result to a signed-in catalog user.
#[async_trait]
pub trait SignInResolver: Send + Sync {
	fn kind(&self) -> ResolverKind;

	async fn resolve(
		&self,
		result: &AuthenticationResult,
		ctx: &dyn ResolverContext,
	) -> Result<SignInResult>;
}

/// Shared reference to a resolver.
pub type SharedSignInResolver = Arc<dyn SignInResolver>;

/// The available resolvers, by configuration name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolverKind {
	ProvisioningMatch,
	UsernameMatchingUserEntityName,
	HeaderMatchingUserEntityName,
	ProviderIdMatchingUserEntityAnnotation,
	UuidCrossCheckMatchingUserEntityAnnotation,
}

impl ResolverKind {
	pub fn all() -> &'static [ResolverKind] {
		&[
			ResolverKind::ProvisioningMatch,
			ResolverKind::UsernameMatchingUserEntityName,
			ResolverKind::HeaderMatchingUserEntityName,
			ResolverKind::ProviderIdMatchingUserEntityAnnotation,
			ResolverKind::UuidCrossCheckMatchingUserEntityAnnotation,
		]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			ResolverKind::ProvisioningMatch => "provisioningMatch",
			ResolverKind::UsernameMatchingUserEntityName => "usernameMatchingUserEntityName",
			ResolverKind::HeaderMatchingUserEntityName => "headerMatchingUserEntityName",
			ResolverKind::ProviderIdMatchingUserEntityAnnotation => {
				"providerIdMatchingUserEntityAnnotation"
			}
			ResolverKind::UuidCrossCheckMatchingUserEntityAnnotation => {
				"uuidCrossCheckMatchingUserEntityAnnotation"
			}
		}
	}
}

impl fmt::Display for ResolverKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown resolver name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sign-in resolver: {0}")]
pub struct UnknownResolver(pub String);

impl FromStr for ResolverKind {
	type Err = UnknownResolver;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		ResolverKind::all()
			.iter()
			.copied()
			.find(|kind| kind.as_str() == s)
			.ok_or_else(|| UnknownResolver(s.to_string()))
	}
}

/// Builds resolvers that share one configuration, entity cache and retrier.
///
/// The cache is created once at startup and injected here; every
/// provisioning resolver built by the factory publishes through it.
///
/// [`ResolverFactory::new`] reads the built-in header list. Use
/// [`ResolverFactory::from_env`] (or [`ResolverFactory::with_header_config`])
/// to honour `LOOM_SERVER_AUTH_CATALOG_USER_HEADER`.
#[derive(Clone)]
pub struct ResolverFactory {
	config: CatalogAuthConfig,
	header_config: HeaderResolverConfig,
	cache: SharedEntityCache,
	retrier: ConvergenceRetrier,
}

impl ResolverFactory {
	pub fn new(config: CatalogAuthConfig, cache: SharedEntityCache) -> Self {
		Self {
			config,
			header_config: HeaderResolverConfig::default(),
			cache,
			retrier: ConvergenceRetrier::default(),
		}
	}

	/// Load both the catalog and header configuration from the environment.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::InvalidConfig`] if the catalog configuration is
	/// invalid.
	pub fn from_env(cache: SharedEntityCache) -> std::result::Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok(), cache)
	}

	fn from_lookup(
		get: impl Fn(&str) -> Option<String>,
		cache: SharedEntityCache,
	) -> std::result::Result<Self, ConfigError> {
		let config = CatalogAuthConfig::from_lookup(&get)?;
		Ok(Self::new(config, cache).with_header_config(HeaderResolverConfig::from_lookup(&get)))
	}

	pub fn with_header_config(mut self, header_config: HeaderResolverConfig) -> Self {
		self.header_config = header_config;
		self
	}

	pub fn with_retrier(mut self, retrier: ConvergenceRetrier) -> Self {
		self.retrier = retrier;
		self
	}

	pub fn build(&self, kind: ResolverKind) -> SharedSignInResolver {
		let fallback = self.config.dangerous_entity_ref_fallback;
		match kind {
			ResolverKind::ProvisioningMatch => Arc::new(ProvisioningMatchResolver::new(
				ClaimExtractor::new(&self.config.subsystem_id, &self.config.roles_client),
				self.cache.clone(),
				self.retrier.clone(),
			)),
			ResolverKind::UsernameMatchingUserEntityName => {
				Arc::new(UsernameMatchResolver::new().dangerous_fallback(fallback))
			}
			ResolverKind::HeaderMatchingUserEntityName => Arc::new(
				HeaderMatchResolver::new(self.header_config.clone()).dangerous_fallback(fallback),
			),
			ResolverKind::ProviderIdMatchingUserEntityAnnotation => {
				Arc::new(ProviderIdMatchResolver::new().dangerous_fallback(fallback))
			}
			ResolverKind::UuidCrossCheckMatchingUserEntityAnnotation => {
				Arc::new(UuidCrossCheckResolver::new().dangerous_fallback(fallback))
			}
		}
	}

	/// Build a resolver from its configuration name.
	pub fn build_named(&self, name: &str) -> std::result::Result<SharedSignInResolver, UnknownResolver> {
		Ok(self.build(name.parse()?))
	}
}

/// Sign in through the context, attaching a bare fallback reference when the
/// resolver allows it.
async fn sign_in(
	ctx: &dyn ResolverContext,
	query: CatalogUserQuery,
	fallback: Option<EntityRef>,
) -> Result<SignInResult> {
	let options = SignInOptions {
		dangerous_entity_ref_fallback: fallback,
	};
	Ok(ctx.sign_in_with_catalog_user(query, options).await?)
}
