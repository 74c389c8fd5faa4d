// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Catalog-backed sign-in for Loom.
//!
//! After an upstream provider authenticates a user, a [`SignInResolver`]
//! decides which catalog user the session belongs to. The provisioning
//! resolver goes further: it creates (or refreshes) the user entity from the
//! token's claims, publishes it through the shared [`EntityCache`], and waits
//! for the eventually consistent catalog to serve it before signing in.
//!
//! # Example
//!
//! ```ignore
//! use loom_catalog_provider::EntityCache;
//! use loom_server_auth_catalog::{CatalogAuthConfig, ResolverFactory, ResolverKind};
//!
//! let config = CatalogAuthConfig::from_env()?;
//! let cache = EntityCache::new(&config.subsystem_id).into_shared();
//! cache.lock().await.connect(connection);
//!
//! let resolver = ResolverFactory::new(config, cache).build(ResolverKind::ProvisioningMatch);
//! let signed_in = resolver.resolve(&auth_result, &ctx).await?;
//! ```
//!
//! [`EntityCache`]: loom_catalog_provider::EntityCache

pub mod claims;
pub mod config;
pub mod convergence;
pub mod error;
pub mod resolvers;
pub mod types;

pub use claims::{user_name_from_email, ClaimExtractor, StringListClaim, TokenClaims, DEFAULT_ROLES_CLIENT};
pub use config::{CatalogAuthConfig, HeaderResolverConfig};
pub use convergence::{
	AttemptOutcome, ConvergencePolicy, ConvergenceRetrier, ConvergenceState, Delay, TokioDelay,
};
pub use error::{ConfigError, ResolveError, Result};
pub use resolvers::{
	provider_id_annotation, HeaderMatchResolver, ProviderIdMatchResolver, ProvisioningMatchResolver,
	ResolverFactory, ResolverKind, SharedSignInResolver, SignInResolver, UnknownResolver,
	UsernameMatchResolver, UuidCrossCheckResolver, ANNOTATION_USER_UUID, UUID_CLAIM,
};
pub use types::{AuthenticationResult, BearerToken, ProviderProfile, ProviderSession};
