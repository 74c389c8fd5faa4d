// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Catalog entity model and contracts for Loom user provisioning.
//!
//! This crate provides:
//! - [`Entity`], [`EntityRef`], [`DeferredEntity`] - the records the catalog stores
//! - [`CatalogConnection`] - how a provider publishes full-state mutations
//! - [`ResolverContext`] - how resolvers sign users in against the catalog
//! - [`InMemoryCatalog`] - an in-memory implementation of both contracts

pub mod connection;
pub mod context;
pub mod entity;
pub mod error;
pub mod memory;

pub use connection::{CatalogConnection, EntityMutation, MutationKind, SharedCatalogConnection};
pub use context::{CatalogUserQuery, ResolverContext, SignInOptions, SignInResult};
pub use entity::{
	location_key, DeferredEntity, Entity, EntityMetadata, EntityRef, UserEntitySpec, UserProfile,
	ANNOTATION_MANAGED_BY_LOCATION, ANNOTATION_MANAGED_BY_ORIGIN_LOCATION, DEFAULT_NAMESPACE,
	ENTITY_API_VERSION, GROUP_KIND, USER_KIND,
};
pub use error::{CatalogError, CatalogResult, LookupError, PublishError};
pub use memory::{InMemoryCatalog, SourceConnection};
