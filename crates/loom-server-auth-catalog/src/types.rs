// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authentication result handed to resolvers.
//!
//! This module provides:
//! - [`AuthenticationResult`] - everything the upstream auth handshake produced
//! - [`ProviderProfile`] - user attributes reported by the identity provider
//! - [`ProviderSession`] - the tokens issued for the session
//! - [`BearerToken`] - a token that is redacted in output and zeroized on drop

use http::HeaderMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Placeholder printed instead of token values.
pub const REDACTED: &str = "[REDACTED]";

/// A bearer token (access token, ID token).
///
/// Debug output is redacted and the value is zeroized when dropped. Use
/// [`BearerToken::expose`] to read it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BearerToken(String);

impl BearerToken {
	pub fn new(token: impl Into<String>) -> Self {
		Self(token.into())
	}

	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for BearerToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "BearerToken({REDACTED:?})")
	}
}

/// User attributes reported by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProfile {
	pub email: Option<String>,
	pub display_name: Option<String>,
	/// Preferred username, if the provider reports one.
	pub username: Option<String>,
	/// The provider's subject identifier for the user.
	pub subject: Option<String>,
	/// The user's UUID as reported by the provider's userinfo endpoint.
	pub uuid: Option<String>,
}

/// Tokens issued for the session.
#[derive(Debug, Clone)]
pub struct ProviderSession {
	pub access_token: BearerToken,
	/// Separately signed OIDC ID token, if the provider issued one.
	pub id_token: Option<BearerToken>,
}

/// Result of a completed upstream authentication.
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
	/// Identifier of the auth provider that produced the result (e.g. "oidc").
	pub provider_id: String,
	pub profile: ProviderProfile,
	pub session: ProviderSession,
	/// Headers of the request that completed authentication.
	pub headers: HeaderMap,
}

impl AuthenticationResult {
	/// A result with the given access token and no ID token or headers.
	pub fn new(
		provider_id: impl Into<String>,
		profile: ProviderProfile,
		access_token: BearerToken,
	) -> Self {
		Self {
			provider_id: provider_id.into(),
			profile,
			session: ProviderSession {
				access_token,
				id_token: None,
			},
			headers: HeaderMap::new(),
		}
	}

	pub fn with_id_token(mut self, id_token: BearerToken) -> Self {
		self.session.id_token = Some(id_token);
		self
	}

	pub fn with_headers(mut self, headers: HeaderMap) -> Self {
		self.headers = headers;
		self
	}
}
