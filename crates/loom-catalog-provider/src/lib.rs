// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entity provider for users provisioned at sign-in.
//!
//! The [`EntityCache`] is the authoritative set of users this subsystem has
//! provisioned. Every change republishes the whole set to the catalog as a
//! single full mutation, so the catalog never has to reconcile deltas and a
//! missed publish is repaired by the next one.

mod cache;

pub use cache::{EntityCache, SharedEntityCache};
