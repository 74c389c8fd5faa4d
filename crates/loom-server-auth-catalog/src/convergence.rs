// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Waiting for the catalog to catch up with a provisioning write.
//!
//! The catalog ingests published entities asynchronously, so a lookup issued
//! right after provisioning can miss a user that was provisioned correctly.
//! [`ConvergenceRetrier`] polls the lookup at a fixed interval until the user
//! shows up, the attempts run out, or the lookup fails for another reason.
//!
//! ```text
//!              ┌──────────── sleep(interval) ───────────┐
//!              ▼                                        │
//!          Pending ──lookup──┬── found ─────────► Found │
//!                            ├── not found ─┬──► NotFoundRetry
//!                            │              └──► NotConverged   (attempts == max)
//!                            └── other error ──► OtherFailure
//! ```

use async_trait::async_trait;
use loom_catalog_core::{EntityRef, LookupError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ResolveError, Result};

/// Maximum number of lookups before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Pause between a not-found lookup and the next attempt.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
	pub max_attempts: u32,
	pub interval: Duration,
}

impl Default for ConvergencePolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			interval: DEFAULT_RETRY_INTERVAL,
		}
	}
}

/// How a single lookup attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
	Found,
	NotFound,
	OtherFailure,
}

impl AttemptOutcome {
	pub fn of<T>(result: &std::result::Result<T, LookupError>) -> Self {
		match result {
			Ok(_) => AttemptOutcome::Found,
			Err(e) if e.is_not_found() => AttemptOutcome::NotFound,
			Err(_) => AttemptOutcome::OtherFailure,
		}
	}
}

/// State of a convergence wait. `attempts` counts completed lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
	Pending { attempts: u32 },
	NotFoundRetry { attempts: u32 },
	Found { attempts: u32 },
	OtherFailure { attempts: u32 },
	NotConverged { attempts: u32 },
}

impl ConvergenceState {
	/// The state before the first lookup.
	pub fn start() -> Self {
		ConvergenceState::Pending { attempts: 0 }
	}

	pub fn attempts(&self) -> u32 {
		match *self {
			ConvergenceState::Pending { attempts }
			| ConvergenceState::NotFoundRetry { attempts }
			| ConvergenceState::Found { attempts }
			| ConvergenceState::OtherFailure { attempts }
			| ConvergenceState::NotConverged { attempts } => attempts,
		}
	}

	/// Back to `Pending` once the retry delay has elapsed. Any other state is
	/// returned unchanged.
	pub fn resume(self) -> Self {
		match self {
			ConvergenceState::NotFoundRetry { attempts } => ConvergenceState::Pending { attempts },
			other => other,
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			ConvergenceState::Found { .. }
				| ConvergenceState::OtherFailure { .. }
				| ConvergenceState::NotConverged { .. }
		)
	}
}

impl ConvergencePolicy {
	/// The state after a lookup made from `state` ended with `outcome`.
	///
	/// Only `Pending` makes a lookup; any other state is returned unchanged.
	pub fn after_attempt(&self, state: ConvergenceState, outcome: AttemptOutcome) -> ConvergenceState {
		let ConvergenceState::Pending { attempts } = state else {
			return state;
		};
		let attempts = attempts + 1;
		match outcome {
			AttemptOutcome::Found => ConvergenceState::Found { attempts },
			AttemptOutcome::OtherFailure => ConvergenceState::OtherFailure { attempts },
			AttemptOutcome::NotFound if attempts >= self.max_attempts => {
				ConvergenceState::NotConverged { attempts }
			}
			AttemptOutcome::NotFound => ConvergenceState::NotFoundRetry { attempts },
		}
	}
}

/// Suspends the current task. Injected so tests need not wait in real time.
#[async_trait]
pub trait Delay: Send + Sync {
	async fn sleep(&self, duration: Duration);
}

/// [`Delay`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
	async fn sleep(&self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}
}

/// Polls a catalog lookup until the looked-up user becomes visible.
#[derive(Clone)]
pub struct ConvergenceRetrier {
	policy: ConvergencePolicy,
	delay: Arc<dyn Delay>,
}

impl Default for ConvergenceRetrier {
	fn default() -> Self {
		Self::new(ConvergencePolicy::default())
	}
}

impl std::fmt::Debug for ConvergenceRetrier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConvergenceRetrier")
			.field("policy", &self.policy)
			.finish_non_exhaustive()
	}
}

impl ConvergenceRetrier {
	pub fn new(policy: ConvergencePolicy) -> Self {
		Self::with_delay(policy, Arc::new(TokioDelay))
	}

	pub fn with_delay(policy: ConvergencePolicy, delay: Arc<dyn Delay>) -> Self {
		Self { policy, delay }
	}

	pub fn policy(&self) -> &ConvergencePolicy {
		&self.policy
	}

	/// Run `lookup` until it succeeds.
	///
	/// Not-found failures are retried after the policy interval until
	/// `max_attempts` lookups have been made, then the wait fails with
	/// [`ResolveError::NotConverged`]. Any other failure is returned after the
	/// attempt that produced it.
	pub async fn run<F, Fut, T>(&self, reference: &EntityRef, mut lookup: F) -> Result<T>
	where
		F: FnMut() -> Fut + Send,
		Fut: Future<Output = std::result::Result<T, LookupError>> + Send,
		T: Send,
	{
		let mut state = ConvergenceState::start();

		loop {
			let result = lookup().await;
			state = self.policy.after_attempt(state, AttemptOutcome::of(&result));

			match (state, result) {
				(_, Ok(value)) => {
					if state.attempts() > 1 {
						debug!(reference = %reference, attempts = state.attempts(), "catalog converged");
					}
					return Ok(value);
				}
				(ConvergenceState::NotFoundRetry { attempts: made }, Err(_)) => {
					debug!(
						reference = %reference,
						attempt = made,
						max_attempts = self.policy.max_attempts,
						delay_ms = self.policy.interval.as_millis() as u64,
						"user not yet visible in catalog, retrying"
					);
					self.delay.sleep(self.policy.interval).await;
					state = state.resume();
				}
				(ConvergenceState::NotConverged { attempts: made }, Err(_)) => {
					warn!(reference = %reference, attempts = made, "catalog did not converge");
					return Err(ResolveError::NotConverged {
						reference: reference.clone(),
						attempts: made,
					});
				}
				(_, Err(err)) => {
					warn!(reference = %reference, error = %err, "catalog lookup failed");
					return Err(err.into());
				}
			}
		}
	}
}
