//! Single-flight protection for command execution.
//!
//! The guard belongs to the caller. A second invocation while one is still
//! pending is rejected immediately, never queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Another invocation is still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a command is already running")]
pub struct AlreadyRunning;

/// Rejects overlapping invocations.
#[derive(Debug, Default)]
pub struct InvocationGuard {
	running: AtomicBool,
}

/// Proof that the holder owns the guard. Dropping it releases the guard.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the ticket is dropped"]
pub struct Invocation<'a> {
	guard: &'a InvocationGuard,
}

impl InvocationGuard {
	/// Creates an idle guard.
	pub const fn new() -> Self {
		Self {
			running: AtomicBool::new(false),
		}
	}

	/// Claims the guard, failing at once if it is already held.
	pub fn try_begin(&self) -> Result<Invocation<'_>, AlreadyRunning> {
		self.running
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.map(|_| Invocation { guard: self })
			.map_err(|_| {
				tracing::warn!("invocation rejected: already running");
				AlreadyRunning
			})
	}

	/// Whether an invocation currently holds the guard.
	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	/// Runs `fut` while holding the guard.
	pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, AlreadyRunning> {
		let _ticket = self.try_begin()?;
		Ok(fut.await)
	}
}

impl Drop for Invocation<'_> {
	fn drop(&mut self) {
		self.guard.running.store(false, Ordering::Release);
	}
}
