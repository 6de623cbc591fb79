//! Running one ex command against a fresh engine.
//!
//! Every invocation launches its own engine, loads the content, tags each
//! cursor with markers, runs the command, reads text and markers back, and
//! tears the engine down on every exit path.

use tracing::Instrument;

use crate::config::EngineConfig;
use crate::engine::{EngineApi, EngineError};
use crate::error::{FilterError, Result};
use crate::launcher::{EngineLauncher, ProcessLauncher};
use crate::marker::{MarkerTracker, TrackedCursor};
use crate::position::{CursorSpec, ExecutionResult};

/// Runs `command` over `content` once per cursor, or once globally when
/// `cursors` is empty.
///
/// A cursor with a selection runs the command restricted to `'<,'>`. The
/// returned `cursor_positions` has one slot per input cursor, in order; a
/// slot is `None` when the command deleted that cursor's text.
pub async fn execute(
	launcher: &dyn EngineLauncher,
	content: &[String],
	command: &str,
	cursors: &[CursorSpec],
) -> Result<ExecutionResult> {
	let span = tracing::debug_span!("filter.execute", %command, cursors = cursors.len());
	async move {
		let session = launcher.launch().await?;
		let result = run(session.api(), content, command, cursors).await;
		session.teardown().await;
		match &result {
			Ok(out) => tracing::debug!(lines = out.lines.len(), "execution finished"),
			Err(error) => tracing::debug!(%error, "execution failed"),
		}
		result
	}
	.instrument(span)
	.await
}

async fn run(api: &dyn EngineApi, content: &[String], command: &str, cursors: &[CursorSpec]) -> Result<ExecutionResult> {
	api.set_lines(content).await?;
	tracing::debug!(lines = content.len(), "content loaded");

	let tracker = MarkerTracker::new(api).await?;
	let mut tracked = Vec::with_capacity(cursors.len());
	for spec in cursors {
		tracked.push(tracker.track(api, spec, content).await?);
	}

	if tracked.is_empty() {
		run_command(api, command.to_owned()).await?;
	}
	for (index, cursor) in tracked.iter().enumerate() {
		run_at_cursor(api, &tracker, index, cursor, command).await?;
	}

	let lines = api.get_lines().await?;
	let mut cursor_positions = Vec::with_capacity(tracked.len());
	for cursor in &tracked {
		cursor_positions.push(tracker.resolve(api, cursor.cursor).await);
	}

	Ok(ExecutionResult { lines, cursor_positions })
}

async fn run_at_cursor(
	api: &dyn EngineApi,
	tracker: &MarkerTracker,
	index: usize,
	cursor: &TrackedCursor,
	command: &str,
) -> Result<()> {
	let Some(at) = tracker.resolve(api, cursor.cursor).await else {
		tracing::debug!(cursor = index, "cursor orphaned, skipping");
		return Ok(());
	};
	api.set_cursor(at).await?;

	let effective = match cursor.selection {
		Some((start, end)) => {
			let (Some(start), Some(end)) = (tracker.resolve(api, start).await, tracker.resolve(api, end).await) else {
				tracing::debug!(cursor = index, "selection orphaned, skipping");
				return Ok(());
			};
			api.set_mark('<', start).await?;
			api.set_mark('>', end).await?;
			format!("'<,'>{command}")
		}
		None => command.to_owned(),
	};

	tracing::debug!(cursor = index, %at, command = %effective, "running command");
	run_command(api, effective).await
}

async fn run_command(api: &dyn EngineApi, command: String) -> Result<()> {
	match api.command(&command).await {
		Ok(()) => Ok(()),
		Err(EngineError::Rejected(message)) => {
			tracing::debug!(%command, %message, "engine rejected command");
			Err(FilterError::CommandFailed { command, message })
		}
		Err(other) => Err(other.into()),
	}
}

/// Executes commands through a fixed launcher.
#[derive(Debug, Clone)]
pub struct Filter<L = ProcessLauncher> {
	launcher: L,
}

impl Filter {
	/// Create a filter that spawns Neovim per `config`.
	pub fn new(config: EngineConfig) -> Self {
		Self {
			launcher: ProcessLauncher::new(config),
		}
	}
}

impl<L: EngineLauncher> Filter<L> {
	/// Create a filter over a custom launcher.
	pub fn with_launcher(launcher: L) -> Self {
		Self { launcher }
	}

	/// See [`execute`].
	pub async fn execute(&self, content: &[String], command: &str, cursors: &[CursorSpec]) -> Result<ExecutionResult> {
		execute(&self.launcher, content, command, cursors).await
	}
}
