//! Position markers that follow the text through engine-side edits.
//!
//! Every cursor and selection endpoint is tagged with an engine marker
//! before the command runs and read back afterwards, so line insertions and
//! deletions made by the command are reflected in the final coordinates.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::{EngineApi, EngineError, MarkerId, NamespaceId};
use crate::position::{CursorSpec, Position};

static NAMESPACE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Tie-break when text is inserted exactly at a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gravity {
	/// Stays attached to the character on its left; insertions push past it.
	Left,
	/// Advances with text inserted at its position.
	Right,
}

/// Markers recorded for one input cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedCursor {
	/// Marker on the caret.
	pub cursor: MarkerId,
	/// Selection start and end markers, when the cursor carries a selection.
	pub selection: Option<(MarkerId, MarkerId)>,
}

/// Creates and resolves markers inside a single namespace.
#[derive(Debug, Clone, Copy)]
pub struct MarkerTracker {
	namespace: NamespaceId,
}

impl MarkerTracker {
	/// Creates a fresh namespace for this invocation.
	pub async fn new(api: &dyn EngineApi) -> Result<Self, EngineError> {
		let seq = NAMESPACE_SEQ.fetch_add(1, Ordering::Relaxed);
		let name = format!("exbridge-{}-{seq}", std::process::id());
		let namespace = api.create_namespace(&name).await?;
		tracing::debug!(namespace = namespace.0, %name, "marker namespace created");
		Ok(Self { namespace })
	}

	/// Places a marker. `at` must already be clamped to the buffer.
	pub async fn create(&self, api: &dyn EngineApi, at: Position, gravity: Gravity) -> Result<MarkerId, EngineError> {
		api.set_marker(self.namespace, at, gravity).await
	}

	/// Reads a marker's current position.
	///
	/// Errors are logged and reported as `None` so one bad marker does not
	/// abort reading the others.
	pub async fn resolve(&self, api: &dyn EngineApi, id: MarkerId) -> Option<Position> {
		match api.get_marker(self.namespace, id).await {
			Ok(Some(pos)) => Some(pos),
			Ok(None) => {
				tracing::debug!(marker = id.0, "marker orphaned");
				None
			}
			Err(error) => {
				tracing::debug!(marker = id.0, %error, "marker resolution failed");
				None
			}
		}
	}

	/// Tags one cursor, clamping every endpoint against `content`.
	///
	/// The caret and selection start use [`Gravity::Left`]; the selection end
	/// sits at the end of its line with [`Gravity::Right`] so text appended
	/// there stays inside the selection.
	pub async fn track(&self, api: &dyn EngineApi, spec: &CursorSpec, content: &[String]) -> Result<TrackedCursor, EngineError> {
		let cursor = self.create(api, spec.anchor.clamp_to(content), Gravity::Left).await?;
		let selection = match spec.selection {
			Some(range) => {
				let start = Position::new(range.start_line(), 0).clamp_to(content);
				let end = Position::line_end(content, range.end_line());
				let start = self.create(api, start, Gravity::Left).await?;
				let end = self.create(api, end, Gravity::Right).await?;
				Some((start, end))
			}
			None => None,
		};
		Ok(TrackedCursor { cursor, selection })
	}
}
