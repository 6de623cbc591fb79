//! The engine's RPC surface.
//!
//! [`EngineApi`] exposes only the calls the execution protocol needs.
//! [`NvimApi`] implements it against Neovim's msgpack-rpc API, always
//! addressing the current buffer and window.

use async_trait::async_trait;
use exbridge_rpc::{RpcClient, RpcError, Value};
use serde_json::json;
use thiserror::Error;

use crate::marker::Gravity;
use crate::position::Position;

/// Scope for a batch of markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceId(pub u64);

/// Handle to one marker inside a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(pub u64);

/// Failure of a single engine call.
#[derive(Debug, Error)]
pub enum EngineError {
	/// The engine refused to run a command.
	#[error("{0}")]
	Rejected(String),

	/// The call did not complete at the transport level.
	#[error(transparent)]
	Transport(#[from] RpcError),

	/// The engine answered with an unexpected shape.
	#[error("unexpected reply to {method}: {reply}")]
	Malformed {
		/// The method that was called.
		method: &'static str,
		/// The reply, rendered for diagnostics.
		reply: String,
	},
}

/// Operations the execution protocol issues against the engine.
///
/// Whole-buffer reads and writes use non-strict indexing: `0..-1` always
/// means the entire buffer.
#[async_trait]
pub trait EngineApi: Send + Sync {
	/// Replaces the entire buffer.
	async fn set_lines(&self, lines: &[String]) -> Result<(), EngineError>;

	/// Creates (or looks up) a marker namespace.
	async fn create_namespace(&self, name: &str) -> Result<NamespaceId, EngineError>;

	/// Places a marker at an in-bounds position.
	async fn set_marker(&self, ns: NamespaceId, at: Position, gravity: Gravity) -> Result<MarkerId, EngineError>;

	/// Reads a marker's live position, `None` if it was deleted or orphaned.
	async fn get_marker(&self, ns: NamespaceId, id: MarkerId) -> Result<Option<Position>, EngineError>;

	/// Moves the active cursor.
	async fn set_cursor(&self, at: Position) -> Result<(), EngineError>;

	/// Sets a named mark such as `<` or `>`.
	async fn set_mark(&self, name: char, at: Position) -> Result<(), EngineError>;

	/// Runs an ex command. Engine-reported failures are [`EngineError::Rejected`].
	async fn command(&self, command: &str) -> Result<(), EngineError>;

	/// Reads the entire buffer.
	async fn get_lines(&self) -> Result<Vec<String>, EngineError>;

	/// Asks the engine to exit. The engine may close the channel instead of answering.
	async fn quit(&self) -> Result<(), EngineError>;
}

/// [`EngineApi`] over Neovim's msgpack-rpc API.
#[derive(Debug)]
pub struct NvimApi {
	rpc: RpcClient,
}

impl NvimApi {
	/// Wraps an attached RPC session.
	pub fn new(rpc: RpcClient) -> Self {
		Self { rpc }
	}

	async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value, EngineError> {
		tracing::trace!(method, "engine.call");
		Ok(self.rpc.request(method, params).await?)
	}
}

fn as_u64(method: &'static str, reply: Value) -> Result<u64, EngineError> {
	reply.as_u64().ok_or_else(|| EngineError::Malformed {
		method,
		reply: reply.to_string(),
	})
}

/// Parses `nvim_buf_get_extmark_by_id` with details: `[row, col, {..}]` or `[]`.
fn parse_extmark(reply: Value) -> Result<Option<Position>, EngineError> {
	const METHOD: &str = "nvim_buf_get_extmark_by_id";
	let malformed = |reply: &Value| EngineError::Malformed {
		method: METHOD,
		reply: reply.to_string(),
	};

	let Value::Array(items) = &reply else {
		return Err(malformed(&reply));
	};
	if items.is_empty() {
		return Ok(None);
	}
	let (Some(row), Some(col)) = (
		items.first().and_then(Value::as_u64),
		items.get(1).and_then(Value::as_u64),
	) else {
		return Err(malformed(&reply));
	};
	let invalid = items
		.get(2)
		.and_then(|details| details.get("invalid"))
		.and_then(Value::as_bool)
		.unwrap_or(false);
	if invalid {
		return Ok(None);
	}
	Ok(Some(Position::new(row as usize, col as usize)))
}

#[async_trait]
impl EngineApi for NvimApi {
	async fn set_lines(&self, lines: &[String]) -> Result<(), EngineError> {
		self.call("nvim_buf_set_lines", vec![json!(0), json!(0), json!(-1), json!(false), json!(lines)])
			.await
			.map(drop)
	}

	async fn create_namespace(&self, name: &str) -> Result<NamespaceId, EngineError> {
		let reply = self.call("nvim_create_namespace", vec![json!(name)]).await?;
		as_u64("nvim_create_namespace", reply).map(NamespaceId)
	}

	async fn set_marker(&self, ns: NamespaceId, at: Position, gravity: Gravity) -> Result<MarkerId, EngineError> {
		let opts = json!({
			"right_gravity": gravity == Gravity::Right,
			"invalidate": true,
		});
		let reply = self
			.call(
				"nvim_buf_set_extmark",
				vec![json!(0), json!(ns.0), json!(at.line), json!(at.col), opts],
			)
			.await?;
		as_u64("nvim_buf_set_extmark", reply).map(MarkerId)
	}

	async fn get_marker(&self, ns: NamespaceId, id: MarkerId) -> Result<Option<Position>, EngineError> {
		let reply = self
			.call(
				"nvim_buf_get_extmark_by_id",
				vec![json!(0), json!(ns.0), json!(id.0), json!({ "details": true })],
			)
			.await?;
		parse_extmark(reply)
	}

	async fn set_cursor(&self, at: Position) -> Result<(), EngineError> {
		self.call("nvim_win_set_cursor", vec![json!(0), json!([at.line + 1, at.col])])
			.await
			.map(drop)
	}

	async fn set_mark(&self, name: char, at: Position) -> Result<(), EngineError> {
		self.call(
			"nvim_buf_set_mark",
			vec![json!(0), json!(name.to_string()), json!(at.line + 1), json!(at.col), json!({})],
		)
		.await
		.map(drop)
	}

	async fn command(&self, command: &str) -> Result<(), EngineError> {
		match self.rpc.request("nvim_command", vec![json!(command)]).await {
			Ok(_) => Ok(()),
			Err(RpcError::Remote { message, .. }) => Err(EngineError::Rejected(message)),
			Err(e) => Err(e.into()),
		}
	}

	async fn get_lines(&self) -> Result<Vec<String>, EngineError> {
		let reply = self
			.call("nvim_buf_get_lines", vec![json!(0), json!(0), json!(-1), json!(false)])
			.await?;
		match reply {
			Value::Array(items) => items
				.into_iter()
				.map(|item| match item {
					Value::String(line) => Ok(line),
					other => Err(EngineError::Malformed {
						method: "nvim_buf_get_lines",
						reply: other.to_string(),
					}),
				})
				.collect(),
			other => Err(EngineError::Malformed {
				method: "nvim_buf_get_lines",
				reply: other.to_string(),
			}),
		}
	}

	async fn quit(&self) -> Result<(), EngineError> {
		self.call("nvim_command", vec![json!("qall!")]).await.map(drop)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extmark_reply_shapes() {
		assert_eq!(parse_extmark(json!([])).unwrap(), None);
		assert_eq!(
			parse_extmark(json!([3, 4, { "ns_id": 1, "right_gravity": false }])).unwrap(),
			Some(Position::new(3, 4))
		);
		assert_eq!(parse_extmark(json!([3, 0, { "invalid": true }])).unwrap(), None);
		assert_eq!(parse_extmark(json!([2, 1])).unwrap(), Some(Position::new(2, 1)));
	}

	#[test]
	fn malformed_extmark_reply() {
		assert!(matches!(parse_extmark(Value::Null), Err(EngineError::Malformed { .. })));
		assert!(matches!(parse_extmark(json!(["a", 1])), Err(EngineError::Malformed { .. })));
	}
}
