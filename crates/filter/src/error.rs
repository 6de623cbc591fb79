//! Error types surfaced by command execution.

use exbridge_rpc::RpcError;
use thiserror::Error;

use crate::engine::EngineError;

/// Why an execution failed.
///
/// The three kinds are exhaustive: nothing was spawned, the engine rejected
/// the command, or the engine could not be reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
	/// The engine binary is missing or too old. Never retried.
	#[error("engine not found: {reason}")]
	EngineNotFound {
		/// Why resolution failed.
		reason: String,
	},

	/// The engine rejected the command text.
	#[error("command `{command}` failed: {message}")]
	CommandFailed {
		/// The command exactly as sent, including any range prefix.
		command: String,
		/// The engine's diagnostic, verbatim.
		message: String,
	},

	/// Spawning the engine or talking to it failed.
	#[error("engine connection failed: {0}")]
	Connection(String),
}

impl From<RpcError> for FilterError {
	fn from(err: RpcError) -> Self {
		Self::Connection(err.to_string())
	}
}

impl From<EngineError> for FilterError {
	fn from(err: EngineError) -> Self {
		Self::Connection(err.to_string())
	}
}

/// Result type for command execution.
pub type Result<T, E = FilterError> = std::result::Result<T, E>;
