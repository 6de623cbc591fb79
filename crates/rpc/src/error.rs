//! Error types for the msgpack-rpc transport.

use std::io;

use thiserror::Error;

/// Errors produced while talking to a msgpack-rpc peer.
#[derive(Debug, Error)]
pub enum RpcError {
	/// Input/output errors from the underlying streams.
	#[error("{0}")]
	Io(#[from] io::Error),

	/// A message could not be encoded.
	#[error("encode failed: {0}")]
	Encode(#[from] rmp_serde::encode::Error),

	/// The peer sent bytes that are not valid msgpack.
	#[error("decode failed: {0}")]
	Decode(#[from] rmp_serde::decode::Error),

	/// The peer sent valid msgpack that is not a msgpack-rpc message.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// The peer answered a request with an error object.
	#[error("{message}")]
	Remote {
		/// Error category reported by the peer.
		code: i64,
		/// Human-readable diagnostic reported by the peer.
		message: String,
	},

	/// The I/O loop stopped before the request completed.
	#[error("connection closed")]
	Closed,
}

/// Result type for transport operations.
pub type Result<T, E = RpcError> = std::result::Result<T, E>;
