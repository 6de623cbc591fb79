//! msgpack-rpc message shapes.
//!
//! On the wire every message is a msgpack array whose first element is the
//! message type:
//! * request: `[0, msgid, method, params]`
//! * response: `[1, msgid, error, result]`
//! * notification: `[2, method, params]`

use serde_json::Value;

use crate::{Result, RpcError};

const REQUEST: u64 = 0;
const RESPONSE: u64 = 1;
const NOTIFICATION: u64 = 2;

/// A call expecting a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
	/// Sequence number used to match the response.
	pub id: u32,
	/// Remote method name.
	pub method: String,
	/// Positional arguments.
	pub params: Vec<Value>,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
	/// Sequence number of the originating request.
	pub id: u32,
	/// Either the result value or the peer's error object.
	pub outcome: std::result::Result<Value, Value>,
}

/// A one-way message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
	/// Event or method name.
	pub method: String,
	/// Positional arguments.
	pub params: Vec<Value>,
}

/// Any msgpack-rpc message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
	/// An outgoing or incoming call.
	Request(Request),
	/// An answer to a call.
	Response(Response),
	/// A one-way event.
	Notification(Notification),
}

impl Message {
	/// Converts the message into its wire array.
	pub fn into_value(self) -> Value {
		match self {
			Self::Request(req) => Value::Array(vec![
				REQUEST.into(),
				req.id.into(),
				req.method.into(),
				Value::Array(req.params),
			]),
			Self::Response(resp) => {
				let (error, result) = match resp.outcome {
					Ok(result) => (Value::Null, result),
					Err(error) => (error, Value::Null),
				};
				Value::Array(vec![RESPONSE.into(), resp.id.into(), error, result])
			}
			Self::Notification(notif) => Value::Array(vec![
				NOTIFICATION.into(),
				notif.method.into(),
				Value::Array(notif.params),
			]),
		}
	}

	/// Parses a decoded wire array into a message.
	pub fn from_value(value: Value) -> Result<Self> {
		let Value::Array(items) = value else {
			return Err(RpcError::Protocol(format!("expected array, got {value}")));
		};
		let mut items = items.into_iter();
		let kind = items
			.next()
			.and_then(|v| v.as_u64())
			.ok_or_else(|| RpcError::Protocol("missing message type".into()))?;

		match (kind, items.len()) {
			(REQUEST, 3) => {
				let id = parse_id(items.next())?;
				let method = parse_method(items.next())?;
				let params = parse_params(items.next())?;
				Ok(Self::Request(Request { id, method, params }))
			}
			(RESPONSE, 3) => {
				let id = parse_id(items.next())?;
				let error = items.next().unwrap_or(Value::Null);
				let result = items.next().unwrap_or(Value::Null);
				let outcome = if error.is_null() { Ok(result) } else { Err(error) };
				Ok(Self::Response(Response { id, outcome }))
			}
			(NOTIFICATION, 2) => {
				let method = parse_method(items.next())?;
				let params = parse_params(items.next())?;
				Ok(Self::Notification(Notification { method, params }))
			}
			(kind, len) => Err(RpcError::Protocol(format!(
				"unexpected message type {kind} with {len} fields"
			))),
		}
	}
}

impl Response {
	/// Converts the peer's outcome into a transport result.
	///
	/// Error objects of the form `[code, message]` become [`RpcError::Remote`].
	pub fn into_result(self) -> Result<Value> {
		self.outcome.map_err(remote_error)
	}
}

fn remote_error(error: Value) -> RpcError {
	match error {
		Value::Array(parts) if parts.len() == 2 => {
			let code = parts[0].as_i64().unwrap_or(-1);
			let message = match &parts[1] {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			};
			RpcError::Remote { code, message }
		}
		Value::String(message) => RpcError::Remote { code: -1, message },
		other => RpcError::Remote {
			code: -1,
			message: other.to_string(),
		},
	}
}

fn parse_id(value: Option<Value>) -> Result<u32> {
	value
		.as_ref()
		.and_then(Value::as_u64)
		.and_then(|id| u32::try_from(id).ok())
		.ok_or_else(|| RpcError::Protocol("invalid message id".into()))
}

fn parse_method(value: Option<Value>) -> Result<String> {
	match value {
		Some(Value::String(method)) => Ok(method),
		_ => Err(RpcError::Protocol("invalid method name".into())),
	}
}

fn parse_params(value: Option<Value>) -> Result<Vec<Value>> {
	match value {
		Some(Value::Array(params)) => Ok(params),
		Some(Value::Null) | None => Ok(Vec::new()),
		Some(other) => Err(RpcError::Protocol(format!("params must be an array, got {other}"))),
	}
}
