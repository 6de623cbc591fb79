//! Request/response pump over a pair of async byte streams.
//!
//! One I/O task owns both streams. Outbound requests are written in the order
//! they are queued, inbound responses are matched to waiters by id.

use std::collections::HashMap;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::message::{Message, Request, Response};
use crate::protocol::{CounterIdGen, MsgpackCodec, Protocol};
use crate::{Result, RpcError};

/// A queued request and the waiter for its response.
struct Outbound {
	method: String,
	params: Vec<Value>,
	response_tx: oneshot::Sender<Result<Value>>,
}

/// Handle to a msgpack-rpc peer.
///
/// Dropping the handle closes the outbound queue, which stops the I/O task.
pub struct RpcClient {
	outbound_tx: mpsc::UnboundedSender<Outbound>,
	io_task: JoinHandle<()>,
}

impl std::fmt::Debug for RpcClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RpcClient")
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}

impl RpcClient {
	/// Starts the I/O task over the given streams.
	///
	/// Must be called from within a tokio runtime.
	pub fn spawn<R, W>(reader: R, writer: W) -> Self
	where
		R: AsyncRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let io_task = tokio::spawn(run_io(BufReader::new(reader), writer, outbound_rx));
		Self { outbound_tx, io_task }
	}

	/// Sends a request and waits for its response.
	pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
		let (response_tx, response_rx) = oneshot::channel();
		self.outbound_tx
			.send(Outbound {
				method: method.to_owned(),
				params,
				response_tx,
			})
			.map_err(|_| RpcError::Closed)?;
		response_rx.await.map_err(|_| RpcError::Closed)?
	}

	/// Returns true once the I/O task has stopped.
	pub fn is_closed(&self) -> bool {
		self.outbound_tx.is_closed() || self.io_task.is_finished()
	}
}

impl Drop for RpcClient {
	fn drop(&mut self) {
		self.io_task.abort();
	}
}

/// Runs the I/O loop for one peer.
async fn run_io<R, W>(mut reader: BufReader<R>, mut writer: W, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>)
where
	R: AsyncRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	let mut pending: HashMap<u32, oneshot::Sender<Result<Value>>> = HashMap::new();
	let mut ids = CounterIdGen::new();
	// Separate codecs: the read side keeps partial frames across select! iterations.
	let mut inbound = MsgpackCodec::new();
	let mut outbound = MsgpackCodec::new();

	loop {
		tokio::select! {
			out = outbound_rx.recv() => {
				let Some(out) = out else {
					tracing::debug!("rpc handle dropped; stopping io loop");
					break;
				};
				let Outbound { method, params, response_tx } = out;
				let id = ids.next();
				tracing::trace!(id, method = %method, "rpc.request");
				let msg = Message::Request(Request { id, method, params });
				match outbound.write_message(&mut writer, msg).await {
					Ok(()) => {
						pending.insert(id, response_tx);
					}
					Err(error) => {
						tracing::error!(%error, "outbound write failed; terminating io loop");
						let _ = response_tx.send(Err(error));
						break;
					}
				}
			}

			result = inbound.read_message(&mut reader) => {
				match result {
					Ok(Some(msg)) => handle_inbound(msg, &mut pending),
					Ok(None) => {
						tracing::debug!("peer closed connection");
						break;
					}
					Err(error) => {
						tracing::error!(%error, "error reading from peer");
						break;
					}
				}
			}
		}
	}

	for (_, tx) in pending {
		let _ = tx.send(Err(RpcError::Closed));
	}
	outbound_rx.close();
	while let Ok(out) = outbound_rx.try_recv() {
		let _ = out.response_tx.send(Err(RpcError::Closed));
	}
}

fn handle_inbound(msg: Message, pending: &mut HashMap<u32, oneshot::Sender<Result<Value>>>) {
	match msg {
		Message::Response(resp) => deliver(resp, pending),
		Message::Notification(notif) if notif.method == "nvim_error_event" => {
			tracing::warn!(params = ?notif.params, "engine reported an asynchronous error");
		}
		Message::Notification(notif) => {
			tracing::trace!(method = %notif.method, "ignoring notification");
		}
		Message::Request(req) => {
			tracing::debug!(id = req.id, method = %req.method, "ignoring peer-initiated request");
		}
	}
}

fn deliver(resp: Response, pending: &mut HashMap<u32, oneshot::Sender<Result<Value>>>) {
	match pending.remove(&resp.id) {
		Some(tx) => {
			let _ = tx.send(resp.into_result());
		}
		None => tracing::warn!(id = resp.id, "response for unknown request"),
	}
}
