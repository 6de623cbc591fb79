//! Async msgpack-rpc client pump and wire protocol.
//!
//! This crate provides the transport primitives used to drive an embedded
//! engine process over its standard streams:
//! * `Message`: The three msgpack-rpc message shapes (request, response, notification)
//! * `Protocol`: Trait for reading and writing framed messages
//! * `MsgpackCodec`: Incremental msgpack framing over any async byte stream
//! * `RpcClient`: A tokio-driven request/response pump owning one I/O task

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod message;
pub mod protocol;

pub use client::RpcClient;
pub use error::{Result, RpcError};
pub use message::{Message, Notification, Request, Response};
pub use protocol::{CounterIdGen, MsgpackCodec, Protocol};
pub use serde_json::Value;
