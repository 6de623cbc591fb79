//! Protocol abstraction for wire formats and message framing.

use bytes::BytesMut;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Message;
use crate::{Result, RpcError};

/// Simple counter-based ID generator for protocols.
///
/// msgpack-rpc ids are 32-bit, so the counter wraps.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterIdGen(pub u32);

impl CounterIdGen {
	/// Creates a new counter starting at 0.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Generates the next unique ID and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> u32 {
		let id = self.0;
		self.0 = self.0.wrapping_add(1);
		id
	}
}

/// Binding between the client pump and a concrete framing.
pub trait Protocol: Send + 'static {
	/// Read one complete message, or `None` on a clean end of stream.
	fn read_message(
		&mut self,
		input: &mut (impl AsyncBufRead + Unpin + Send),
	) -> impl std::future::Future<Output = Result<Option<Message>>> + Send;

	/// Write a message to the output stream.
	fn write_message(
		&mut self,
		output: &mut (impl AsyncWrite + Unpin + Send),
		msg: Message,
	) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Sizes of one msgpack header: its own length, the raw payload that
/// follows it, and how many nested values a container opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
	len: usize,
	payload: usize,
	items: usize,
}

impl Header {
	const fn scalar(len: usize, payload: usize) -> Self {
		Self { len, payload, items: 0 }
	}

	const fn container(len: usize, items: usize) -> Self {
		Self { len, payload: 0, items }
	}

	/// Parses the header at the front of `bytes`, `None` if it is incomplete.
	fn parse(bytes: &[u8]) -> Result<Option<Self>> {
		let Some(&marker) = bytes.first() else {
			return Ok(None);
		};
		// Big-endian length of `n` bytes following the marker.
		let size = |n: usize| -> Option<usize> {
			let raw = bytes.get(1..=n)?;
			Some(raw.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b)))
		};
		let header = match marker {
			0x00..=0x7f | 0xe0..=0xff | 0xc0 | 0xc2 | 0xc3 => Self::scalar(1, 0),
			0x80..=0x8f => Self::container(1, usize::from(marker & 0x0f) * 2),
			0x90..=0x9f => Self::container(1, usize::from(marker & 0x0f)),
			0xa0..=0xbf => Self::scalar(1, usize::from(marker & 0x1f)),
			0xc4 | 0xd9 => match size(1) {
				Some(n) => Self::scalar(2, n),
				None => return Ok(None),
			},
			0xc5 | 0xda => match size(2) {
				Some(n) => Self::scalar(3, n),
				None => return Ok(None),
			},
			0xc6 | 0xdb => match size(4) {
				Some(n) => Self::scalar(5, n),
				None => return Ok(None),
			},
			0xc7 => match size(1) {
				Some(n) => Self::scalar(3, n),
				None => return Ok(None),
			},
			0xc8 => match size(2) {
				Some(n) => Self::scalar(4, n),
				None => return Ok(None),
			},
			0xc9 => match size(4) {
				Some(n) => Self::scalar(6, n),
				None => return Ok(None),
			},
			0xcc | 0xd0 => Self::scalar(2, 0),
			0xcd | 0xd1 => Self::scalar(3, 0),
			0xca | 0xce | 0xd2 => Self::scalar(5, 0),
			0xcb | 0xcf | 0xd3 => Self::scalar(9, 0),
			0xd4 => Self::scalar(2, 1),
			0xd5 => Self::scalar(2, 2),
			0xd6 => Self::scalar(2, 4),
			0xd7 => Self::scalar(2, 8),
			0xd8 => Self::scalar(2, 16),
			0xdc => match size(2) {
				Some(n) => Self::container(3, n),
				None => return Ok(None),
			},
			0xdd => match size(4) {
				Some(n) => Self::container(5, n),
				None => return Ok(None),
			},
			0xde => match size(2) {
				Some(n) => Self::container(3, n * 2),
				None => return Ok(None),
			},
			0xdf => match size(4) {
				Some(n) => Self::container(5, n * 2),
				None => return Ok(None),
			},
			0xc1 => return Err(RpcError::Protocol("invalid msgpack marker 0xc1".into())),
		};
		Ok(Some(header))
	}
}

/// Resumable walk over the buffered bytes toward the end of one value.
///
/// Progress survives between reads, so every byte is inspected once no
/// matter how the stream is chunked.
#[derive(Debug, Default)]
struct FrameScan {
	/// Offset of the next unread header.
	pos: usize,
	/// Values still owed by each open array or map, innermost last.
	open: Vec<usize>,
}

impl FrameScan {
	/// Returns the length of the first complete value in `buf`, if any.
	fn advance(&mut self, buf: &[u8]) -> Result<Option<usize>> {
		loop {
			let Some(header) = Header::parse(&buf[self.pos..])? else {
				return Ok(None);
			};
			let len = header.len + header.payload;
			if buf.len() - self.pos < len {
				return Ok(None);
			}
			self.pos += len;
			if header.items > 0 {
				self.open.push(header.items);
				continue;
			}

			loop {
				let Some(owed) = self.open.last_mut() else {
					let end = self.pos;
					*self = Self::default();
					return Ok(Some(end));
				};
				*owed -= 1;
				if *owed > 0 {
					break;
				}
				self.open.pop();
			}
		}
	}
}

/// msgpack framing.
///
/// msgpack values are self-delimiting. Bytes are buffered and scanned until
/// one full value is present, which is then decoded once. Leftover bytes are
/// kept for the next call.
#[derive(Debug, Default)]
pub struct MsgpackCodec {
	buf: BytesMut,
	scan: FrameScan,
}

impl MsgpackCodec {
	/// Creates a codec with an empty read buffer.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Encodes a message into msgpack bytes.
	pub fn encode(msg: Message) -> Result<Vec<u8>> {
		Ok(rmp_serde::to_vec(&msg.into_value())?)
	}

	/// Decodes one message from the front of the buffer, if complete.
	fn try_decode(&mut self) -> Result<Option<Message>> {
		let Some(len) = self.scan.advance(&self.buf)? else {
			return Ok(None);
		};
		let frame = self.buf.split_to(len);
		let value: Value = rmp_serde::from_slice(&frame)?;
		Message::from_value(value).map(Some)
	}
}

impl Protocol for MsgpackCodec {
	async fn read_message(&mut self, input: &mut (impl AsyncBufRead + Unpin + Send)) -> Result<Option<Message>> {
		loop {
			if let Some(msg) = self.try_decode()? {
				return Ok(Some(msg));
			}

			let chunk = input.fill_buf().await?;
			if chunk.is_empty() {
				if self.buf.is_empty() {
					return Ok(None);
				}
				return Err(RpcError::Protocol(format!(
					"stream ended inside a message ({} bytes buffered)",
					self.buf.len()
				)));
			}
			let len = chunk.len();
			self.buf.extend_from_slice(chunk);
			input.consume(len);
		}
	}

	async fn write_message(&mut self, output: &mut (impl AsyncWrite + Unpin + Send), msg: Message) -> Result<()> {
		let bytes = Self::encode(msg)?;
		output.write_all(&bytes).await?;
		output.flush().await?;
		Ok(())
	}
}
