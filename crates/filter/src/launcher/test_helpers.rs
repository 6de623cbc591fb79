//! In-process fake engine for tests.
//!
//! [`TestLauncher`] hands out sessions backed by a [`FakeState`] that answers
//! the same msgpack-rpc calls Neovim does, over an in-memory pipe. It models
//! a line buffer, extmarks with gravity and invalidation, named marks, the
//! cursor, and a small ex subset: `d`, `t.`, `s/pat/rep/[ge]`, with an
//! optional `'<,'>` or `%` range.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use exbridge_rpc::{Message, MsgpackCodec, Protocol, Response, RpcClient, Value};
use serde_json::json;
use tokio::io::{BufReader, DuplexStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::{EngineLauncher, EngineProcess, EngineSession};
use crate::engine::NvimApi;
use crate::error::{FilterError, Result};
use crate::position::Position;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
	m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An extmark as the fake engine tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extmark {
	/// Zero-indexed row.
	pub row: usize,
	/// Byte column.
	pub col: usize,
	/// Whether insertions at the mark push it forward.
	pub right_gravity: bool,
	/// Set once the mark's line was deleted.
	pub invalid: bool,
}

/// Observable state of one fake engine instance.
#[derive(Debug, Clone)]
pub struct FakeState {
	/// Buffer content. Never empty, like a real buffer.
	pub lines: Vec<String>,
	/// Zero-indexed cursor.
	pub cursor: Position,
	/// Named marks, zero-indexed.
	pub marks: HashMap<char, Position>,
	/// Namespace names; the id of `namespaces[i]` is `i + 1`.
	pub namespaces: Vec<String>,
	/// Extmarks keyed by `(namespace, id)`.
	pub extmarks: BTreeMap<(u64, u64), Extmark>,
	/// Every RPC method received, in order.
	pub calls: Vec<String>,
	/// Every ex command received, in order, excluding the quit request.
	pub commands: Vec<String>,
	/// Whether a quit request arrived.
	pub quit_requested: bool,
	next_extmark: u64,
}

impl Default for FakeState {
	fn default() -> Self {
		Self {
			lines: vec![String::new()],
			cursor: Position::default(),
			marks: HashMap::new(),
			namespaces: Vec::new(),
			extmarks: BTreeMap::new(),
			calls: Vec::new(),
			commands: Vec::new(),
			quit_requested: false,
			next_extmark: 1,
		}
	}
}

enum Dispatch {
	Reply(std::result::Result<Value, Value>),
	Exit,
}

fn validation(msg: impl Into<String>) -> Value {
	json!([1, msg.into()])
}

fn exception(msg: impl Into<String>) -> Value {
	json!([0, msg.into()])
}

fn arg_u64(params: &[Value], index: usize, name: &str) -> std::result::Result<u64, Value> {
	params
		.get(index)
		.and_then(Value::as_u64)
		.ok_or_else(|| validation(format!("Invalid '{name}': expected non-negative Integer")))
}

fn arg_i64(params: &[Value], index: usize, name: &str) -> std::result::Result<i64, Value> {
	params
		.get(index)
		.and_then(Value::as_i64)
		.ok_or_else(|| validation(format!("Invalid '{name}': expected Integer")))
}

fn arg_str<'a>(params: &'a [Value], index: usize, name: &str) -> std::result::Result<&'a str, Value> {
	params
		.get(index)
		.and_then(Value::as_str)
		.ok_or_else(|| validation(format!("Invalid '{name}': expected String")))
}

impl FakeState {
	/// Creates an engine holding one empty line.
	pub fn new() -> Self {
		Self::default()
	}

	fn handle(&mut self, method: &str, params: &[Value]) -> Dispatch {
		self.calls.push(method.to_owned());
		let reply = match method {
			"nvim_buf_set_lines" => self.set_lines(params),
			"nvim_buf_get_lines" => self.get_lines(params),
			"nvim_create_namespace" => self.create_namespace(params),
			"nvim_buf_set_extmark" => self.set_extmark(params),
			"nvim_buf_get_extmark_by_id" => self.get_extmark(params),
			"nvim_win_set_cursor" => self.set_cursor(params),
			"nvim_buf_set_mark" => self.set_mark(params),
			"nvim_command" => match arg_str(params, 0, "command") {
				Ok("qall!" | "qa!") => {
					self.quit_requested = true;
					return Dispatch::Exit;
				}
				Ok(command) => {
					let command = command.to_owned();
					self.commands.push(command.clone());
					self.run_ex(&command).map(|()| Value::Null).map_err(exception)
				}
				Err(e) => Err(e),
			},
			other => Err(exception(format!("Invalid method: {other}"))),
		};
		Dispatch::Reply(reply)
	}

	fn whole_buffer(params: &[Value]) -> std::result::Result<(), Value> {
		let start = arg_i64(params, 1, "start")?;
		let end = arg_i64(params, 2, "end")?;
		if (start, end) != (0, -1) {
			return Err(validation("fake engine only supports whole-buffer access"));
		}
		Ok(())
	}

	fn set_lines(&mut self, params: &[Value]) -> std::result::Result<Value, Value> {
		Self::whole_buffer(params)?;
		let Some(Value::Array(items)) = params.get(4) else {
			return Err(validation("Invalid 'replacement': expected Array"));
		};
		let lines = items
			.iter()
			.map(|v| v.as_str().map(str::to_owned))
			.collect::<Option<Vec<_>>>()
			.ok_or_else(|| validation("Invalid 'replacement': expected Array of Strings"))?;
		self.lines = if lines.is_empty() { vec![String::new()] } else { lines };
		self.extmarks.clear();
		self.cursor = Position::default();
		Ok(Value::Null)
	}

	fn get_lines(&self, params: &[Value]) -> std::result::Result<Value, Value> {
		Self::whole_buffer(params)?;
		Ok(json!(self.lines))
	}

	fn create_namespace(&mut self, params: &[Value]) -> std::result::Result<Value, Value> {
		let name = arg_str(params, 0, "name")?;
		let index = match self.namespaces.iter().position(|n| n == name) {
			Some(index) => index,
			None => {
				self.namespaces.push(name.to_owned());
				self.namespaces.len() - 1
			}
		};
		Ok(json!(index + 1))
	}

	fn check_namespace(&self, ns: u64) -> std::result::Result<(), Value> {
		if ns == 0 || ns as usize > self.namespaces.len() {
			return Err(validation("Invalid 'ns_id': expected valid namespace"));
		}
		Ok(())
	}

	fn set_extmark(&mut self, params: &[Value]) -> std::result::Result<Value, Value> {
		let ns = arg_u64(params, 1, "ns_id")?;
		self.check_namespace(ns)?;
		let row = arg_u64(params, 2, "line")? as usize;
		let col = arg_u64(params, 3, "col")? as usize;
		let line = self
			.lines
			.get(row)
			.ok_or_else(|| validation("Invalid 'line': out of range"))?;
		if col > line.len() {
			return Err(validation("Invalid 'col': out of range"));
		}
		let right_gravity = params
			.get(4)
			.and_then(|opts| opts.get("right_gravity"))
			.and_then(Value::as_bool)
			.unwrap_or(true);

		let id = self.next_extmark;
		self.next_extmark += 1;
		self.extmarks.insert(
			(ns, id),
			Extmark {
				row,
				col,
				right_gravity,
				invalid: false,
			},
		);
		Ok(json!(id))
	}

	fn get_extmark(&self, params: &[Value]) -> std::result::Result<Value, Value> {
		let ns = arg_u64(params, 1, "ns_id")?;
		self.check_namespace(ns)?;
		let id = arg_u64(params, 2, "id")?;
		let details = params
			.get(3)
			.and_then(|opts| opts.get("details"))
			.and_then(Value::as_bool)
			.unwrap_or(false);

		let Some(mark) = self.extmarks.get(&(ns, id)) else {
			return Ok(json!([]));
		};
		if !details {
			return Ok(json!([mark.row, mark.col]));
		}
		let mut info = json!({ "ns_id": ns, "right_gravity": mark.right_gravity });
		if mark.invalid {
			info["invalid"] = json!(true);
		}
		Ok(json!([mark.row, mark.col, info]))
	}

	fn set_cursor(&mut self, params: &[Value]) -> std::result::Result<Value, Value> {
		let pos = params
			.get(1)
			.and_then(Value::as_array)
			.filter(|pos| pos.len() == 2)
			.ok_or_else(|| validation("Invalid 'pos': expected 2-tuple of Integers"))?;
		let row = arg_u64(pos, 0, "row")? as usize;
		let col = arg_u64(pos, 1, "col")? as usize;
		if row == 0 || row > self.lines.len() {
			return Err(validation("Cursor position outside buffer"));
		}
		let line = row - 1;
		self.cursor = Position::new(line, col.min(self.lines[line].len()));
		Ok(Value::Null)
	}

	fn set_mark(&mut self, params: &[Value]) -> std::result::Result<Value, Value> {
		let name = arg_str(params, 1, "name")?;
		let mut chars = name.chars();
		let (Some(mark), None) = (chars.next(), chars.next()) else {
			return Err(validation("Invalid 'name': mark name must be a single character"));
		};
		let row = arg_u64(params, 2, "line")? as usize;
		let col = arg_u64(params, 3, "col")? as usize;
		if row == 0 || row > self.lines.len() {
			return Err(validation("Invalid 'line': out of range"));
		}
		self.marks.insert(mark, Position::new(row - 1, col));
		Ok(json!(true))
	}

	fn run_ex(&mut self, command: &str) -> std::result::Result<(), String> {
		let (range, rest) = self.parse_range(command)?;
		let rest = rest.trim();
		match rest {
			"" => {
				self.cursor = Position::new(range.1, 0);
				Ok(())
			}
			"d" | "delete" => {
				self.delete_lines(range);
				Ok(())
			}
			"t." | "copy." => {
				self.copy_below_cursor(range);
				Ok(())
			}
			_ => match rest.strip_prefix('s') {
				Some(body) if body.starts_with(|c: char| !c.is_alphanumeric() && !c.is_whitespace()) => {
					self.substitute(range, body)
				}
				_ => Err(format!("Vim:E492: Not an editor command: {command}")),
			},
		}
	}

	fn parse_range<'a>(&self, command: &'a str) -> std::result::Result<((usize, usize), &'a str), String> {
		if let Some(rest) = command.strip_prefix("'<,'>") {
			let (Some(start), Some(end)) = (self.marks.get(&'<'), self.marks.get(&'>')) else {
				return Err("Vim:E20: Mark not set".into());
			};
			let (a, b) = (start.line.min(end.line), start.line.max(end.line));
			let last = self.lines.len() - 1;
			if b > last {
				return Err("Vim:E16: Invalid range".into());
			}
			return Ok(((a, b), rest));
		}
		if let Some(rest) = command.strip_prefix('%') {
			return Ok(((0, self.lines.len() - 1), rest));
		}
		Ok(((self.cursor.line, self.cursor.line), command))
	}

	fn delete_lines(&mut self, (a, b): (usize, usize)) {
		let count = b - a + 1;
		self.lines.drain(a..=b);
		if self.lines.is_empty() {
			self.lines.push(String::new());
		}
		let last = self.lines.len() - 1;
		for mark in self.extmarks.values_mut() {
			if (a..=b).contains(&mark.row) {
				mark.invalid = true;
				mark.row = a.min(last);
				mark.col = 0;
			} else if mark.row > b {
				mark.row -= count;
			}
		}
		self.cursor = Position::new(a.min(last), 0);
	}

	fn copy_below_cursor(&mut self, (a, b): (usize, usize)) {
		let target = self.cursor.line;
		let copied: Vec<String> = self.lines[a..=b].to_vec();
		let count = copied.len();
		self.lines.splice(target + 1..target + 1, copied);
		for mark in self.extmarks.values_mut() {
			if mark.row > target {
				mark.row += count;
			}
		}
		self.cursor = Position::new(target + count, 0);
	}

	fn substitute(&mut self, (a, b): (usize, usize), body: &str) -> std::result::Result<(), String> {
		let mut chars = body.chars();
		let Some(delim) = chars.next() else {
			return Err("Vim:E35: No previous regular expression".into());
		};
		let mut parts = chars.as_str().splitn(3, delim);
		let pattern = parts.next().unwrap_or_default();
		let replacement = parts.next().unwrap_or_default();
		let flags = parts.next().unwrap_or_default();
		let global = flags.contains('g');
		let silent = flags.contains('e');

		let re = regex::Regex::new(pattern).map_err(|_| format!("Vim(substitute):E486: Pattern not found: {pattern}"))?;
		let mut last_changed = None;
		for row in a..=b {
			let line = &self.lines[row];
			let spans: Vec<(usize, usize)> = if global {
				re.find_iter(line).map(|m| (m.start(), m.end())).collect()
			} else {
				re.find(line).map(|m| (m.start(), m.end())).into_iter().collect()
			};
			if spans.is_empty() {
				continue;
			}

			let mut replaced = String::with_capacity(line.len() + replacement.len() * spans.len());
			let mut last = 0;
			for &(start, end) in &spans {
				replaced.push_str(&line[last..start]);
				replaced.push_str(replacement);
				last = end;
			}
			replaced.push_str(&line[last..]);
			self.lines[row] = replaced;

			let edits: Vec<Splice> = spans
				.into_iter()
				.map(|(start, end)| Splice {
					start,
					end,
					inserted: replacement.len(),
				})
				.collect();
			for mark in self.extmarks.values_mut().filter(|m| m.row == row) {
				mark.col = shift_col(mark.col, mark.right_gravity, &edits);
			}
			last_changed = Some(row);
		}

		match last_changed {
			Some(row) => {
				self.cursor = Position::new(row, 0);
				Ok(())
			}
			None if silent => Ok(()),
			None => Err(format!("Vim(substitute):E486: Pattern not found: {pattern}")),
		}
	}
}

/// One replacement within a line: bytes `start..end` became `inserted` bytes.
#[derive(Debug, Clone, Copy)]
struct Splice {
	start: usize,
	end: usize,
	inserted: usize,
}

/// Moves a column through ordered, non-overlapping splices on its line.
///
/// A mark at the start of a splice, or inside the replaced bytes, lands on
/// the inserted text's left edge, or its right edge with right gravity.
fn shift_col(col: usize, right_gravity: bool, edits: &[Splice]) -> usize {
	let mut shift = 0isize;
	for edit in edits {
		if col < edit.start {
			break;
		}
		let base = edit.start.saturating_add_signed(shift);
		if col == edit.start || col < edit.end {
			return if right_gravity { base + edit.inserted } else { base };
		}
		shift += edit.inserted as isize - (edit.end - edit.start) as isize;
	}
	col.saturating_add_signed(shift)
}

async fn serve(stream: DuplexStream, state: Arc<Mutex<FakeState>>, gate: Option<Arc<Semaphore>>) {
	let (r, mut w) = tokio::io::split(stream);
	let mut reader = BufReader::new(r);
	let mut codec = MsgpackCodec::new();

	loop {
		let req = match codec.read_message(&mut reader).await {
			Ok(Some(Message::Request(req))) => req,
			Ok(Some(_)) => continue,
			Ok(None) | Err(_) => break,
		};

		if req.method == "nvim_command"
			&& let Some(gate) = &gate
			&& req.params.first().and_then(Value::as_str) != Some("qall!")
		{
			match gate.acquire().await {
				Ok(permit) => permit.forget(),
				Err(_) => break,
			}
		}

		let dispatch = lock(&state).handle(&req.method, &req.params);
		let outcome = match dispatch {
			Dispatch::Reply(outcome) => outcome,
			Dispatch::Exit => break,
		};
		let resp = Message::Response(Response { id: req.id, outcome });
		if codec.write_message(&mut w, resp).await.is_err() {
			break;
		}
	}
}

#[derive(Debug, Default)]
struct LaunchLog {
	engines: Vec<Arc<Mutex<FakeState>>>,
	live: usize,
	terminated: usize,
}

/// Test launcher that creates in-process fake engines.
#[derive(Clone, Default)]
pub struct TestLauncher {
	log: Arc<Mutex<LaunchLog>>,
	failure: Option<FilterError>,
	gate: Option<Arc<Semaphore>>,
}

impl TestLauncher {
	/// Create a launcher whose engines answer immediately.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a launcher whose every launch fails with `err`.
	#[must_use]
	pub fn failing(err: FilterError) -> Self {
		Self {
			failure: Some(err),
			..Self::default()
		}
	}

	/// Create a launcher whose engines hold each ex command until [`Self::release`].
	#[must_use]
	pub fn gated() -> Self {
		Self {
			gate: Some(Arc::new(Semaphore::new(0))),
			..Self::default()
		}
	}

	/// Lets `n` held commands proceed.
	pub fn release(&self, n: usize) {
		if let Some(gate) = &self.gate {
			gate.add_permits(n);
		}
	}

	/// Number of sessions launched so far.
	pub fn launches(&self) -> usize {
		lock(&self.log).engines.len()
	}

	/// Sessions launched and not yet terminated.
	pub fn live_processes(&self) -> usize {
		lock(&self.log).live
	}

	/// Sessions terminated so far.
	pub fn terminated(&self) -> usize {
		lock(&self.log).terminated
	}

	/// Snapshot of the most recently launched engine.
	pub fn last_engine(&self) -> Option<FakeState> {
		let log = lock(&self.log);
		log.engines.last().map(|state| lock(state).clone())
	}
}

#[async_trait]
impl EngineLauncher for TestLauncher {
	async fn launch(&self) -> Result<EngineSession> {
		if let Some(err) = &self.failure {
			return Err(err.clone());
		}

		let state = Arc::new(Mutex::new(FakeState::new()));
		let (client_end, server_end) = tokio::io::duplex(64 * 1024);
		let server = tokio::spawn(serve(server_end, state.clone(), self.gate.clone()));
		let (r, w) = tokio::io::split(client_end);
		let api = NvimApi::new(RpcClient::spawn(r, w));

		{
			let mut log = lock(&self.log);
			log.engines.push(state);
			log.live += 1;
		}

		let process = FakeProcess {
			server,
			log: self.log.clone(),
			terminated: false,
		};
		Ok(EngineSession::new(Box::new(api), Box::new(process)).with_quit_timeout(Duration::from_millis(200)))
	}
}

struct FakeProcess {
	server: JoinHandle<()>,
	log: Arc<Mutex<LaunchLog>>,
	terminated: bool,
}

#[async_trait]
impl EngineProcess for FakeProcess {
	async fn terminate(&mut self) {
		self.server.abort();
		let _ = (&mut self.server).await;
		if !self.terminated {
			self.terminated = true;
			let mut log = lock(&self.log);
			log.live -= 1;
			log.terminated += 1;
		}
	}
}
