//! Engine launcher abstraction for production and testing.
//!
//! A launch yields an [`EngineSession`]: the RPC surface plus the process
//! behind it. Sessions are torn down on every exit path of an execution.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use exbridge_rpc::RpcClient;
use tokio::process::{Child, Command};

use crate::config::EngineConfig;
use crate::engine::{EngineApi, NvimApi};
use crate::error::{FilterError, Result};
use crate::resolve::resolve_engine;

#[doc(hidden)]
pub mod test_helpers;

/// Flags for a headless, embedded, config-free engine.
pub const EMBED_ARGS: [&str; 4] = ["--embed", "--headless", "--clean", "-n"];

/// The process side of a session.
#[async_trait]
pub trait EngineProcess: Send + Sync {
	/// Unconditionally stops the process and reaps it.
	async fn terminate(&mut self);
}

#[async_trait]
impl EngineProcess for Child {
	async fn terminate(&mut self) {
		match self.try_wait() {
			Ok(Some(status)) => {
				tracing::debug!(?status, "engine already exited");
				return;
			}
			Ok(None) => {}
			Err(error) => tracing::debug!(%error, "failed to poll engine status"),
		}
		if let Err(error) = self.kill().await {
			tracing::warn!(%error, "failed to kill engine process");
		}
	}
}

/// A running engine: its API and its process.
pub struct EngineSession {
	api: Box<dyn EngineApi>,
	process: Box<dyn EngineProcess>,
	quit_timeout: Duration,
}

impl std::fmt::Debug for EngineSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EngineSession")
			.field("quit_timeout", &self.quit_timeout)
			.finish_non_exhaustive()
	}
}

impl EngineSession {
	/// Pairs an API with the process serving it.
	pub fn new(api: Box<dyn EngineApi>, process: Box<dyn EngineProcess>) -> Self {
		Self {
			api,
			process,
			quit_timeout: EngineConfig::default().quit_timeout,
		}
	}

	/// Set how long teardown waits for a graceful quit.
	pub fn with_quit_timeout(mut self, timeout: Duration) -> Self {
		self.quit_timeout = timeout;
		self
	}

	/// The engine's RPC surface.
	pub fn api(&self) -> &dyn EngineApi {
		self.api.as_ref()
	}

	/// Asks the engine to quit, then terminates the process regardless.
	///
	/// Quit failures are expected (the engine usually closes the channel
	/// without answering) and only logged.
	pub async fn teardown(mut self) {
		match tokio::time::timeout(self.quit_timeout, self.api.quit()).await {
			Ok(Ok(())) => tracing::debug!("engine acknowledged quit"),
			Ok(Err(error)) => tracing::debug!(%error, "graceful quit did not complete"),
			Err(_) => tracing::debug!(timeout = ?self.quit_timeout, "graceful quit timed out"),
		}
		self.process.terminate().await;
		tracing::info!("engine session torn down");
	}
}

/// Starts engine sessions.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
	/// Resolve, spawn and attach a fresh engine.
	async fn launch(&self) -> Result<EngineSession>;
}

/// Production launcher that spawns a real Neovim process.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
	config: EngineConfig,
}

impl ProcessLauncher {
	/// Create a launcher for the given configuration.
	#[must_use]
	pub fn new(config: EngineConfig) -> Self {
		Self { config }
	}
}

#[async_trait]
impl EngineLauncher for ProcessLauncher {
	async fn launch(&self) -> Result<EngineSession> {
		let engine = resolve_engine(&self.config).await?;

		tracing::info!(path = %engine.path.display(), version = %engine.version, "starting engine");

		let mut child = Command::new(&engine.path)
			.args(EMBED_ARGS)
			.args(&self.config.args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| {
				tracing::error!(error = %e, "failed to spawn engine");
				FilterError::Connection(format!("failed to spawn {}: {e}", engine.path.display()))
			})?;

		let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
			child.terminate().await;
			return Err(FilterError::Connection("failed to capture engine stdio".into()));
		};

		let api = NvimApi::new(RpcClient::spawn(stdout, stdin));
		Ok(EngineSession::new(Box::new(api), Box::new(child)).with_quit_timeout(self.config.quit_timeout))
	}
}
