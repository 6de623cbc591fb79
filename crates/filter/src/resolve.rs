//! Locating the engine binary.
//!
//! Resolution runs once per process. Its outcome, including failure, is
//! cached and reused by every later launch.

use std::path::PathBuf;

use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::config::{DEFAULT_PROGRAM, EngineConfig, Version};
use crate::error::FilterError;

static RESOLVED: OnceCell<Result<ResolvedEngine, String>> = OnceCell::const_new();

/// An engine binary that passed the version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEngine {
	/// Absolute path to the executable.
	pub path: PathBuf,
	/// Version reported by `--version`.
	pub version: Version,
}

/// Returns the cached engine, resolving it with `config` on first use.
///
/// Later calls ignore `config`; the first resolution wins for the lifetime
/// of the process.
pub async fn resolve_engine(config: &EngineConfig) -> Result<&'static ResolvedEngine, FilterError> {
	let resolved = RESOLVED.get_or_init(|| locate(config)).await;
	resolved
		.as_ref()
		.map_err(|reason| FilterError::EngineNotFound { reason: reason.clone() })
}

/// Finds and version-checks the engine without touching the cache.
pub async fn locate(config: &EngineConfig) -> Result<ResolvedEngine, String> {
	let program = config
		.program
		.clone()
		.unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM));
	let path = which::which(&program).map_err(|e| format!("{}: {e}", program.display()))?;

	let output = Command::new(&path)
		.arg("--version")
		.output()
		.await
		.map_err(|e| format!("{}: {e}", path.display()))?;
	if !output.status.success() {
		return Err(format!("{} --version exited with {}", path.display(), output.status));
	}

	let banner = String::from_utf8_lossy(&output.stdout);
	let version = Version::parse_banner(&banner)
		.ok_or_else(|| format!("{} is not Neovim: unrecognized version banner", path.display()))?;
	if version < config.min_version {
		return Err(format!(
			"{} is version {version}, need at least {}",
			path.display(),
			config.min_version
		));
	}

	tracing::info!(path = %path.display(), %version, "engine resolved");
	Ok(ResolvedEngine { path, version })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn missing_binary_is_reported() {
		let config = EngineConfig::new().program("/nonexistent/exbridge/nvim");
		let err = locate(&config).await.unwrap_err();
		assert!(err.contains("/nonexistent/exbridge/nvim"), "{err}");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn non_neovim_binary_is_rejected() {
		let config = EngineConfig::new().program("true");
		let Ok(_) = which::which("true") else {
			return;
		};
		let err = locate(&config).await.unwrap_err();
		assert!(err.contains("not Neovim"), "{err}");
	}
}
