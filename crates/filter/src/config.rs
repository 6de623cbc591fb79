//! Configuration for locating and launching the engine.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the engine binary.
pub const ENGINE_ENV: &str = "EXBRIDGE_NVIM";

/// Binary looked up on `PATH` when nothing else is configured.
pub const DEFAULT_PROGRAM: &str = "nvim";

/// Oldest engine release with extmark invalidation.
pub const MIN_VERSION: Version = Version::new(0, 10, 0);

/// A `major.minor.patch` release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
	/// Major release.
	pub major: u32,
	/// Minor release.
	pub minor: u32,
	/// Patch release.
	pub patch: u32,
}

impl Version {
	/// Creates a version.
	pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
		Self { major, minor, patch }
	}

	/// Parses the first line of `nvim --version`, e.g. `NVIM v0.10.2`.
	///
	/// Pre-release suffixes such as `-dev-1234+gabcdef` are ignored.
	pub fn parse_banner(banner: &str) -> Option<Self> {
		let first = banner.lines().next()?;
		let rest = first.trim().strip_prefix("NVIM")?.trim_start();
		let rest = rest.strip_prefix('v').unwrap_or(rest);
		let core = rest.split(['-', '+', ' ']).next()?;

		let mut parts = core.split('.').map(str::parse::<u32>);
		let major = parts.next()?.ok()?;
		let minor = parts.next()?.ok()?;
		let patch = match parts.next() {
			Some(p) => p.ok()?,
			None => 0,
		};
		Some(Self::new(major, minor, patch))
	}
}

impl std::fmt::Display for Version {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
	}
}

/// Configuration for starting the engine process.
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Explicit binary path or name. Falls back to [`DEFAULT_PROGRAM`] on `PATH`.
	pub program: Option<PathBuf>,
	/// Extra arguments appended after the embedding flags.
	pub args: Vec<String>,
	/// Oldest accepted engine version.
	pub min_version: Version,
	/// How long teardown waits for a graceful quit before killing.
	pub quit_timeout: Duration,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			program: None,
			args: Vec::new(),
			min_version: MIN_VERSION,
			quit_timeout: Duration::from_millis(500),
		}
	}
}

impl EngineConfig {
	/// Create a configuration with defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Defaults, with the binary taken from [`ENGINE_ENV`] when set.
	pub fn from_env() -> Self {
		let program = std::env::var_os(ENGINE_ENV)
			.filter(|v| !v.is_empty())
			.map(PathBuf::from);
		Self {
			program,
			..Self::default()
		}
	}

	/// Set the engine binary.
	pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
		self.program = Some(program.into());
		self
	}

	/// Add command line arguments.
	pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.args = args.into_iter().map(Into::into).collect();
		self
	}

	/// Set the minimum accepted version.
	pub fn min_version(mut self, version: Version) -> Self {
		self.min_version = version;
		self
	}

	/// Set the graceful quit timeout.
	pub fn quit_timeout(mut self, timeout: Duration) -> Self {
		self.quit_timeout = timeout;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_release_banner() {
		let banner = "NVIM v0.10.2\nBuild type: Release\nLuaJIT 2.1.1713484068";
		assert_eq!(Version::parse_banner(banner), Some(Version::new(0, 10, 2)));
	}

	#[test]
	fn parses_dev_banner() {
		let banner = "NVIM v0.11.0-dev-1654+g2a883d9c59\nBuild type: RelWithDebInfo";
		assert_eq!(Version::parse_banner(banner), Some(Version::new(0, 11, 0)));
	}

	#[test]
	fn rejects_other_programs() {
		assert_eq!(Version::parse_banner("VIM - Vi IMproved 9.1"), None);
		assert_eq!(Version::parse_banner(""), None);
	}

	#[test]
	fn version_ordering() {
		assert!(Version::new(0, 9, 5) < MIN_VERSION);
		assert!(Version::new(0, 10, 0) >= MIN_VERSION);
		assert!(Version::new(1, 0, 0) > Version::new(0, 99, 99));
	}

	#[test]
	fn config_builder() {
		let config = EngineConfig::new()
			.program("/opt/nvim/bin/nvim")
			.args(["--cmd", "set noswapfile"])
			.min_version(Version::new(0, 11, 0))
			.quit_timeout(Duration::from_millis(50));

		assert_eq!(config.program, Some(PathBuf::from("/opt/nvim/bin/nvim")));
		assert_eq!(config.args, vec!["--cmd", "set noswapfile"]);
		assert_eq!(config.min_version, Version::new(0, 11, 0));
		assert_eq!(config.quit_timeout, Duration::from_millis(50));
	}
}
