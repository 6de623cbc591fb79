//! User-facing rendering of execution failures.

use crate::error::FilterError;
use crate::guard::AlreadyRunning;

/// Where Neovim installation instructions live.
pub const INSTALL_URL: &str = "https://github.com/neovim/neovim/blob/master/INSTALL.md";

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
	/// Informational message (default).
	#[default]
	Info,
	/// Something was skipped but the editor state is intact.
	Warn,
	/// The command did not run to completion.
	Error,
}

/// Something the user can do about a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
	/// Offer to open a page in the browser.
	OpenUrl {
		/// Button or link label.
		label: String,
		/// Target address.
		url: String,
	},
}

/// A message for the editor to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
	/// How loudly to show it.
	pub level: Level,
	/// Text shown to the user.
	pub message: String,
	/// Optional follow-up action.
	pub remediation: Option<Remediation>,
}

impl Notice {
	/// A notice without a follow-up action.
	pub fn new(level: Level, message: impl Into<String>) -> Self {
		Self {
			level,
			message: message.into(),
			remediation: None,
		}
	}

	/// Attach a follow-up action.
	#[must_use]
	pub fn with_remediation(mut self, remediation: Remediation) -> Self {
		self.remediation = Some(remediation);
		self
	}
}

impl std::fmt::Display for Notice {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.message)?;
		match &self.remediation {
			Some(Remediation::OpenUrl { label, url }) => write!(f, " ({label}: {url})"),
			None => Ok(()),
		}
	}
}

impl FilterError {
	/// Builds the notice for this failure.
	pub fn notice(&self) -> Notice {
		match self {
			Self::EngineNotFound { reason } => Notice::new(
				Level::Error,
				format!("Neovim 0.10 or newer is required to run ex commands ({reason})"),
			)
			.with_remediation(Remediation::OpenUrl {
				label: "Install Neovim".into(),
				url: INSTALL_URL.into(),
			}),
			Self::CommandFailed { command, message } => {
				Notice::new(Level::Error, format!("Command `{command}` failed: {message}"))
			}
			Self::Connection(detail) => {
				tracing::error!(%detail, "engine connection failed");
				Notice::new(Level::Error, "Lost connection to Neovim while running the command")
			}
		}
	}
}

impl AlreadyRunning {
	/// Builds the notice for a rejected overlapping invocation.
	pub fn notice(&self) -> Notice {
		Notice::new(Level::Warn, "A command is already running")
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn missing_engine_offers_install_link() {
		let notice = FilterError::EngineNotFound { reason: "nvim: not found".into() }.notice();
		assert_eq!(notice.level, Level::Error);
		assert_eq!(
			notice.remediation,
			Some(Remediation::OpenUrl {
				label: "Install Neovim".into(),
				url: INSTALL_URL.into(),
			})
		);
		assert!(notice.to_string().ends_with(&format!("(Install Neovim: {INSTALL_URL})")), "{notice}");
	}

	#[test]
	fn command_failure_quotes_diagnostic() {
		let notice = FilterError::CommandFailed {
			command: "'<,'>frob".into(),
			message: "Vim:E492: Not an editor command: '<,'>frob".into(),
		}
		.notice();
		assert_eq!(
			notice.message,
			"Command `'<,'>frob` failed: Vim:E492: Not an editor command: '<,'>frob"
		);
		assert_eq!(notice.remediation, None);
	}
}
