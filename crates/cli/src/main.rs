//! Exbridge command line.
//!
//! Runs one ex command over FILE (or stdin) through a headless Neovim. The
//! new content goes to stdout. Each `--cursor` is reported on stderr as
//! `LINE:COL`, or `-` when the command deleted it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use exbridge_filter::{CursorSpec, EngineConfig, ExecutionResult, Filter, LineRange, Position};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "exbridge")]
#[command(about = "Run a Neovim ex command over a file, preserving cursor positions")]
struct Args {
	/// Neovim executable (defaults to $EXBRIDGE_NVIM, then nvim on PATH)
	#[arg(long, value_name = "PATH")]
	nvim: Option<PathBuf>,

	/// Cursor as zero-indexed LINE:COL, with an optional @START-END line selection
	#[arg(short, long = "cursor", value_name = "LINE:COL[@START-END]", value_parser = parse_cursor)]
	cursors: Vec<CursorSpec>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	/// Ex command to run
	command: String,

	/// Input file (stdin when omitted)
	file: Option<PathBuf>,
}

fn parse_position(s: &str) -> Result<Position, String> {
	let (line, col) = s.split_once(':').ok_or_else(|| format!("expected LINE:COL, got `{s}`"))?;
	let line = line.parse().map_err(|e| format!("bad line `{line}`: {e}"))?;
	let col = col.parse().map_err(|e| format!("bad column `{col}`: {e}"))?;
	Ok(Position::new(line, col))
}

fn parse_cursor(s: &str) -> Result<CursorSpec, String> {
	let Some((pos, range)) = s.split_once('@') else {
		return parse_position(s).map(CursorSpec::cursor);
	};
	let anchor = parse_position(pos)?;
	let (start, end) = range
		.split_once('-')
		.ok_or_else(|| format!("expected START-END, got `{range}`"))?;
	let start = start.parse().map_err(|e| format!("bad start line `{start}`: {e}"))?;
	let end = end.parse().map_err(|e| format!("bad end line `{end}`: {e}"))?;
	Ok(CursorSpec::with_selection(anchor, LineRange::new(start, end)))
}

fn render(result: &ExecutionResult) -> (String, String) {
	let mut text = String::new();
	for line in &result.lines {
		text.push_str(line);
		text.push('\n');
	}
	let mut cursors = String::new();
	for slot in &result.cursor_positions {
		match slot {
			Some(pos) => cursors.push_str(&pos.to_string()),
			None => cursors.push('-'),
		}
		cursors.push('\n');
	}
	(text, cursors)
}

async fn read_input(file: Option<&PathBuf>) -> std::io::Result<Vec<String>> {
	let text = match file {
		Some(path) => tokio::fs::read_to_string(path).await?,
		None => {
			let mut text = String::new();
			tokio::io::stdin().read_to_string(&mut text).await?;
			text
		}
	};
	Ok(text.lines().map(str::to_owned).collect())
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let content = match read_input(args.file.as_ref()).await {
		Ok(content) => content,
		Err(error) => {
			eprintln!("exbridge: cannot read input: {error}");
			return ExitCode::from(2);
		}
	};

	let mut config = EngineConfig::from_env();
	if let Some(nvim) = args.nvim {
		config = config.program(nvim);
	}

	info!(command = %args.command, cursors = args.cursors.len(), "running");
	let result = match Filter::new(config).execute(&content, &args.command, &args.cursors).await {
		Ok(result) => result,
		Err(error) => {
			eprintln!("exbridge: {}", error.notice());
			return ExitCode::FAILURE;
		}
	};

	let (text, cursors) = render(&result);
	let written = async {
		tokio::io::stdout().write_all(text.as_bytes()).await?;
		tokio::io::stdout().flush().await?;
		tokio::io::stderr().write_all(cursors.as_bytes()).await
	};
	match written.await {
		Ok(()) => ExitCode::SUCCESS,
		Err(error) => {
			eprintln!("exbridge: cannot write output: {error}");
			ExitCode::from(2)
		}
	}
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("exbridge_filter=debug,exbridge_rpc=debug,info")
		} else {
			EnvFilter::new("warn")
		}
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.init();
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn cursor_flags() {
		assert_eq!(parse_cursor("3:4"), Ok(CursorSpec::cursor(Position::new(3, 4))));
		assert_eq!(
			parse_cursor("2:0@5-1"),
			Ok(CursorSpec::with_selection(Position::new(2, 0), LineRange::new(1, 5)))
		);
		assert!(parse_cursor("3").is_err());
		assert!(parse_cursor("1:2@3").is_err());
		assert!(parse_cursor("a:2").is_err());
	}

	#[test]
	fn output_marks_orphaned_cursors() {
		let result = ExecutionResult {
			lines: vec!["a".into(), "b".into()],
			cursor_positions: vec![Some(Position::new(1, 0)), None],
		};
		assert_eq!(render(&result), ("a\nb\n".to_string(), "1:0\n-\n".to_string()));
	}

	#[test]
	fn args_parse() {
		let args = Args::try_parse_from(["exbridge", "-c", "0:0", "--cursor", "1:1@0-2", "%s/a/b/g", "in.txt"]).unwrap();
		assert_eq!(args.cursors.len(), 2);
		assert_eq!(args.command, "%s/a/b/g");
		assert_eq!(args.file, Some(PathBuf::from("in.txt")));
	}
}
