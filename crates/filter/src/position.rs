//! Coordinates exchanged between the editor and the engine.

/// A zero-indexed position in a line-oriented buffer.
///
/// `col` is a byte offset within the line, matching the engine's own unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
	/// Zero-indexed line.
	pub line: usize,
	/// Zero-indexed byte column within the line.
	pub col: usize,
}

impl Position {
	/// Creates a position.
	pub const fn new(line: usize, col: usize) -> Self {
		Self { line, col }
	}

	/// Clamps the position into `lines`.
	///
	/// The line is limited to the last line and the column to that line's
	/// length. An empty document clamps everything to `(0, 0)`.
	#[must_use]
	pub fn clamp_to(self, lines: &[String]) -> Self {
		let Some(last) = lines.len().checked_sub(1) else {
			return Self::default();
		};
		let line = self.line.min(last);
		Self {
			line,
			col: self.col.min(lines[line].len()),
		}
	}

	/// The end-of-line position of `line`, clamped into `lines`.
	#[must_use]
	pub fn line_end(lines: &[String], line: usize) -> Self {
		Self::new(line, usize::MAX).clamp_to(lines)
	}
}

impl std::fmt::Display for Position {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.line, self.col)
	}
}

/// An inclusive, line-granular selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
	start_line: usize,
	end_line: usize,
}

impl LineRange {
	/// Creates a range covering both lines, whichever order they come in.
	pub fn new(a: usize, b: usize) -> Self {
		Self {
			start_line: a.min(b),
			end_line: a.max(b),
		}
	}

	/// First selected line.
	pub fn start_line(&self) -> usize {
		self.start_line
	}

	/// Last selected line (inclusive).
	pub fn end_line(&self) -> usize {
		self.end_line
	}
}

/// One editor cursor handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSpec {
	/// The active caret.
	pub anchor: Position,
	/// Lines the command should be restricted to, if any.
	pub selection: Option<LineRange>,
}

impl CursorSpec {
	/// A pure cursor with no selection.
	pub fn cursor(anchor: Position) -> Self {
		Self { anchor, selection: None }
	}

	/// A cursor carrying a line selection.
	pub fn with_selection(anchor: Position, selection: LineRange) -> Self {
		Self {
			anchor,
			selection: Some(selection),
		}
	}
}

/// Output of one command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
	/// The engine's buffer after the command ran.
	pub lines: Vec<String>,
	/// Final cursor position per input cursor, in input order.
	///
	/// `None` marks a cursor whose line was deleted.
	pub cursor_positions: Vec<Option<Position>>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn doc(lines: &[&str]) -> Vec<String> {
		lines.iter().map(|l| l.to_string()).collect()
	}

	#[test]
	fn clamps_line_and_column_independently() {
		let lines = doc(&["abc", "hello world", "xy"]);
		assert_eq!(Position::new(9, 1).clamp_to(&lines), Position::new(2, 1));
		assert_eq!(Position::new(0, 40).clamp_to(&lines), Position::new(0, 3));
		assert_eq!(Position::new(7, 40).clamp_to(&lines), Position::new(2, 2));
		assert_eq!(Position::new(1, 5).clamp_to(&lines), Position::new(1, 5));
	}

	#[test]
	fn empty_document_clamps_to_origin() {
		assert_eq!(Position::new(3, 8).clamp_to(&[]), Position::new(0, 0));
		assert_eq!(Position::line_end(&[], 2), Position::new(0, 0));
	}

	#[test]
	fn line_end_uses_byte_length() {
		let lines = doc(&["", "héllo"]);
		assert_eq!(Position::line_end(&lines, 1), Position::new(1, 6));
		assert_eq!(Position::line_end(&lines, 0), Position::new(0, 0));
	}

	#[test]
	fn line_range_orders_endpoints() {
		let range = LineRange::new(4, 1);
		assert_eq!((range.start_line(), range.end_line()), (1, 4));
	}
}
