//! Mapping between editor selections and execution inputs and outputs.

use crate::position::{CursorSpec, ExecutionResult, LineRange, Position};

/// Builds the input for one editor selection.
///
/// `anchor` is where the selection started and `head` is the caret. A
/// selection whose end sits at column 0 of a later line does not include
/// that line. An empty selection becomes a plain cursor.
pub fn cursor_spec_for_selection(anchor: Position, head: Position) -> CursorSpec {
	if anchor == head {
		return CursorSpec::cursor(head);
	}
	let (start, end) = if anchor <= head { (anchor, head) } else { (head, anchor) };
	let end_line = if end.col == 0 && end.line > start.line {
		end.line - 1
	} else {
		end.line
	};
	CursorSpec::with_selection(head, LineRange::new(start.line, end_line))
}

/// Cursor placement to apply after an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
	/// No cursor survived; keep the editor's current selections.
	Unchanged,
	/// Place a caret at each position, in input order.
	Cursors(Vec<Position>),
}

/// Converts engine output into caret positions valid in the new content.
///
/// Orphaned slots are dropped. Each surviving position is clamped into the
/// new lines and moved back onto a character boundary.
pub fn reconcile(result: &ExecutionResult) -> Reconciled {
	let cursors: Vec<Position> = result
		.cursor_positions
		.iter()
		.flatten()
		.map(|pos| snap_to_char(pos.clamp_to(&result.lines), &result.lines))
		.collect();
	if cursors.is_empty() {
		Reconciled::Unchanged
	} else {
		Reconciled::Cursors(cursors)
	}
}

fn snap_to_char(mut pos: Position, lines: &[String]) -> Position {
	if let Some(line) = lines.get(pos.line) {
		while !line.is_char_boundary(pos.col) {
			pos.col -= 1;
		}
	}
	pos
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn lines(text: &[&str]) -> Vec<String> {
		text.iter().map(|l| l.to_string()).collect()
	}

	#[test]
	fn empty_selection_is_a_cursor() {
		let at = Position::new(2, 3);
		assert_eq!(cursor_spec_for_selection(at, at), CursorSpec::cursor(at));
	}

	#[test]
	fn selection_ending_at_column_zero_excludes_that_line() {
		let spec = cursor_spec_for_selection(Position::new(1, 2), Position::new(4, 0));
		assert_eq!(spec.selection, Some(LineRange::new(1, 3)));
		assert_eq!(spec.anchor, Position::new(4, 0));
	}

	#[test]
	fn reversed_selection_is_ordered() {
		let spec = cursor_spec_for_selection(Position::new(5, 1), Position::new(2, 4));
		assert_eq!(spec.selection, Some(LineRange::new(2, 5)));
		assert_eq!(spec.anchor, Position::new(2, 4));
	}

	#[test]
	fn all_orphaned_keeps_editor_state() {
		let result = ExecutionResult {
			lines: lines(&["a"]),
			cursor_positions: vec![None, None],
		};
		assert_eq!(reconcile(&result), Reconciled::Unchanged);
	}

	#[test]
	fn survivors_are_clamped_and_snapped() {
		let result = ExecutionResult {
			lines: lines(&["héllo", "x"]),
			cursor_positions: vec![Some(Position::new(0, 2)), None, Some(Position::new(9, 9))],
		};
		assert_eq!(
			reconcile(&result),
			Reconciled::Cursors(vec![Position::new(0, 1), Position::new(1, 1)])
		);
	}
}
