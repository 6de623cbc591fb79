//! Execution protocol against the in-process fake engine.

use std::sync::Arc;
use std::time::Duration;

use exbridge_filter::launcher::test_helpers::TestLauncher;
use exbridge_filter::{
	AlreadyRunning, CursorSpec, EngineConfig, ExecutionResult, Filter, FilterError, InvocationGuard, LineRange, Position,
	Reconciled, reconcile,
};
use pretty_assertions::assert_eq;

fn lines(text: &[&str]) -> Vec<String> {
	text.iter().map(|l| l.to_string()).collect()
}

fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

async fn run(launcher: &TestLauncher, content: &[&str], command: &str, cursors: &[CursorSpec]) -> Result<ExecutionResult, FilterError> {
	init_tracing();
	Filter::with_launcher(launcher.clone())
		.execute(&lines(content), command, cursors)
		.await
}

#[tokio::test]
async fn global_run_without_cursors() {
	let launcher = TestLauncher::new();
	let result = run(&launcher, &["foo", "bar foo"], "%s/foo/x/g", &[]).await.unwrap();

	assert_eq!(result.lines, lines(&["x", "bar x"]));
	assert!(result.cursor_positions.is_empty());

	let engine = launcher.last_engine().unwrap();
	assert_eq!(engine.commands, vec!["%s/foo/x/g"]);
	assert!(!engine.calls.iter().any(|c| c == "nvim_win_set_cursor"));
	assert!(!engine.calls.iter().any(|c| c == "nvim_buf_set_mark"));
	assert!(engine.quit_requested);
	assert_eq!(launcher.live_processes(), 0);
	assert_eq!(launcher.terminated(), 1);
}

#[tokio::test]
async fn out_of_range_cursors_are_clamped() {
	let launcher = TestLauncher::new();
	let cursors = [
		CursorSpec::cursor(Position::new(10, 50)),
		CursorSpec::cursor(Position::new(0, 99)),
	];
	let result = run(&launcher, &["ab", "cde"], "", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["ab", "cde"]));
	assert_eq!(
		result.cursor_positions,
		vec![Some(Position::new(1, 3)), Some(Position::new(0, 2))]
	);
}

#[tokio::test]
async fn clamped_selection_end_lands_on_last_line() {
	let launcher = TestLauncher::new();
	let cursors = [CursorSpec::with_selection(Position::new(0, 0), LineRange::new(1, 9))];
	let result = run(&launcher, &["a", "b", "c"], "d", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["a"]));
	let engine = launcher.last_engine().unwrap();
	assert_eq!(engine.marks[&'>'], Position::new(2, 1));
}

#[tokio::test]
async fn noop_command_round_trips() {
	let launcher = TestLauncher::new();
	let cursors = [
		CursorSpec::cursor(Position::new(0, 1)),
		CursorSpec::cursor(Position::new(2, 0)),
	];
	let result = run(&launcher, &["one", "two", "three"], "", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["one", "two", "three"]));
	assert_eq!(
		result.cursor_positions,
		vec![Some(Position::new(0, 1)), Some(Position::new(2, 0))]
	);
}

#[tokio::test]
async fn selection_runs_over_visual_marks() {
	let launcher = TestLauncher::new();
	let cursors = [CursorSpec::with_selection(Position::new(3, 0), LineRange::new(1, 3))];
	let result = run(&launcher, &["l0", "l1", "l2", "l3", "l4"], "d", &cursors).await.unwrap();

	let engine = launcher.last_engine().unwrap();
	assert_eq!(engine.commands, vec!["'<,'>d"]);
	// Sent one-indexed as lines 2 and 4.
	assert_eq!(engine.marks[&'<'], Position::new(1, 0));
	assert_eq!(engine.marks[&'>'], Position::new(3, 2));

	assert_eq!(result.lines, lines(&["l0", "l4"]));
	assert_eq!(result.cursor_positions, vec![None]);
}

#[tokio::test]
async fn cursors_run_independently_in_input_order() {
	let launcher = TestLauncher::new();
	let cursors = [
		CursorSpec::cursor(Position::new(2, 0)),
		CursorSpec::cursor(Position::new(0, 0)),
	];
	let result = run(&launcher, &["a", "b", "c"], "t.", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["a", "a", "b", "c", "c"]));
	assert_eq!(
		result.cursor_positions,
		vec![Some(Position::new(3, 0)), Some(Position::new(0, 0))]
	);
	assert_eq!(launcher.last_engine().unwrap().commands, vec!["t.", "t."]);
}

#[tokio::test]
async fn per_line_substitute_runs_once_per_cursor() {
	let launcher = TestLauncher::new();
	let cursors = [
		CursorSpec::cursor(Position::new(0, 0)),
		CursorSpec::cursor(Position::new(2, 4)),
	];
	let result = run(&launcher, &["foo a", "bar", "foo b"], "s/foo/X/", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["X a", "bar", "X b"]));
	assert_eq!(
		result.cursor_positions,
		vec![Some(Position::new(0, 0)), Some(Position::new(2, 2))]
	);
	assert_eq!(launcher.last_engine().unwrap().commands, vec!["s/foo/X/", "s/foo/X/"]);
}

#[tokio::test]
async fn cursor_follows_text_inserted_before_it() {
	let launcher = TestLauncher::new();
	let cursors = [CursorSpec::cursor(Position::new(0, 4))];
	let result = run(&launcher, &["abc def"], "s/^/XX/", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["XXabc def"]));
	assert_eq!(result.cursor_positions, vec![Some(Position::new(0, 6))]);
}

#[tokio::test]
async fn cursor_stays_left_of_text_inserted_at_it() {
	let launcher = TestLauncher::new();
	let cursors = [CursorSpec::cursor(Position::new(0, 0))];
	let result = run(&launcher, &["abc"], "s/^/>/", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&[">abc"]));
	assert_eq!(result.cursor_positions, vec![Some(Position::new(0, 0))]);
}

#[tokio::test]
async fn selection_end_advances_with_appended_text() {
	let launcher = TestLauncher::new();
	let cursors = [CursorSpec::with_selection(Position::new(0, 1), LineRange::new(0, 1))];
	let result = run(&launcher, &["ab", "cd"], "s/$/!/", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["ab!", "cd!"]));
	assert_eq!(result.cursor_positions, vec![Some(Position::new(0, 1))]);

	let engine = launcher.last_engine().unwrap();
	assert_eq!(engine.commands, vec!["'<,'>s/$/!/"]);
	let gravities: Vec<bool> = engine.extmarks.values().map(|m| m.right_gravity).collect();
	assert_eq!(gravities, vec![false, false, true]);

	let placed: Vec<(usize, usize)> = engine.extmarks.values().map(|m| (m.row, m.col)).collect();
	// caret, selection start, selection end
	assert_eq!(placed, vec![(0, 1), (0, 0), (1, 3)]);
}

#[tokio::test]
async fn rejected_command_reports_effective_text_and_tears_down() {
	let launcher = TestLauncher::new();
	let cursors = [CursorSpec::with_selection(Position::new(0, 0), LineRange::new(0, 1))];
	let err = run(&launcher, &["a", "b"], "frob", &cursors).await.unwrap_err();

	assert_eq!(
		err,
		FilterError::CommandFailed {
			command: "'<,'>frob".into(),
			message: "Vim:E492: Not an editor command: '<,'>frob".into(),
		}
	);
	assert!(launcher.last_engine().unwrap().quit_requested);
	assert_eq!(launcher.live_processes(), 0);
	assert_eq!(launcher.terminated(), 1);
}

#[tokio::test]
async fn failure_on_a_later_cursor_stops_the_loop() {
	let launcher = TestLauncher::new();
	let cursors = [
		CursorSpec::cursor(Position::new(0, 0)),
		CursorSpec::cursor(Position::new(1, 0)),
		CursorSpec::cursor(Position::new(0, 0)),
	];
	let err = run(&launcher, &["a", "c"], "s/a/b/", &cursors).await.unwrap_err();

	assert_eq!(
		err,
		FilterError::CommandFailed {
			command: "s/a/b/".into(),
			message: "Vim(substitute):E486: Pattern not found: a".into(),
		}
	);
	assert_eq!(launcher.last_engine().unwrap().commands.len(), 2);
	assert_eq!(launcher.live_processes(), 0);
}

#[tokio::test]
async fn orphaned_marker_yields_none_while_others_resolve() {
	let launcher = TestLauncher::new();
	let cursors = [
		CursorSpec::cursor(Position::new(1, 0)),
		CursorSpec::with_selection(Position::new(3, 0), LineRange::new(0, 0)),
	];
	let result = run(&launcher, &["l0", "l1", "l2", "l3"], "d", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["l2", "l3"]));
	assert_eq!(result.cursor_positions, vec![None, Some(Position::new(1, 0))]);
	assert_eq!(launcher.last_engine().unwrap().commands, vec!["d", "'<,'>d"]);
}

#[tokio::test]
async fn cursor_orphaned_by_an_earlier_iteration_is_skipped() {
	let launcher = TestLauncher::new();
	let cursors = [
		CursorSpec::cursor(Position::new(0, 0)),
		CursorSpec::cursor(Position::new(0, 1)),
	];
	let result = run(&launcher, &["gone", "kept"], "d", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&["kept"]));
	assert_eq!(result.cursor_positions, vec![None, None]);
	assert_eq!(launcher.last_engine().unwrap().commands, vec!["d"]);
	assert_eq!(reconcile(&result), Reconciled::Unchanged);
}

#[tokio::test]
async fn empty_document_is_loaded_as_one_empty_line() {
	let launcher = TestLauncher::new();
	let cursors = [CursorSpec::cursor(Position::new(4, 4))];
	let result = run(&launcher, &[], "", &cursors).await.unwrap();

	assert_eq!(result.lines, lines(&[""]));
	assert_eq!(result.cursor_positions, vec![Some(Position::new(0, 0))]);
}

#[tokio::test]
async fn launch_failure_is_surfaced_unchanged() {
	let missing = FilterError::EngineNotFound {
		reason: "nvim: cannot find binary path".into(),
	};
	let launcher = TestLauncher::failing(missing.clone());
	let err = run(&launcher, &["a"], "d", &[]).await.unwrap_err();

	assert_eq!(err, missing);
	assert_eq!(launcher.launches(), 0);
}

#[tokio::test]
async fn missing_binary_is_engine_not_found() {
	init_tracing();
	let filter = Filter::new(EngineConfig::new().program("/nonexistent/exbridge/nvim"));
	let err = filter.execute(&lines(&["a"]), "d", &[]).await.unwrap_err();
	assert!(matches!(err, FilterError::EngineNotFound { .. }), "{err}");
	assert!(err.notice().remediation.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_invocation_is_rejected() {
	init_tracing();
	let launcher = TestLauncher::gated();
	let filter = Arc::new(Filter::with_launcher(launcher.clone()));
	let guard = Arc::new(InvocationGuard::new());

	let first = tokio::spawn({
		let filter = filter.clone();
		let guard = guard.clone();
		async move {
			let content = lines(&["a", "b"]);
			guard.run(filter.execute(&content, "d", &[])).await
		}
	});

	tokio::time::timeout(Duration::from_secs(5), async {
		while !(guard.is_running() && launcher.launches() == 1) {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.unwrap();

	assert_eq!(guard.try_begin().unwrap_err(), AlreadyRunning);
	let second = guard.run(filter.execute(&lines(&["x"]), "d", &[])).await;
	assert_eq!(second.unwrap_err(), AlreadyRunning);
	assert_eq!(launcher.launches(), 1);

	launcher.release(1);
	let result = first.await.unwrap().unwrap().unwrap();
	assert_eq!(result.lines, lines(&["b"]));
	assert!(!guard.is_running());
	assert_eq!(launcher.live_processes(), 0);
}
