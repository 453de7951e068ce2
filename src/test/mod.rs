use super::*;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;

use annotate::{fill_placeholders, improve_chunks, process_file, Outcome};
use std::io::Cursor;
use openaiapi::{ApiError, ChatRequest, Completer};
use splice::DEFAULT_PLACEHOLDER;

/// Replays canned replies in order and keeps every request it saw.
struct ScriptedCompleter {
	replies: RefCell<VecDeque<Result<String, ApiError>>>,
	seen: RefCell<Vec<ChatRequest>>,
}

impl ScriptedCompleter {
	fn new(replies: Vec<Result<String, ApiError>>) -> Self {
		ScriptedCompleter { replies: RefCell::new(replies.into()), seen: RefCell::new(Vec::new()) }
	}

	fn ok(replies: &[&str]) -> Self {
		Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
	}

	fn user_prompts(&self) -> Vec<String> {
		self.seen.borrow().iter().map(|r| r.messages[1].content.clone().unwrap_or_default()).collect()
	}
}

impl Completer for ScriptedCompleter {
	async fn complete(&self, request: &ChatRequest, sink: &mut dyn ProgressSink) -> Result<String, ApiError> {
		self.seen.borrow_mut().push(request.clone());
		let reply = self.replies.borrow_mut().pop_front().unwrap_or_else(|| Err(ApiError::Malformed("script exhausted".to_string())));
		if let Ok(text) = &reply {
			for piece in text.split_inclusive(' ') {
				sink.on_delta(piece);
			}
			sink.on_finish();
		}
		reply
	}
}

#[derive(Default)]
struct Recorder {
	deltas: Vec<String>,
	finished: usize,
}

impl ProgressSink for Recorder {
	fn on_delta(&mut self, delta: &str) {
		self.deltas.push(delta.to_string());
	}
	fn on_finish(&mut self) {
		self.finished += 1;
	}
}

fn job<'a>(instructions: &'a str, cap: Option<usize>) -> Job<'a> {
	Job {
		instructions,
		placeholder: DEFAULT_PLACEHOLDER,
		budget: UpdateBudget { cap, offset: 0 },
		max_snippet: splice::MAX_SNIPPET_LEN,
		chunk_size: chunks::DEFAULT_CHUNK_SIZE,
	}
}

const SOURCE: &str = "<comment here>\nfn add(a: i32, b: i32) -> i32 { a + b }\n\n<comment here>\nfn sub(a: i32, b: i32) -> i32 { a - b }\n\nfn mul(a: i32, b: i32) -> i32 {\n\t<comment here>\n\ta * b\n}\n";

#[tokio::test]
async fn three_tags_are_filled_in_order() {
	let completer = ScriptedCompleter::ok(&["/// Adds.", "/// Subtracts two numbers and returns the difference.", "// multiply"]);
	let mut sink = Recorder::default();

	let outcome = fill_placeholders(&completer, SOURCE, &job("be brief", None), &mut sink).await.unwrap();

	assert_eq!(outcome.found, 3);
	assert_eq!(outcome.applied, 3);
	assert_eq!(outcome.failed, 0);
	assert!(!outcome.document.contains(DEFAULT_PLACEHOLDER));
	assert_eq!(
		outcome.document,
		"/// Adds.\nfn add(a: i32, b: i32) -> i32 { a + b }\n\n/// Subtracts two numbers and returns the difference.\nfn sub(a: i32, b: i32) -> i32 { a - b }\n\nfn mul(a: i32, b: i32) -> i32 {\n\t// multiply\n\ta * b\n}\n"
	);
	assert_eq!(sink.finished, 3);
	assert_eq!(sink.deltas.concat(), "/// Adds./// Subtracts two numbers and returns the difference.// multiply");
}

#[tokio::test]
async fn prompts_name_the_tag_position() {
	let completer = ScriptedCompleter::ok(&["a", "b", "c"]);
	fill_placeholders(&completer, SOURCE, &job("be brief", None), &mut NoProgress).await.unwrap();

	let offsets = splice::scan_occurrences(SOURCE, DEFAULT_PLACEHOLDER);
	let prompts = completer.user_prompts();
	assert_eq!(prompts.len(), 3);
	for (prompt, offset) in prompts.iter().zip(&offsets) {
		assert_eq!(
			prompt,
			&format!("provide only insightful comment to replace the <comment here> tag at index {}. be brief", offset)
		);
	}
	let seen = completer.seen.borrow();
	assert_eq!(seen[0].messages[0].content.as_deref(), Some(format!("work on this code:\n{}", SOURCE).as_str()));
}

#[tokio::test]
async fn long_files_send_a_window() {
	let filler = "x".repeat(1000);
	let source = format!("{}<comment here>{}", filler, filler);
	let completer = ScriptedCompleter::ok(&["// here"]);
	let mut small = job("", None);
	small.max_snippet = 100;

	let outcome = fill_placeholders(&completer, &source, &small, &mut NoProgress).await.unwrap();

	assert_eq!(outcome.document, format!("{}// here{}", filler, filler));
	let seen = completer.seen.borrow();
	let system = seen[0].messages[0].content.as_deref().unwrap();
	let snippet = system.strip_prefix("work on this code:\n").unwrap();
	assert_eq!(snippet.len(), 100);
	assert!(completer.user_prompts()[0].contains("tag at index 50."));
	assert_eq!(&snippet[50..64], DEFAULT_PLACEHOLDER);
}

#[tokio::test]
async fn failed_generation_leaves_its_tag() {
	let completer = ScriptedCompleter::new(vec![
		Ok("// one".to_string()),
		Err(ApiError::StreamFailed("overloaded".to_string())),
		Ok("// three".to_string()),
	]);

	let outcome = fill_placeholders(&completer, SOURCE, &job("", None), &mut NoProgress).await.unwrap();

	assert_eq!(outcome.applied, 2);
	assert_eq!(outcome.failed, 1);
	assert_eq!(splice::scan_occurrences(&outcome.document, DEFAULT_PLACEHOLDER).len(), 1);
	assert!(outcome.document.starts_with("// one\nfn add"));
	assert!(outcome.document.contains("\n<comment here>\nfn sub"));
	assert!(outcome.document.contains("\t// three\n"));
}

#[tokio::test]
async fn budget_caps_successful_updates() {
	let completer = ScriptedCompleter::new(vec![
		Err(ApiError::Malformed("boom".to_string())),
		Ok("// two".to_string()),
		Ok("// three".to_string()),
	]);

	let outcome = fill_placeholders(&completer, SOURCE, &job("", Some(1)), &mut NoProgress).await.unwrap();

	assert_eq!(outcome.applied, 1);
	assert_eq!(outcome.failed, 1);
	assert_eq!(completer.seen.borrow().len(), 2);
	assert!(outcome.document.contains("// two\nfn sub"));
	assert_eq!(splice::scan_occurrences(&outcome.document, DEFAULT_PLACEHOLDER).len(), 2);

	let untouched = fill_placeholders(&ScriptedCompleter::ok(&[]), SOURCE, &job("", Some(0)), &mut NoProgress).await.unwrap();
	assert_eq!(untouched.document, SOURCE);
	assert_eq!(untouched.applied, 0);
}

#[tokio::test]
async fn legacy_update_counter_is_an_offset() {
	let mut every = job("", None);
	every.budget = UpdateBudget { cap: None, offset: 0 };
	let completer = ScriptedCompleter::ok(&["// a", "// b", "// c"]);
	let outcome = fill_placeholders(&completer, SOURCE, &every, &mut NoProgress).await.unwrap();
	assert_eq!(outcome.applied, 3);
	assert!(!outcome.document.contains(DEFAULT_PLACEHOLDER));

	let mut all_but_last = job("", None);
	all_but_last.budget = UpdateBudget { cap: None, offset: -1 };
	let completer = ScriptedCompleter::ok(&["// a", "// b", "// c"]);
	let outcome = fill_placeholders(&completer, SOURCE, &all_but_last, &mut NoProgress).await.unwrap();
	assert_eq!(outcome.applied, 2);
	assert_eq!(completer.seen.borrow().len(), 2);
	assert!(outcome.document.contains("\t<comment here>\n"));
}

#[tokio::test]
async fn no_tags_no_requests() {
	let completer = ScriptedCompleter::ok(&[]);
	let outcome = fill_placeholders(&completer, "fn main() {}\n", &job("", None), &mut NoProgress).await.unwrap();
	assert_eq!(outcome, Outcome { document: "fn main() {}\n".to_string(), found: 0, applied: 0, failed: 0 });
	assert!(completer.seen.borrow().is_empty());
}

#[tokio::test]
async fn improve_rewrites_each_chunk() {
	let source = "// add\nfn add() {}\n// sub\nfn sub() {}\n";
	let completer = ScriptedCompleter::new(vec![
		Ok("```rust\n/// Adds.\nfn add() {}\n```".to_string()),
		Err(ApiError::Malformed("nope".to_string())),
	]);
	let mut chunked = job("use doc comments", None);
	chunked.chunk_size = 19;

	let outcome = improve_chunks(&completer, source, &chunked, &mut NoProgress).await;

	assert_eq!(outcome.found, 2);
	assert_eq!(outcome.applied, 1);
	assert_eq!(outcome.failed, 1);
	assert_eq!(outcome.document, "/// Adds.\nfn add() {}\n// sub\nfn sub() {}\n");
	let prompts = completer.user_prompts();
	assert!(prompts[0].ends_with("use doc comments"));
	let seen = completer.seen.borrow();
	assert_eq!(seen[1].messages[0].content.as_deref(), Some("work on this code:\n// sub\nfn sub() {}\n"));
}

#[tokio::test]
async fn improve_keeps_line_breaks_between_chunks() {
	let source = "// a\nfn a() {}\n// b\nfn b() {}\n";
	let completer = ScriptedCompleter::ok(&["/// A.\nfn a() {}", "/// B.\nfn b() {}"]);
	let mut chunked = job("", None);
	chunked.chunk_size = 15;

	let outcome = improve_chunks(&completer, source, &chunked, &mut NoProgress).await;

	assert_eq!(outcome.applied, 2);
	assert_eq!(outcome.document, "/// A.\nfn a() {}\n/// B.\nfn b() {}\n");
}

#[tokio::test]
async fn improve_cuts_chunks_on_lines() {
	let source = "fn a() {}\nfn b() {}\n";
	let completer = ScriptedCompleter::ok(&["fn a() {} // a", "fn b() {} // b\n\n"]);
	let mut chunked = job("", None);
	chunked.chunk_size = 15;

	let outcome = improve_chunks(&completer, source, &chunked, &mut NoProgress).await;

	let seen = completer.seen.borrow();
	assert_eq!(seen[0].messages[0].content.as_deref(), Some("work on this code:\nfn a() {}\n"));
	assert_eq!(outcome.document, "fn a() {} // a\nfn b() {} // b\n");
}

#[tokio::test]
async fn improve_respects_budget() {
	let source = "aaaa";
	let completer = ScriptedCompleter::ok(&["AA", "BB"]);
	let mut chunked = job("", Some(1));
	chunked.chunk_size = 2;

	let outcome = improve_chunks(&completer, source, &chunked, &mut NoProgress).await;

	assert_eq!(outcome.document, "AAaa");
	assert_eq!(completer.seen.borrow().len(), 1);
}

#[tokio::test]
async fn file_is_rewritten_in_place() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("math.rs");
	fs::write(&path, SOURCE).unwrap();
	let completer = ScriptedCompleter::ok(&["// a", "// bb", "// ccc"]);

	let outcome = process_file(&completer, &path, Action::Add, &job("", None), false, &mut NoProgress).await.unwrap();

	let written = fs::read_to_string(&path).unwrap();
	assert_eq!(written, outcome.document);
	assert!(!written.contains(DEFAULT_PLACEHOLDER));
	let expected = SOURCE.replacen(DEFAULT_PLACEHOLDER, "// a", 1).replacen(DEFAULT_PLACEHOLDER, "// bb", 1).replacen(DEFAULT_PLACEHOLDER, "// ccc", 1);
	assert_eq!(written, expected);
}

#[tokio::test]
async fn dry_run_leaves_file_alone() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("math.rs");
	fs::write(&path, SOURCE).unwrap();
	let completer = ScriptedCompleter::ok(&["// a", "// b", "// c"]);

	let outcome = process_file(&completer, &path, Action::Add, &job("", None), true, &mut NoProgress).await.unwrap();

	assert_eq!(fs::read_to_string(&path).unwrap(), SOURCE);
	assert!(!outcome.document.contains(DEFAULT_PLACEHOLDER));
}

#[tokio::test]
async fn missing_file_is_a_per_file_error() {
	let dir = tempfile::tempdir().unwrap();
	let completer = ScriptedCompleter::ok(&[]);
	let result = process_file(&completer, &dir.path().join("absent.rs"), Action::Add, &job("", None), false, &mut NoProgress).await;
	assert!(matches!(result, Err(annotate::ProcessError::Helper(_))));
}

#[test]
fn actions_parse() {
	assert_eq!(Action::parse("add"), Some(Action::Add));
	assert_eq!(Action::parse("improve\n"), Some(Action::Improve));
	assert_eq!(Action::parse("delete"), None);
	assert_eq!(Action::parse(""), None);
}

#[test]
fn cli_accepts_files_and_flags() {
	let cli = Cli::try_parse_from(["commentfill", "--action", "add", "--max-updates", "2", "--quiet", "a.rs", "b.rs"]).unwrap();
	assert_eq!(cli.files, vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]);
	assert_eq!(cli.action.as_deref(), Some("add"));
	assert_eq!(cli.max_updates, Some(2));
	assert!(cli.quiet);
	assert!(Cli::try_parse_from(["commentfill"]).is_err());
}

fn offline_config() -> Config {
	Config::from_lookup(|name| (name == "CHATGPT_API_KEY").then(|| "sk-test".to_string())).unwrap()
}

#[tokio::test]
async fn unknown_action_flag_fails_the_run() {
	let args = Cli::try_parse_from(["commentfill", "--action", "delete", "a.rs"]).unwrap();
	let mut input = Cursor::new(Vec::new());
	let mut output = Vec::new();

	let status = run_with(args, offline_config(), &mut input, &mut output).await.unwrap();

	assert_eq!(status, RunStatus::InvalidAction);
	assert!(output.is_empty());
}

#[tokio::test]
async fn unknown_interactive_action_stops_before_instructions() {
	let args = Cli::try_parse_from(["commentfill", "a.rs"]).unwrap();
	let mut input = Cursor::new(b"delete\nbe brief\n".to_vec());
	let mut output = Vec::new();

	let status = run_with(args, offline_config(), &mut input, &mut output).await.unwrap();

	assert_eq!(status, RunStatus::InvalidAction);
	let printed = String::from_utf8(output).unwrap();
	assert_eq!(printed, format!("{}delete\n", ACTION_QUESTION));
	assert!(!printed.contains(INSTRUCTIONS_QUESTION));
}

#[tokio::test]
async fn missing_files_are_counted_as_failures() {
	let dir = tempfile::tempdir().unwrap();
	let absent = dir.path().join("absent.rs");
	let args = Cli::try_parse_from(["commentfill", "--action", "add", "--instructions", "be brief", "--quiet", absent.to_str().unwrap()]).unwrap();
	let mut output = Vec::new();

	let status = run_with(args, offline_config(), &mut Cursor::new(Vec::new()), &mut output).await.unwrap();

	assert_eq!(status, RunStatus::Completed { failures: 1 });
	let printed = String::from_utf8(output).unwrap();
	assert!(printed.starts_with("Considering "));
	assert!(!printed.contains("DONE"));
}

#[test]
fn run_status_exit_codes() {
	assert_eq!(format!("{:?}", RunStatus::Completed { failures: 0 }.exit_code()), format!("{:?}", ExitCode::SUCCESS));
	assert_eq!(format!("{:?}", RunStatus::Completed { failures: 2 }.exit_code()), format!("{:?}", ExitCode::FAILURE));
	assert_eq!(format!("{:?}", RunStatus::InvalidAction.exit_code()), format!("{:?}", ExitCode::FAILURE));
}
