use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunks::{restore_edges, split_chunks, strip_code_fence};
use crate::helpers::{self, HelperError};
use crate::openaiapi::{ChatRequest, Completer, ProgressSink};
use crate::splice::{apply_splices, extract_snippet, scan_occurrences, PendingUpdate, SpliceError};

#[derive(Debug, Error)]
pub enum ProcessError {
	#[error("{0}")]
	Helper(#[from] HelperError),
	#[error("{0}")]
	Splice(#[from] SpliceError),
}

/// What one run does to each file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	/// Replace each placeholder with a comment generated for its position.
	Add,
	/// Rewrite the whole file chunk by chunk, improving existing comments.
	Improve,
}

impl Action {
	pub fn parse(answer: &str) -> Option<Self> {
		match answer.trim() {
			"add" => Some(Action::Add),
			"improve" => Some(Action::Improve),
			_ => None,
		}
	}
}

/// How many successful generations one file may receive.
///
/// `offset` is added to the number of tags (or chunks) found, so `0` allows
/// all of them and `-1` leaves the last one alone. `cap` then bounds the
/// result from above.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateBudget {
	pub cap: Option<usize>,
	pub offset: i64,
}

impl UpdateBudget {
	pub fn for_occurrences(&self, found: usize) -> usize {
		let allowed = i64::try_from(found).unwrap_or(i64::MAX).saturating_add(self.offset).max(0);
		let allowed = usize::try_from(allowed).unwrap_or(usize::MAX);
		self.cap.map_or(allowed, |cap| cap.min(allowed))
	}
}

/// Per-file knobs shared by both actions.
#[derive(Debug, Clone)]
pub struct Job<'a> {
	pub instructions: &'a str,
	pub placeholder: &'a str,
	pub budget: UpdateBudget,
	pub max_snippet: usize,
	pub chunk_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
	pub document: String,
	pub found: usize,
	pub applied: usize,
	pub failed: usize,
}

pub fn comment_request(snippet: &str, position: usize, placeholder: &str, instructions: &str) -> ChatRequest {
	ChatRequest::new(
		format!("work on this code:\n{}", snippet),
		format!("provide only insightful comment to replace the {} tag at index {}. {}", placeholder, position, instructions),
	)
}

pub fn improve_request(chunk: &str, instructions: &str) -> ChatRequest {
	ChatRequest::new(
		format!("work on this code:\n{}", chunk),
		format!(
			"improve the existing comments in this code. Reply with the code only, unchanged apart from the comments, without markdown fences or explanations. {}",
			instructions
		),
	)
}

/// Asks `completer` for one replacement per placeholder and splices them in.
///
/// Requests go out one at a time in document order. A failed request leaves
/// its placeholder in place; the budget only counts successes.
pub async fn fill_placeholders<C: Completer>(completer: &C, document: &str, job: &Job<'_>, sink: &mut dyn ProgressSink) -> Result<Outcome, SpliceError> {
	let offsets = scan_occurrences(document, job.placeholder);
	let mut remaining = job.budget.for_occurrences(offsets.len());
	let mut updates: Vec<PendingUpdate> = Vec::with_capacity(offsets.len());
	let mut failed = 0;

	for &offset in &offsets {
		if remaining == 0 {
			debug!(offset, "update budget spent, leaving placeholder");
			break;
		}
		let (snippet, position) = extract_snippet(document, offset, job.max_snippet);
		let request = comment_request(snippet, position, job.placeholder, job.instructions);
		match completer.complete(&request, sink).await {
			Ok(replacement) => {
				updates.push(PendingUpdate::new(offset, replacement));
				remaining -= 1;
			},
			Err(err) => {
				warn!(offset, error = %err, "generation failed, leaving placeholder");
				failed += 1;
			},
		}
	}

	let document = apply_splices(document, &updates, job.placeholder)?;
	Ok(Outcome { document, found: offsets.len(), applied: updates.len(), failed })
}

/// Has `completer` rewrite the document one chunk at a time.
///
/// A failed or empty reply keeps that chunk as it was. A rewrite keeps the
/// chunk's own leading and trailing whitespace so neighbouring chunks are
/// not glued together.
pub async fn improve_chunks<C: Completer>(completer: &C, document: &str, job: &Job<'_>, sink: &mut dyn ProgressSink) -> Outcome {
	let chunks = split_chunks(document, job.chunk_size);
	let mut remaining = job.budget.for_occurrences(chunks.len());
	let mut rewritten = String::with_capacity(document.len());
	let mut applied = 0;
	let mut failed = 0;

	for (index, chunk) in chunks.iter().enumerate() {
		if remaining == 0 {
			rewritten.push_str(chunk);
			continue;
		}
		let request = improve_request(chunk, job.instructions);
		match completer.complete(&request, sink).await {
			Ok(reply) if !reply.trim().is_empty() => {
				rewritten.push_str(&restore_edges(chunk, strip_code_fence(&reply)));
				applied += 1;
				remaining -= 1;
			},
			Ok(_) => {
				warn!(chunk = index, "empty rewrite, keeping chunk");
				rewritten.push_str(chunk);
				failed += 1;
			},
			Err(err) => {
				warn!(chunk = index, error = %err, "rewrite failed, keeping chunk");
				rewritten.push_str(chunk);
				failed += 1;
			},
		}
	}

	Outcome { document: rewritten, found: chunks.len(), applied, failed }
}

/// Reads `path`, runs `action` over it and writes the result back unless
/// `dry_run` is set, in which case the result is returned untouched on disk.
pub async fn process_file<C: Completer>(
	completer: &C,
	path: &Path,
	action: Action,
	job: &Job<'_>,
	dry_run: bool,
	sink: &mut dyn ProgressSink,
) -> Result<Outcome, ProcessError> {
	let source = helpers::read_document(path)?;
	let outcome = match action {
		Action::Add => fill_placeholders(completer, &source, job, sink).await?,
		Action::Improve => improve_chunks(completer, &source, job, sink).await,
	};
	info!(
		path = %path.display(),
		found = outcome.found,
		applied = outcome.applied,
		failed = outcome.failed,
		"file processed"
	);
	if !dry_run {
		helpers::write_document(path, &outcome.document)?;
	}
	Ok(outcome)
}
