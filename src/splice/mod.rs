use thiserror::Error;

/// The tag left in source files where a comment should be generated.
pub const DEFAULT_PLACEHOLDER: &str = "<comment here>";

/// Model context (7192 tokens) times three, in bytes.
pub const MAX_SNIPPET_LEN: usize = 7192 * 3;

/// One resolved replacement for one placeholder occurrence.
///
/// `offset` is a byte offset into the document as it was when the
/// placeholders were scanned, never into a partially rewritten copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
	pub offset: usize,
	pub replacement: String,
}

impl PendingUpdate {
	pub fn new<S: Into<String>>(offset: usize, replacement: S) -> Self {
		PendingUpdate { offset, replacement: replacement.into() }
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpliceError {
	#[error("update at offset {offset} is not after the previous placeholder ending at {previous_end}")]
	Unordered { offset: usize, previous_end: usize },
	#[error("placeholder {placeholder:?} not found at offset {offset} (adjusted position {adjusted})")]
	PlaceholderMismatch { offset: usize, adjusted: usize, placeholder: String },
}

/// Byte offsets of every non-overlapping `placeholder` in `document`, ascending.
pub fn scan_occurrences(document: &str, placeholder: &str) -> Vec<usize> {
	let mut offsets = Vec::new();
	if placeholder.is_empty() {
		return offsets;
	}
	let mut from = 0;
	while let Some(found) = document[from..].find(placeholder) {
		let index = from + found;
		offsets.push(index);
		from = index + placeholder.len();
	}
	offsets
}

/// Returns a window of at most `max_len` bytes around `center` and `center`
/// remapped into the window.
///
/// The window is shifted rather than shrunk when it would run off either end
/// of the document, so only documents shorter than `max_len` (or windows
/// trimmed to a char boundary) come back shorter.
pub fn extract_snippet(document: &str, center: usize, max_len: usize) -> (&str, usize) {
	if document.len() <= max_len {
		return (document, center);
	}

	let half = max_len / 2;
	let mut start = center.saturating_sub(half);
	let mut end = start + max_len;
	if end > document.len() {
		end = document.len();
		start = end.saturating_sub(max_len);
	}

	let start = ceil_char_boundary(document, start);
	let end = floor_char_boundary(document, end).max(start);
	(&document[start..end], center.saturating_sub(start))
}

/// Replaces the placeholder at each update's offset, left to right.
///
/// Every earlier replacement shifts the text after it by
/// `replacement.len() - placeholder.len()`; that running delta is added to
/// each later offset before splicing.
pub fn apply_splices(document: &str, updates: &[PendingUpdate], placeholder: &str) -> Result<String, SpliceError> {
	let mut result = document.to_string();
	let mut cumulative: isize = 0;
	let mut previous_end: Option<usize> = None;

	for update in updates {
		if let Some(previous_end) = previous_end {
			if update.offset < previous_end {
				return Err(SpliceError::Unordered { offset: update.offset, previous_end });
			}
		}

		let adjusted = update.offset.checked_add_signed(cumulative);
		let adjusted = match adjusted {
			Some(pos) if result.get(pos..pos + placeholder.len()) == Some(placeholder) => pos,
			_ => {
				return Err(SpliceError::PlaceholderMismatch {
					offset: update.offset,
					adjusted: adjusted.unwrap_or(0),
					placeholder: placeholder.to_string(),
				});
			}
		};

		result.replace_range(adjusted..adjusted + placeholder.len(), &update.replacement);
		cumulative += update.replacement.len() as isize - placeholder.len() as isize;
		previous_end = Some(update.offset + placeholder.len());
	}

	Ok(result)
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
	while index < s.len() && !s.is_char_boundary(index) {
		index += 1;
	}
	index
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
	while index > 0 && !s.is_char_boundary(index) {
		index -= 1;
	}
	index
}
