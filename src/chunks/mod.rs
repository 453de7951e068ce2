/// Default size of one whole-file rewrite request, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Cuts `document` into consecutive pieces of at most `chunk_size` bytes.
///
/// A piece ends just after the last newline that fits; a line longer than
/// `chunk_size` is cut on a char boundary instead. Pieces always hold at
/// least one character, so a `chunk_size` smaller than a multibyte character
/// still makes progress. Concatenating the pieces gives back `document`.
pub fn split_chunks(document: &str, chunk_size: usize) -> Vec<&str> {
	let mut chunks = Vec::new();
	let mut rest = document;
	while !rest.is_empty() {
		let mut end = chunk_size.min(rest.len());
		while end > 0 && !rest.is_char_boundary(end) {
			end -= 1;
		}
		if end < rest.len() {
			if let Some(newline) = rest[..end].rfind('\n') {
				end = newline + 1;
			}
		}
		if end == 0 {
			end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
		}
		let (head, tail) = rest.split_at(end);
		chunks.push(head);
		rest = tail;
	}
	chunks
}

/// Removes a single markdown code fence wrapped around the whole reply.
///
/// Models asked for "just the code" still fence it often enough that the
/// fence would otherwise end up in the rewritten file.
pub fn strip_code_fence(reply: &str) -> &str {
	let trimmed = reply.trim();
	let Some(without_open) = trimmed.strip_prefix("```") else {
		return reply;
	};
	let Some(body) = without_open.strip_suffix("```") else {
		return reply;
	};
	// the opening fence line may carry a language tag
	match body.find('\n') {
		Some(newline) => body[newline + 1..].trim_end_matches([' ', '\t']),
		None => body,
	}
}

/// Puts the whitespace that surrounded `original` back around `rewritten`.
///
/// Models tend to drop a trailing newline; without this the next chunk would
/// be glued onto the last line of the rewrite.
pub fn restore_edges(original: &str, rewritten: &str) -> String {
	if original.trim().is_empty() {
		return original.to_string();
	}
	let leading = &original[..original.len() - original.trim_start().len()];
	let trailing = &original[original.trim_end().len()..];
	format!("{}{}{}", leading, rewritten.trim(), trailing)
}
