use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::string;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelperError {
	#[error("IO error: {0}")]
	Io(#[from] io::Error),
	#[error("FromUtf8 error: {0}")]
	FromUtf8Error(#[from] string::FromUtf8Error),
	#[error("Other Error {0}")]
	FromString(String),
}

impl HelperError {
	pub fn msg<M: Into<String>>(msg: M) -> Self {
		HelperError::FromString(msg.into())
	}
}

/// Prints `question` without a newline and reads one answer line from `input`.
///
/// The trailing line ending is removed; nothing else is trimmed so free-text
/// instructions keep their spacing.
pub fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<String, HelperError> {
	write!(output, "{}", question)?;
	output.flush()?;
	let mut answer = String::new();
	if input.read_line(&mut answer)? == 0 {
		return Err(HelperError::msg(format!("no answer to {:?}: input closed", question.trim())));
	}
	let trimmed_len = answer.trim_end_matches(['\n', '\r']).len();
	answer.truncate(trimmed_len);
	Ok(answer)
}

pub fn read_document(path: impl AsRef<Path>) -> Result<String, HelperError> {
	let bytes = fs::read(path.as_ref())?;
	Ok(String::from_utf8(bytes)?)
}

pub fn write_document(path: impl AsRef<Path>, content: &str) -> Result<(), HelperError> {
	fs::write(path.as_ref(), content)?;
	Ok(())
}
