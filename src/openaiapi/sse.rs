use serde_json::Value;
use tracing::warn;

/// What a chat-completions stream frame means to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
	Delta(String),
	Failed(String),
	Done,
}

/// Incremental parser for `text/event-stream` chat completion bodies.
///
/// Bytes are buffered undecoded until a whole frame has arrived, so a
/// multibyte character split across two network reads is decoded intact.
#[derive(Debug, Default)]
pub struct SseParser {
	buffer: Vec<u8>,
}

impl SseParser {
	/// Feed arbitrary bytes into the parser and drain complete events.
	pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
		// some proxies re-frame with CRLF; JSON payloads never carry a raw CR
		self.buffer.extend(bytes.iter().copied().filter(|&b| b != b'\r'));
		let mut events = Vec::new();

		while let Some(split) = find_frame_end(&self.buffer) {
			let frame: Vec<u8> = self.buffer.drain(0..split + 2).take(split).collect();
			let Ok(frame) = String::from_utf8(frame) else {
				warn!("dropping stream frame that is not valid UTF-8");
				continue;
			};

			let Some(payload) = extract_data_payload(&frame) else {
				continue;
			};
			if payload == "[DONE]" {
				events.push(StreamEvent::Done);
				continue;
			}
			if let Ok(value) = serde_json::from_str::<Value>(&payload) {
				if let Some(event) = map_event(&value) {
					events.push(event);
				}
			}
		}

		events
	}

	#[cfg(test)]
	pub fn is_empty_buffer(&self) -> bool {
		self.buffer.iter().all(u8::is_ascii_whitespace)
	}
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
	buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn extract_data_payload(frame: &str) -> Option<String> {
	let data_lines: Vec<&str> = frame
		.lines()
		.filter_map(|line| line.strip_prefix("data:"))
		.map(|value| value.trim())
		.filter(|value| !value.is_empty())
		.collect();

	if data_lines.is_empty() {
		None
	} else {
		Some(data_lines.join("\n"))
	}
}

fn map_event(value: &Value) -> Option<StreamEvent> {
	if let Some(error) = value.get("error") {
		let message = error
			.get("message")
			.and_then(Value::as_str)
			.unwrap_or("unknown stream error");
		return Some(StreamEvent::Failed(message.to_string()));
	}

	let delta = value
		.get("choices")?
		.get(0)?
		.get("delta")?
		.get("content")?
		.as_str()?;
	if delta.is_empty() {
		None
	} else {
		Some(StreamEvent::Delta(delta.to_string()))
	}
}
