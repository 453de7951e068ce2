use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_derive::{Deserialize, Serialize};
use std::io::{self, Write};
use thiserror::Error;
use tracing::debug;

use crate::config::{AuthStyle, Config};

pub mod sse;

use sse::{SseParser, StreamEvent};

#[derive(Debug, Error)]
pub enum ApiError {
	#[error("request error: {0}")]
	Request(#[from] reqwest::Error),
	#[error("HTTP {0} {1}")]
	Status(StatusCode, String),
	#[error("Serde error: {0}")]
	Serde(#[from] serde_json::Error),
	#[error("stream failed: {0}")]
	StreamFailed(String),
	#[error("malformed response: {0}")]
	Malformed(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
	pub role: String,
	pub content: Option<String>,
}

impl Message {
	pub fn system<S: Into<String>>(content: S) -> Self {
		Message { role: "system".to_string(), content: Some(content.into()) }
	}
	pub fn user<S: Into<String>>(content: S) -> Self {
		Message { role: "user".to_string(), content: Some(content.into()) }
	}
}

/// A chat completion request body. `model`, `max_tokens` and `stream` are
/// filled in by the client from its configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "snake_case")]
pub struct ChatRequest {
	#[serde(default)]
	pub model: String,
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default)]
	pub stream: bool,
}

impl ChatRequest {
	pub fn new(system: String, user: String) -> Self {
		ChatRequest { messages: vec![Message::system(system), Message::user(user)], ..Default::default() }
	}

	pub fn prompt_len(&self) -> usize {
		self.messages.iter().filter_map(|m| m.content.as_ref()).map(String::len).sum()
	}
}

/// Receives partial text while a completion streams in.
///
/// Only for display: the final text handed back by [`Completer::complete`]
/// is what gets written to files.
pub trait ProgressSink {
	fn on_delta(&mut self, delta: &str);
	fn on_finish(&mut self) {}
}

/// Echoes streamed text to stdout as it arrives.
pub struct StdoutEcho;

impl ProgressSink for StdoutEcho {
	fn on_delta(&mut self, delta: &str) {
		let mut stdout = io::stdout().lock();
		let _ = stdout.write_all(delta.as_bytes());
		let _ = stdout.flush();
	}

	fn on_finish(&mut self) {
		println!();
	}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
	fn on_delta(&mut self, _delta: &str) {}
}

/// Anything that can turn a chat request into the model's final reply.
#[allow(async_fn_in_trait)]
pub trait Completer {
	async fn complete(&self, request: &ChatRequest, sink: &mut dyn ProgressSink) -> Result<String, ApiError>;
}

pub struct ChatClient {
	http: reqwest::Client,
	post_url: url::Url,
	api_key: String,
	auth: AuthStyle,
	model: String,
	max_tokens: u32,
}

impl ChatClient {
	pub fn new(config: &Config) -> Result<Self, ApiError> {
		Ok(ChatClient {
			http: reqwest::Client::builder().build()?,
			post_url: config.endpoint.clone(),
			api_key: config.api_key.clone(),
			auth: config.auth,
			model: config.model.clone(),
			max_tokens: config.max_tokens,
		})
	}

	fn build_request(&self, request: &ChatRequest) -> reqwest::RequestBuilder {
		let mut payload = request.clone();
		payload.model = self.model.clone();
		payload.max_tokens = Some(payload.max_tokens.unwrap_or(self.max_tokens));
		payload.stream = true;

		let builder = self.http
			.post(self.post_url.clone())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "text/event-stream")
			.json(&payload);
		match self.auth {
			AuthStyle::ApiKeyHeader => builder.header("api-key", &self.api_key),
			AuthStyle::Bearer => builder.header(AUTHORIZATION, format!("Bearer {}", self.api_key)),
		}
	}

	/// Sends `request` and streams the reply through `sink`, returning the
	/// accumulated text.
	pub async fn call_api(&self, request: &ChatRequest, sink: &mut dyn ProgressSink) -> Result<String, ApiError> {
		debug!(model = %self.model, prompt_bytes = request.prompt_len(), "sending chat completion");
		let response = self.build_request(request).send().await?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(ApiError::Status(status, parse_error_message(status, &body)));
		}

		let is_event_stream = response
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(|value| value.starts_with("text/event-stream"))
			.unwrap_or(false);
		if !is_event_stream {
			// server ignored `stream: true`
			let body = response.text().await?;
			let content = reply_content(Self::parse_response(&body)?)?;
			sink.on_delta(&content);
			sink.on_finish();
			return Ok(content);
		}

		let mut bytes = response.bytes_stream();
		let mut parser = SseParser::default();
		let mut content = String::new();
		'stream: while let Some(chunk) = bytes.next().await {
			let chunk = chunk?;
			for event in parser.feed(&chunk) {
				match event {
					StreamEvent::Delta(delta) => {
						sink.on_delta(&delta);
						content.push_str(&delta);
					},
					StreamEvent::Failed(message) => return Err(ApiError::StreamFailed(message)),
					StreamEvent::Done => break 'stream,
				}
			}
		}
		sink.on_finish();
		debug!(reply_bytes = content.len(), "chat completion finished");
		if content.is_empty() {
			return Err(ApiError::Malformed("stream ended without any content".to_string()));
		}
		Ok(content)
	}

	pub fn parse_response(response: &str) -> Result<Message, ApiError> {
		let mut json: serde_json::Value = serde_json::from_str(response)?;
		let message = json
			.get_mut("choices").ok_or_else(|| ApiError::Malformed("No choices in the return object".to_string()))?
			.get_mut(0).ok_or_else(|| ApiError::Malformed("No element 0 in the choices object".to_string()))?
			.get_mut("message").ok_or_else(|| ApiError::Malformed("No message in the choices element 0".to_string()))?
			.take();
		Ok(serde_json::from_value(message)?)
	}
}

impl Completer for ChatClient {
	async fn complete(&self, request: &ChatRequest, sink: &mut dyn ProgressSink) -> Result<String, ApiError> {
		self.call_api(request, sink).await
	}
}

/// The text of an assistant reply. A refusal or tool-call reply carries no
/// content, which must not be mistaken for an empty comment.
pub fn reply_content(message: Message) -> Result<String, ApiError> {
	match message.content {
		Some(content) if !content.is_empty() => Ok(content),
		_ => Err(ApiError::Malformed(format!("{} reply has no content", message.role))),
	}
}

/// Pulls `error.message` out of an error body, falling back to the raw body
/// or the status reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
	let from_json = serde_json::from_str::<serde_json::Value>(body)
		.ok()
		.and_then(|value| value.get("error")?.get("message")?.as_str().map(str::to_string))
		.filter(|message| !message.is_empty());
	match from_json {
		Some(message) => message,
		None if !body.trim().is_empty() => body.trim().to_string(),
		None => status.canonical_reason().unwrap_or("request failed").to_string(),
	}
}
