use std::env;
use thiserror::Error;
use url::Url;

use crate::chunks::DEFAULT_CHUNK_SIZE;
use crate::splice::{DEFAULT_PLACEHOLDER, MAX_SNIPPET_LEN};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("no API credentials found: set CHATGPT_API_KEY, OAICOMPAT_API_KEY and OAICOMPAT_API_BASE, or AZURE_API_KEY, AZURE_API_BASE and AZURE_API_VERSION")]
	MissingCredential,
	#[error("invalid endpoint {url}: {source}")]
	InvalidEndpoint { url: String, source: url::ParseError },
	#[error("{name} must be {expected}, got {value:?}")]
	InvalidNumber { name: &'static str, expected: &'static str, value: String },
	#[error("{0} must not be empty")]
	Empty(&'static str),
}

/// How the key is presented to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
	/// Azure deployments expect an `api-key` header.
	ApiKeyHeader,
	Bearer,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub endpoint: Url,
	pub api_key: String,
	pub auth: AuthStyle,
	pub model: String,
	pub max_tokens: u32,
	pub placeholder: String,
	/// Upper bound on successful generations per file; `None` means every tag.
	pub max_updates: Option<usize>,
	/// `CHATGPT_UPDATES`: added to the number of tags found in each file,
	/// so the usual `0` fills every tag.
	pub update_offset: i64,
	pub max_snippet: usize,
	pub chunk_size: usize,
}

impl Config {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Resolves the configuration through `lookup` instead of the process
	/// environment. Azure settings win over OpenAI-compatible ones, which win
	/// over a plain `CHATGPT_API_KEY`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError> where F: Fn(&str) -> Option<String> {
		let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

		let (api_url, api_key, auth) = if let (Some(key), Some(base), Some(ver)) = (get("AZURE_API_KEY"), get("AZURE_API_BASE"), get("AZURE_API_VERSION")) {
			(format!("{}chat/completions?api-version={}", base, ver), key, AuthStyle::ApiKeyHeader)
		} else if let (Some(key), Some(base)) = (get("OAICOMPAT_API_KEY"), get("OAICOMPAT_API_BASE")) {
			(format!("{}/chat/completions", base.trim_end_matches('/')), key, AuthStyle::Bearer)
		} else if let Some(key) = get("CHATGPT_API_KEY") {
			(format!("{}/chat/completions", OPENAI_API_BASE), key, AuthStyle::Bearer)
		} else {
			return Err(ConfigError::MissingCredential);
		};

		let endpoint = Url::parse(&api_url).map_err(|source| ConfigError::InvalidEndpoint { url: api_url.clone(), source })?;

		let model = get("OAICOMPAT_MODEL_NAME")
			.or_else(|| get("CHATGPT_MODEL"))
			.unwrap_or_else(|| DEFAULT_MODEL.to_string());

		let update_offset = match get("CHATGPT_UPDATES") {
			Some(value) => parse_offset("CHATGPT_UPDATES", &value)?,
			None => 0,
		};
		let max_updates = match get("COMMENTFILL_MAX_UPDATES") {
			Some(value) => Some(parse_count("COMMENTFILL_MAX_UPDATES", &value)?),
			None => None,
		};

		Ok(Config {
			endpoint,
			api_key,
			auth,
			model,
			max_tokens: DEFAULT_MAX_TOKENS,
			placeholder: DEFAULT_PLACEHOLDER.to_string(),
			max_updates,
			update_offset,
			max_snippet: MAX_SNIPPET_LEN,
			chunk_size: DEFAULT_CHUNK_SIZE,
		})
	}

	pub fn set_model_name(&mut self, model: &str) {
		self.model = model.to_string();
	}

	pub fn set_placeholder(&mut self, placeholder: &str) -> Result<(), ConfigError> {
		if placeholder.is_empty() {
			return Err(ConfigError::Empty("placeholder"));
		}
		self.placeholder = placeholder.to_string();
		Ok(())
	}
}

pub fn parse_count(name: &'static str, value: &str) -> Result<usize, ConfigError> {
	value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidNumber { name, expected: "a non-negative integer", value: value.to_string() })
}

pub fn parse_offset(name: &'static str, value: &str) -> Result<i64, ConfigError> {
	value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidNumber { name, expected: "an integer", value: value.to_string() })
}
