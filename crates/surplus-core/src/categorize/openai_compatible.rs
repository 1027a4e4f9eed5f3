//! OpenAI-compatible categorizer
//!
//! Works with any server that implements the OpenAI chat completions API
//! (OpenAI itself, Docker Model Runner, vLLM, LocalAI, llama-server).
//!
//! # Configuration
//!
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default from settings: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)
//!
//! The prompt is embedded; `[categorizer] prompt_path` swaps in another file
//! using the same `{{categories}}` and `{{transactions}}` placeholders.

use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiFailure, Error, Result};
use crate::models::Transaction;
use crate::settings::{ApiToken, Settings};

use super::parsing::parse_categorization;
use super::Categorizer;

/// Embedded default prompt (compiled into binary)
const DEFAULT_PROMPT: &str = include_str!("../../../../prompts/categorize_transactions.md");

/// Render the prompt for one batch
pub fn render_prompt(
    template: &str,
    transactions: &[Transaction],
    categories: &[String],
) -> String {
    let category_list = categories
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");
    let transaction_list = transactions
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "{}. {} | {} | {}",
                i + 1,
                t.location,
                t.amount,
                t.timestamp.format("%Y-%m-%d")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    template
        .replace("{{categories}}", &category_list)
        .replace("{{transactions}}", &transaction_list)
}

/// OpenAI-compatible categorizer
#[derive(Clone)]
pub struct OpenAICompatibleCategorizer {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<ApiToken>,
    prompt: String,
}

impl OpenAICompatibleCategorizer {
    /// Create a new categorizer with the embedded prompt
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: ApiToken) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Use a prompt file instead of the embedded one
    pub fn with_prompt_file(mut self, path: &Path) -> Result<Self> {
        self.prompt = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read prompt {}: {}", path.display(), e))
        })?;
        Ok(self)
    }

    /// Create from settings
    ///
    /// Required: `[categorizer] host` or `OPENAI_COMPATIBLE_HOST`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let config = &settings.categorizer;
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| Error::Config("categorizer host is not set".into()))?;

        let mut categorizer = Self::new(host, &config.model);
        if let Some(ref key) = config.api_key {
            categorizer = categorizer.with_api_key(key.clone());
        }
        if let Some(ref path) = config.prompt_path {
            categorizer = categorizer.with_prompt_file(path)?;
        }
        Ok(categorizer)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: &str) -> Result<String> {
        let operation = "categorize";
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: Some(0.0),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key.expose());
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(operation)
            } else {
                Error::Http(e.without_url())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication,
                StatusCode::TOO_MANY_REQUESTS => Error::Api {
                    operation,
                    kind: ApiFailure::RateLimited,
                },
                s if s.is_server_error() => Error::Api {
                    operation,
                    kind: ApiFailure::Server,
                },
                _ => Error::Api {
                    operation,
                    kind: ApiFailure::Rejected,
                },
            });
        }

        let chat_response: ChatCompletionResponse =
            response.json().await.map_err(|_| Error::Api {
                operation,
                kind: ApiFailure::MalformedResponse,
            })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(Error::Api {
                operation,
                kind: ApiFailure::MalformedResponse,
            })
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl Categorizer for OpenAICompatibleCategorizer {
    async fn categorize(
        &self,
        transactions: &[Transaction],
        categories: &[String],
    ) -> Result<Vec<Option<String>>> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = render_prompt(&self.prompt, transactions, categories);
        let response = self.chat_completion(&prompt).await?;
        debug!(model = %self.model, "Categorization response: {}", response);

        Ok(parse_categorization(&response, transactions.len(), categories))
    }

    fn name(&self) -> &str {
        "openai_compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_prompt() {
        let ts = NaiveDate::from_ymd_opt(2026, 10, 14)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        let transactions = vec![
            Transaction::new("Whole Foods", dec!(84.12), ts, None),
            Transaction::new("Shell", dec!(41.30), ts, None),
        ];
        let categories = vec!["Groceries".to_string(), "Transport".to_string()];

        let prompt = render_prompt(DEFAULT_PROMPT, &transactions, &categories);
        assert!(prompt.contains("- Groceries\n- Transport"));
        assert!(prompt.contains("1. Whole Foods | 84.12 | 2026-10-14"));
        assert!(prompt.contains("2. Shell | 41.30 | 2026-10-14"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_from_settings_requires_host() {
        let settings = Settings::default();
        assert!(matches!(
            OpenAICompatibleCategorizer::from_settings(&settings),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_prompt_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.md");
        fs::write(&path, "Pick from {{categories}} for {{transactions}}").unwrap();

        let mut settings = Settings::default();
        settings.categorizer.host = Some("http://localhost:12434/".into());
        settings.categorizer.prompt_path = Some(path);
        let categorizer = OpenAICompatibleCategorizer::from_settings(&settings).unwrap();
        assert_eq!(categorizer.base_url, "http://localhost:12434");
        assert!(categorizer.prompt.starts_with("Pick from"));
    }
}
