//! Gemini `generateContent` client
//!
//! Calls the Generative Language REST API (v1) directly with reqwest. The
//! model is resolved once per client: a short list of known models is
//! tried first, then the account's model list is consulted.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::CoreError;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Models tried in order before listing what the key can access
pub const PREFERRED_MODELS: &[&str] = &[
    "gemini-1.5-flash-latest",
    "gemini-1.5-flash-002",
    "gemini-1.5-flash",
    "gemini-1.0-pro",
];

/// Used when neither probing nor listing finds a model
pub const FALLBACK_MODEL: &str = "gemini-1.5-flash-latest";

const PROVIDER: &str = "Gemini";
const USER_AGENT: &str = concat!("meterwise/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

/// Client for the AI coach
pub struct CoachClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Resolved (or pinned) model name
    model: Mutex<Option<String>>,
}

impl CoachClient {
    /// Build a client; a missing or blank key is an error
    pub fn new(api_key: Option<String>) -> Result<Self, CoreError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(CoreError::MissingApiKey { provider: PROVIDER })?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| CoreError::Http {
                provider: PROVIDER,
                source,
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: Mutex::new(None),
        })
    }

    /// Client using `GEMINI_API_KEY` from the environment
    pub fn from_env() -> Result<Self, CoreError> {
        Self::new(std::env::var("GEMINI_API_KEY").ok())
    }

    /// Override the API root (proxy, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Skip model discovery and always use `model`
    pub fn with_model(self, model: impl Into<String>) -> Self {
        *self.model.lock() = Some(model.into());
        self
    }

    /// Send `prompt` to the resolved model and return its answer
    pub async fn ask(&self, prompt: &str) -> Result<String, CoreError> {
        let model = self.resolve_model().await?;
        tracing::info!(model = %model, prompt_chars = prompt.len(), "Asking coach");
        self.generate(&model, prompt).await
    }

    /// Model in use, resolving it on first call
    pub async fn resolve_model(&self) -> Result<String, CoreError> {
        let pinned = self.model.lock().clone();
        if let Some(model) = pinned {
            return Ok(model);
        }

        let model = self.discover_model().await?;
        *self.model.lock() = Some(model.clone());
        Ok(model)
    }

    async fn discover_model(&self) -> Result<String, CoreError> {
        for candidate in PREFERRED_MODELS {
            match self.generate(candidate, "ping").await {
                Ok(_) => {
                    tracing::debug!(model = candidate, "Preferred model available");
                    return Ok(candidate.to_string());
                }
                // Probing further would only hit the same limit
                Err(e @ CoreError::RateLimited { .. }) => return Err(e),
                Err(e) => tracing::debug!(model = candidate, error = %e, "Model attempt failed"),
            }
        }

        match self.list_models().await {
            Ok(models) => {
                if let Some(model) = choose_model(&models) {
                    return Ok(model.to_string());
                }
                tracing::warn!("No listed model supports generateContent, using fallback");
            }
            Err(e) => tracing::warn!(error = %e, "Model listing failed, using fallback"),
        }

        Ok(FALLBACK_MODEL.to_string())
    }

    /// One `generateContent` call
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String, CoreError> {
        let url = format!("{}/v1/models/{}:generateContent", self.base_url, model);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|source| CoreError::Http {
                provider: PROVIDER,
                source,
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| CoreError::Http {
            provider: PROVIDER,
            source,
        })?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        parse_generate_response(&text)
    }

    /// Names of the models that support `generateContent`
    pub async fn list_models(&self) -> Result<Vec<String>, CoreError> {
        let url = format!("{}/v1/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|source| CoreError::Http {
                provider: PROVIDER,
                source,
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| CoreError::Http {
            provider: PROVIDER,
            source,
        })?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &text));
        }

        parse_model_list(&text)
    }
}

/// Error for a non-success status, preferring the API's own message
fn status_error(status: u16, body: &str) -> CoreError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string));

    match message {
        Some(message) if status != 429 => CoreError::Provider {
            provider: PROVIDER,
            status,
            message,
        },
        _ => CoreError::from_status(PROVIDER, status, body),
    }
}

/// Joined text of the first candidate
pub fn parse_generate_response(body: &str) -> Result<String, CoreError> {
    let json: Value = serde_json::from_str(body).map_err(|e| CoreError::MalformedPayload {
        provider: PROVIDER,
        message: e.to_string(),
    })?;

    let text: String = json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(CoreError::EmptyResponse { provider: PROVIDER });
    }
    Ok(text.to_string())
}

/// Model names (without `models/`) that support `generateContent`
pub fn parse_model_list(body: &str) -> Result<Vec<String>, CoreError> {
    let json: Value = serde_json::from_str(body).map_err(|e| CoreError::MalformedPayload {
        provider: PROVIDER,
        message: e.to_string(),
    })?;

    let models = json["models"].as_array().cloned().unwrap_or_default();

    Ok(models
        .iter()
        .filter(|m| {
            let methods = m
                .get("supportedGenerationMethods")
                .or_else(|| m.get("generationMethods"))
                .and_then(Value::as_array);
            methods.is_some_and(|list| list.iter().any(|v| v == "generateContent"))
        })
        .filter_map(|m| m["name"].as_str())
        .map(|name| name.trim_start_matches("models/").to_string())
        .collect())
}

/// Prefer a "flash" model, then a "pro" model, then whatever is first
pub fn choose_model(models: &[String]) -> Option<&str> {
    let find = |needle: &str| {
        models
            .iter()
            .find(|m| m.to_ascii_lowercase().contains(needle))
    };

    find("flash")
        .or_else(|| find("pro"))
        .or_else(|| models.first())
        .map(String::as_str)
}
