//! OCR.space client
//!
//! Posts a base64-encoded image as an urlencoded form and returns the
//! recognised text of the first result.

use base64::Engine as _;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::error::CoreError;

pub const OCR_SPACE_URL: &str = "https://api.ocr.space/parse/image";

/// Public demo key accepted by OCR.space (heavily rate limited)
pub const DEMO_API_KEY: &str = "helloworld";

const PROVIDER: &str = "OCR.space";
const USER_AGENT: &str = concat!("meterwise/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the OCR.space `parse/image` endpoint
pub struct OcrClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl OcrClient {
    /// Build a client; a missing or blank key falls back to the demo key
    pub fn new(api_key: Option<String>) -> Result<Self, CoreError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| {
                tracing::debug!("No OCR.space key configured, using demo key");
                DEMO_API_KEY.to_string()
            });

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
            endpoint: OCR_SPACE_URL.to_string(),
        })
    }

    /// Client using `OCR_SPACE_API_KEY` from the environment
    pub fn from_env() -> Result<Self, CoreError> {
        Self::new(std::env::var("OCR_SPACE_API_KEY").ok())
    }

    /// Override the endpoint (self-hosted proxy, tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn uses_demo_key(&self) -> bool {
        self.api_key == DEMO_API_KEY
    }

    /// Recognise the text of an image file
    pub async fn recognize_file(&self, path: &Path) -> Result<String, CoreError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CoreError::FileRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        self.recognize_bytes(&bytes, mime_for_path(path)).await
    }

    /// Recognise the text of raw image bytes
    pub async fn recognize_bytes(&self, image: &[u8], mime: &str) -> Result<String, CoreError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:{};base64,{}", mime, encoded);

        let form = [
            ("apikey", self.api_key.as_str()),
            ("base64Image", data_url.as_str()),
            ("language", "eng"),
            ("isOverlayRequired", "false"),
            ("scale", "true"),
            ("detectOrientation", "true"),
            ("OCREngine", "2"),
        ];

        tracing::info!(bytes = image.len(), endpoint = %self.endpoint, "Sending image to OCR.space");

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|source| CoreError::Http {
                provider: PROVIDER,
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| CoreError::Http {
            provider: PROVIDER,
            source,
        })?;

        if !status.is_success() {
            return Err(CoreError::from_status(PROVIDER, status.as_u16(), &body));
        }

        let text = parse_ocr_response(&body)?;
        tracing::debug!(chars = text.len(), "OCR text received");
        Ok(text)
    }
}

/// Extract `ParsedResults[0].ParsedText` from an OCR.space response body
pub fn parse_ocr_response(body: &str) -> Result<String, CoreError> {
    let json: Value = serde_json::from_str(body).map_err(|e| CoreError::MalformedPayload {
        provider: PROVIDER,
        message: e.to_string(),
    })?;

    if json["IsErroredOnProcessing"].as_bool().unwrap_or(false) {
        let message = error_message(&json["ErrorMessage"])
            .or_else(|| error_message(&json["ErrorDetails"]))
            .unwrap_or_else(|| "OCR provider error".to_string());
        return Err(CoreError::Provider {
            provider: PROVIDER,
            status: 502,
            message,
        });
    }

    let text = json["ParsedResults"][0]["ParsedText"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();

    if text.is_empty() {
        return Err(CoreError::EmptyResponse { provider: PROVIDER });
    }
    Ok(text.to_string())
}

/// `ErrorMessage` is either a string or an array of strings
fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("pdf") => "application/pdf",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let body = r#"{"ParsedResults":[{"ParsedText":"  004512\r\n"}],"IsErroredOnProcessing":false}"#;
        assert_eq!(parse_ocr_response(body).unwrap(), "004512");
    }

    #[test]
    fn test_parse_provider_error() {
        let body = r#"{"IsErroredOnProcessing":true,"ErrorMessage":["Unable to recognize the file type","E216"]}"#;
        let err = parse_ocr_response(body).unwrap_err();
        assert_eq!(err.kind(), "PROVIDER_ERROR");
        assert!(err.to_string().contains("Unable to recognize the file type; E216"));
    }

    #[test]
    fn test_parse_empty_text() {
        let body = r#"{"ParsedResults":[{"ParsedText":""}],"IsErroredOnProcessing":false}"#;
        assert_eq!(parse_ocr_response(body).unwrap_err().kind(), "EMPTY_RESPONSE");
        assert_eq!(parse_ocr_response("{}").unwrap_err().kind(), "EMPTY_RESPONSE");
    }

    #[test]
    fn test_parse_not_json() {
        let err = parse_ocr_response("<html>502 Bad Gateway</html>").unwrap_err();
        assert_eq!(err.kind(), "MALFORMED_PAYLOAD");
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("meter.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("meter.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("meter")), "image/jpeg");
    }

    #[test]
    fn test_blank_key_uses_demo() {
        let client = OcrClient::new(Some("   ".to_string())).unwrap();
        assert!(client.uses_demo_key());
        let client = OcrClient::new(Some("K123".to_string())).unwrap();
        assert!(!client.uses_demo_key());
    }
}
