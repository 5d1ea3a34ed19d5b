//! Translation engine abstraction and its HTTP client.

use crate::retry::{with_retry_if, RetryConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A single installed model: translates `from` into `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub from: String,
    pub to: String,
}

impl LanguagePair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub language: String,
    pub confidence: f64,
}

/// The engine that actually runs models.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String>;

    async fn detect_language(&self, text: &str) -> Result<Detection>;

    /// Installed pairs, in the engine's order.
    async fn supported_pairs(&self) -> Result<Vec<LanguagePair>>;
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EngineLanguage {
    code: String,
    #[serde(default)]
    targets: Vec<String>,
}

struct CachedPairs {
    fetched_at: Instant,
    pairs: Vec<LanguagePair>,
}

/// Client for a LibreTranslate-compatible engine.
pub struct HttpTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    load_only: Option<Vec<String>>,
    pairs_ttl: Duration,
    retry: RetryConfig,
    cached_pairs: Mutex<Option<CachedPairs>>,
}

impl HttpTranslator {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            load_only: None,
            pairs_ttl: Duration::from_secs(300),
            retry: RetryConfig::engine_metadata(),
            cached_pairs: Mutex::new(None),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    /// Restrict advertised pairs to those whose both ends are in `codes`.
    pub fn with_load_only(mut self, codes: Option<Vec<String>>) -> Self {
        self.load_only = codes.filter(|c| !c.is_empty());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn fetch_pairs(&self) -> Result<Vec<LanguagePair>> {
        let languages: Vec<EngineLanguage> = with_retry_if(
            &self.retry,
            "Engine language list",
            || async {
                let response = self
                    .client
                    .get(self.url("/languages"))
                    .send()
                    .await
                    .context("Failed to reach translation engine")?;

                let response = check_status(response, "/languages").await?;
                response
                    .json::<Vec<EngineLanguage>>()
                    .await
                    .context("Failed to parse engine language list")
            },
            is_retryable_error,
        )
        .await?;

        Ok(flatten_pairs(&languages, self.load_only.as_deref()))
    }
}

/// Turn the engine's language list into ordered, de-duplicated pairs.
fn flatten_pairs(languages: &[EngineLanguage], load_only: Option<&[String]>) -> Vec<LanguagePair> {
    let allowed = |code: &str| load_only.map_or(true, |codes| codes.iter().any(|c| c == code));

    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for language in languages {
        for target in &language.targets {
            if *target == language.code || !allowed(&language.code) || !allowed(target) {
                continue;
            }
            let pair = LanguagePair::new(language.code.clone(), target.clone());
            if seen.insert(pair.clone()) {
                pairs.push(pair);
            }
        }
    }
    pairs
}

async fn check_status(response: reqwest::Response, endpoint: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
    anyhow::bail!("Engine error on {} ({}): {}", endpoint, status, body)
}

/// Determine if an error is retryable (5xx errors, 429 rate limit, network errors)
/// Other 4xx client errors should not be retried
fn is_retryable_error(error: &anyhow::Error) -> bool {
    let error_str = error.to_string();

    // Error format: "Engine error on /languages (400 Bad Request): ..."
    if error_str.starts_with("Engine error on") {
        if let Some(start) = error_str.find('(') {
            if let Some(end) = error_str[start..].find(')') {
                let status_str = &error_str[start + 1..start + end];
                let status_num = status_str.split_whitespace().next().unwrap_or("");
                if let Ok(status) = status_num.parse::<u16>() {
                    return status == 429 || status >= 500;
                }
            }
        }
    }

    // Network errors, timeouts and malformed bodies from a flapping engine
    true
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        let request = TranslateRequest {
            q: text,
            source: from,
            target: to,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(self.url("/translate"))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {}->{} request to engine", from, to))?;

        let response = check_status(response, "/translate").await?;
        let body: TranslateResponse = response
            .json()
            .await
            .context("Failed to parse engine translation response")?;

        Ok(body.translated_text)
    }

    async fn detect_language(&self, text: &str) -> Result<Detection> {
        let request = DetectRequest {
            q: text,
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(self.url("/detect"))
            .json(&request)
            .send()
            .await
            .context("Failed to send detection request to engine")?;

        let response = check_status(response, "/detect").await?;
        let candidates: Vec<Detection> = response
            .json()
            .await
            .context("Failed to parse engine detection response")?;

        candidates
            .into_iter()
            .next()
            .context("Engine detection response contained no candidates")
    }

    async fn supported_pairs(&self) -> Result<Vec<LanguagePair>> {
        let fresh = self
            .cached_pairs
            .lock()
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.pairs_ttl)
            .map(|cached| cached.pairs.clone());
        if let Some(pairs) = fresh {
            return Ok(pairs);
        }

        let pairs = self.fetch_pairs().await?;
        info!("Engine reports {} language pairs", pairs.len());
        debug!(
            "Pairs: {}",
            pairs
                .iter()
                .map(LanguagePair::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        *self.cached_pairs.lock() = Some(CachedPairs {
            fetched_at: Instant::now(),
            pairs: pairs.clone(),
        });
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn create_test_translator(server: &MockServer) -> HttpTranslator {
        HttpTranslator::new(reqwest::Client::new(), &server.uri())
            .with_retry(RetryConfig::new(3, std::time::Duration::from_millis(5)))
    }

    fn languages_body() -> serde_json::Value {
        serde_json::json!([
            {"code": "en", "name": "English", "targets": ["en", "es", "de"]},
            {"code": "es", "name": "Spanish", "targets": ["en", "fr"]},
            {"code": "de", "name": "German", "targets": ["en", "de"]}
        ])
    }

    // ==================== Pair Tests ====================

    #[test]
    fn test_language_pair_display() {
        assert_eq!(LanguagePair::new("en", "es").to_string(), "en->es");
    }

    #[test]
    fn test_flatten_pairs_skips_self_and_duplicates() {
        let languages: Vec<EngineLanguage> = serde_json::from_value(serde_json::json!([
            {"code": "en", "targets": ["en", "es", "es"]},
            {"code": "es", "targets": ["en"]}
        ]))
        .unwrap();

        let pairs = flatten_pairs(&languages, None);
        assert_eq!(
            pairs,
            vec![LanguagePair::new("en", "es"), LanguagePair::new("es", "en")]
        );
    }

    #[test]
    fn test_flatten_pairs_load_only() {
        let languages: Vec<EngineLanguage> =
            serde_json::from_value(languages_body()).unwrap();
        let only = vec!["en".to_string(), "es".to_string()];

        let pairs = flatten_pairs(&languages, Some(&only));
        assert_eq!(
            pairs,
            vec![LanguagePair::new("en", "es"), LanguagePair::new("es", "en")]
        );
    }

    // ==================== Retry Classification Tests ====================

    #[test]
    fn test_is_retryable_error() {
        let server_error = anyhow::anyhow!("Engine error on /languages (503 Service Unavailable): x");
        let rate_limited = anyhow::anyhow!("Engine error on /languages (429 Too Many Requests): x");
        let client_error = anyhow::anyhow!("Engine error on /languages (400 Bad Request): x");
        let network = anyhow::anyhow!("Failed to reach translation engine");

        assert!(is_retryable_error(&server_error));
        assert!(is_retryable_error(&rate_limited));
        assert!(!is_retryable_error(&client_error));
        assert!(is_retryable_error(&network));
    }

    // ==================== HTTP Tests ====================

    #[tokio::test]
    async fn test_translate_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_partial_json(serde_json::json!({
                "q": "hello", "source": "en", "target": "es", "format": "text"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"translatedText": "hola"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let result = translator.translate("hello", "en", "es").await.expect("Should succeed");
        assert_eq!(result, "hola");
    }

    #[tokio::test]
    async fn test_translate_forwards_api_key() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_partial_json(serde_json::json!({"api_key": "engine-secret"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"translatedText": "ok"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server)
            .with_api_key(Some("engine-secret".to_string()));
        assert_eq!(translator.translate("x", "en", "es").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_translate_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let err = translator.translate("x", "en", "es").await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("model crashed"));
    }

    #[tokio::test]
    async fn test_detect_language_first_candidate() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"language": "fr", "confidence": 92.0},
                {"language": "es", "confidence": 5.0}
            ])))
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let detection = translator.detect_language("bonjour").await.unwrap();
        assert_eq!(detection.language, "fr");
        assert_eq!(detection.confidence, 92.0);
    }

    #[tokio::test]
    async fn test_detect_language_empty_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let err = translator.detect_language("?").await.unwrap_err();
        assert!(err.to_string().contains("no candidates"));
    }

    #[tokio::test]
    async fn test_supported_pairs_are_cached() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(languages_body()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let first = translator.supported_pairs().await.unwrap();
        let second = translator.supported_pairs().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                LanguagePair::new("en", "es"),
                LanguagePair::new("en", "de"),
                LanguagePair::new("es", "en"),
                LanguagePair::new("es", "fr"),
                LanguagePair::new("de", "en"),
            ]
        );
    }

    #[tokio::test]
    async fn test_supported_pairs_retries_server_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(languages_body()))
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        let pairs = translator.supported_pairs().await.expect("Should recover");
        assert_eq!(pairs.len(), 5);
    }

    #[tokio::test]
    async fn test_supported_pairs_client_error_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let translator = create_test_translator(&mock_server);
        assert!(translator.supported_pairs().await.is_err());
    }
}
