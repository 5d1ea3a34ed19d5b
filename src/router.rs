//! Direct / multi-hop / fail decisions over the installed language pairs.

use crate::clock::Clock;
use crate::error::{GatewayError, GatewayResult};
use crate::metrics::GatewayMetrics;
use crate::translator::{Detection, LanguagePair, Translator};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const AUTO_SOURCE: &str = "auto";
pub const FALLBACK_SOURCE: &str = "en";
pub const MAX_INTERMEDIATE_LANGUAGES: usize = 2;
pub const ERROR_LOG_COOLDOWN_SECS: i64 = 60;
const MAX_SUPPRESSED_KEYS: usize = 1024;

/// Shortest chain of pairs leading from `source` to `target`.
///
/// A direct pair always wins. Otherwise a breadth-first search visits at most
/// `max_intermediate` pivot languages; among equally short chains the one
/// discovered first in `pairs` order is returned.
pub fn find_path(
    source: &str,
    target: &str,
    pairs: &[LanguagePair],
    max_intermediate: usize,
) -> Option<Vec<String>> {
    if pairs.iter().any(|p| p.from == source && p.to == target) {
        return Some(vec![source.to_string(), target.to_string()]);
    }

    // Longest path (in nodes) that may still be extended
    let max_prefix = max_intermediate + 1;

    let mut queue: VecDeque<(&str, Vec<String>)> = VecDeque::new();
    queue.push_back((source, vec![source.to_string()]));
    let mut visited: HashSet<&str> = HashSet::from([source]);

    while let Some((current, path)) = queue.pop_front() {
        if path.len() > max_prefix {
            break;
        }

        for pair in pairs.iter().filter(|p| p.from == current) {
            if pair.to == target {
                let mut found = path.clone();
                found.push(target.to_string());
                return Some(found);
            }
            if path.len() < max_prefix && visited.insert(pair.to.as_str()) {
                let mut next = path.clone();
                next.push(pair.to.clone());
                queue.push_back((pair.to.as_str(), next));
            }
        }
    }

    None
}

/// Every language on either side of any pair, sorted and de-duplicated.
pub fn reachable_languages(pairs: &[LanguagePair]) -> Vec<String> {
    pairs
        .iter()
        .flat_map(|p| [p.from.clone(), p.to.clone()])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Lets a given error key through to the log at most once per cool-down.
///
/// Only log output is gated; callers still return every failure.
pub struct ErrorSuppressor {
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    max_keys: usize,
    last_logged: DashMap<String, DateTime<Utc>>,
}

impl ErrorSuppressor {
    pub fn new(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            clock,
            cooldown,
            max_keys: MAX_SUPPRESSED_KEYS,
            last_logged: DashMap::new(),
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    /// True if `key` has not been logged within the cool-down. Marks it as logged.
    pub fn should_log(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.last_logged
            .retain(|_, logged_at| now - *logged_at < self.cooldown);

        if self.last_logged.contains_key(key) {
            return false;
        }

        if self.last_logged.len() >= self.max_keys {
            let oldest = self
                .last_logged
                .iter()
                .min_by_key(|entry| *entry.value())
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.last_logged.remove(&oldest);
            }
        }

        self.last_logged.insert(key.to_string(), now);
        true
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_logged.len()
    }
}

/// Outcome of a routed translation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedTranslation {
    pub text: String,
    /// Languages visited, source first. A single entry means no model ran.
    pub path: Vec<String>,
    /// Set when the source was `auto` and the engine identified it.
    pub detected: Option<Detection>,
}

impl RoutedTranslation {
    pub fn is_multi_hop(&self) -> bool {
        self.path.len() > 2
    }
}

pub struct TranslationRouter {
    translator: Arc<dyn Translator>,
    suppressor: ErrorSuppressor,
    hop_timeout: std::time::Duration,
    max_intermediate: usize,
    metrics: &'static GatewayMetrics,
}

impl TranslationRouter {
    pub fn new(
        translator: Arc<dyn Translator>,
        clock: Arc<dyn Clock>,
        hop_timeout: std::time::Duration,
    ) -> Self {
        Self {
            translator,
            suppressor: ErrorSuppressor::new(clock, Duration::seconds(ERROR_LOG_COOLDOWN_SECS)),
            hop_timeout,
            max_intermediate: MAX_INTERMEDIATE_LANGUAGES,
            metrics: GatewayMetrics::global(),
        }
    }

    pub async fn supported_pairs(&self) -> GatewayResult<Vec<LanguagePair>> {
        self.translator.supported_pairs().await.map_err(|e| {
            if self.suppressor.should_log("engine:languages") {
                error!("Failed to fetch language pairs from engine: {:#}", e);
            }
            GatewayError::Engine("language list unavailable".to_string())
        })
    }

    pub async fn detect(&self, text: &str) -> GatewayResult<Detection> {
        self.translator.detect_language(text).await.map_err(|e| {
            if self.suppressor.should_log("engine:detect") {
                error!("Language detection failed: {:#}", e);
            }
            GatewayError::Engine("language detection failed".to_string())
        })
    }

    /// Fetch the engine's pairs, then route.
    pub async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> GatewayResult<RoutedTranslation> {
        let pairs = self.supported_pairs().await?;
        self.route_translate(text, source, target, &pairs).await
    }

    pub async fn route_translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        pairs: &[LanguagePair],
    ) -> GatewayResult<RoutedTranslation> {
        let (source, detected) = self.resolve_source(text, source).await;

        if source == target {
            return Ok(RoutedTranslation {
                text: text.to_string(),
                path: vec![source],
                detected,
            });
        }

        let Some(path) = find_path(&source, target, pairs, self.max_intermediate) else {
            self.metrics.record_failure();
            let available = reachable_languages(pairs);
            if self
                .suppressor
                .should_log(&format!("no_path:{}->{}", source, target))
            {
                error!(
                    "Cannot translate {} -> {}: no direct or indirect path available. Available languages: {}",
                    source,
                    target,
                    available.join(", ")
                );
            }
            return Err(GatewayError::NoTranslationPath {
                from: source,
                to: target.to_string(),
                available,
            });
        };

        if path.len() > 2 {
            info!("Using translation path: {}", path.join(" -> "));
        }

        let mut current = text.to_string();
        for hop in path.windows(2) {
            current = self.run_hop(&current, &hop[0], &hop[1]).await.map_err(|e| {
                self.metrics.record_failure();
                e
            })?;
        }

        if path.len() > 2 {
            self.metrics.record_multi_hop();
        } else {
            self.metrics.record_direct();
        }

        Ok(RoutedTranslation {
            text: current,
            path,
            detected,
        })
    }

    async fn resolve_source(&self, text: &str, source: &str) -> (String, Option<Detection>) {
        if source != AUTO_SOURCE {
            return (source.to_string(), None);
        }
        match self.translator.detect_language(text).await {
            Ok(detection) => {
                debug!("Auto-detected source language: {}", detection.language);
                (detection.language.clone(), Some(detection))
            }
            Err(e) => {
                if self.suppressor.should_log("engine:detect") {
                    warn!(
                        "Could not detect language ({:#}), using default: {}",
                        e, FALLBACK_SOURCE
                    );
                }
                (FALLBACK_SOURCE.to_string(), None)
            }
        }
    }

    async fn run_hop(&self, text: &str, from: &str, to: &str) -> GatewayResult<String> {
        let outcome =
            tokio::time::timeout(self.hop_timeout, self.translator.translate(text, from, to)).await;

        let message = match outcome {
            Ok(Ok(translated)) => return Ok(translated),
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {:?}", self.hop_timeout),
        };

        if self
            .suppressor
            .should_log(&format!("engine:{}->{}", from, to))
        {
            error!("Translation {} -> {} failed: {}", from, to, message);
        }
        Err(GatewayError::Engine(format!(
            "{} -> {} failed: {}",
            from, to, message
        )))
    }
}
