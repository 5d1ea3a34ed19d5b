//! Gateway metrics and observability.
//!
//! Process-wide counters for routed translations and metering decisions,
//! exposed through `GET /metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Translations served by a single direct model
    direct_translations: AtomicUsize,

    /// Translations bridged through one or more pivot languages
    multi_hop_translations: AtomicUsize,

    /// Translations that failed (no path or engine error)
    failed_translations: AtomicUsize,

    /// Requests rejected because the caller's quota was exhausted
    quota_rejections: AtomicUsize,

    /// Characters charged against user quotas
    characters_metered: AtomicU64,
}

/// Global metrics instance (initialized lazily)
static METRICS: OnceLock<GatewayMetrics> = OnceLock::new();

impl GatewayMetrics {
    /// A detached set of counters. The running service uses [`global`](Self::global).
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the global gateway metrics instance.
    pub fn global() -> &'static GatewayMetrics {
        METRICS.get_or_init(GatewayMetrics::new)
    }

    pub fn record_direct(&self) {
        self.direct_translations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_multi_hop(&self) {
        self.multi_hop_translations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_translations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quota_rejection(&self) {
        self.quota_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_characters(&self, chars: u64) {
        self.characters_metered.fetch_add(chars, Ordering::Relaxed);
    }

    pub fn direct_translations(&self) -> usize {
        self.direct_translations.load(Ordering::Relaxed)
    }

    pub fn multi_hop_translations(&self) -> usize {
        self.multi_hop_translations.load(Ordering::Relaxed)
    }

    pub fn failed_translations(&self) -> usize {
        self.failed_translations.load(Ordering::Relaxed)
    }

    pub fn quota_rejections(&self) -> usize {
        self.quota_rejections.load(Ordering::Relaxed)
    }

    pub fn characters_metered(&self) -> u64 {
        self.characters_metered.load(Ordering::Relaxed)
    }

    /// Generate a metrics report.
    pub fn report(&self) -> MetricsReport {
        let direct = self.direct_translations();
        let multi_hop = self.multi_hop_translations();
        let failed = self.failed_translations();
        let total = direct + multi_hop + failed;
        let success_rate = if total > 0 {
            ((direct + multi_hop) as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            direct_translations: direct,
            multi_hop_translations: multi_hop,
            failed_translations: failed,
            success_rate,
            quota_rejections: self.quota_rejections(),
            characters_metered: self.characters_metered(),
        }
    }
}

/// Snapshot of the gateway counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub direct_translations: usize,
    pub multi_hop_translations: usize,
    pub failed_translations: usize,

    /// Successful translations as a percentage (0-100)
    pub success_rate: f64,

    pub quota_rejections: usize,
    pub characters_metered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Counter Tests ====================

    #[test]
    fn test_record_counters() {
        let metrics = GatewayMetrics::new();

        metrics.record_direct();
        metrics.record_multi_hop();
        metrics.record_multi_hop();
        metrics.record_failure();
        metrics.record_quota_rejection();
        metrics.record_characters(120);
        metrics.record_characters(5);

        assert_eq!(metrics.direct_translations(), 1);
        assert_eq!(metrics.multi_hop_translations(), 2);
        assert_eq!(metrics.failed_translations(), 1);
        assert_eq!(metrics.quota_rejections(), 1);
        assert_eq!(metrics.characters_metered(), 125);
    }

    // ==================== Report Tests ====================

    #[test]
    fn test_report_empty() {
        let report = GatewayMetrics::new().report();

        assert_eq!(report.direct_translations, 0);
        assert_eq!(report.failed_translations, 0);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.characters_metered, 0);
    }

    #[test]
    fn test_report_success_rate() {
        let metrics = GatewayMetrics::new();

        // 3 successes, 1 failure = 75% success rate
        metrics.record_direct();
        metrics.record_direct();
        metrics.record_multi_hop();
        metrics.record_failure();

        assert_eq!(metrics.report().success_rate, 75.0);
    }

    #[test]
    fn test_report_all_failures() {
        let metrics = GatewayMetrics::new();
        metrics.record_failure();
        metrics.record_failure();

        assert_eq!(metrics.report().success_rate, 0.0);
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(GatewayMetrics::new().report()).unwrap();
        assert!(json.get("multi_hop_translations").is_some());
        assert!(json.get("quota_rejections").is_some());
    }

    // ==================== Singleton Tests ====================

    #[test]
    fn test_global_returns_same_instance() {
        let metrics1 = GatewayMetrics::global();
        let metrics2 = GatewayMetrics::global();

        assert!(std::ptr::eq(metrics1, metrics2));
    }
}
