//! Plan-based character metering with lazily rolled monthly windows.

use crate::clock::Clock;
use crate::error::{GatewayError, GatewayResult};
use crate::metrics::GatewayMetrics;
use crate::store::CredentialStore;
use crate::user::{Plan, User};
use chrono::Duration;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Limit reported for plans without a cap.
pub const UNLIMITED_SENTINEL: u64 = 999_999_999;

pub const DEFAULT_FREE_LIMIT: u64 = 10_000;
pub const DEFAULT_PRO_LIMIT: u64 = 1_000_000;
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Characters allowed per window for each capped plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub free: u64,
    pub pro: u64,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            free: DEFAULT_FREE_LIMIT,
            pro: DEFAULT_PRO_LIMIT,
        }
    }
}

impl PlanLimits {
    /// `None` means unbounded.
    pub fn limit_for(&self, plan: Plan) -> Option<u64> {
        match plan {
            Plan::Free => Some(self.free),
            Plan::Pro => Some(self.pro),
            Plan::Enterprise => None,
        }
    }

    /// Limit as shown to clients.
    pub fn display_limit(&self, plan: Plan) -> u64 {
        self.limit_for(plan).unwrap_or(UNLIMITED_SENTINEL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub used: u64,
    pub limit: u64,
}

pub struct UsageMeter {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    limits: PlanLimits,
    window: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
    metrics: &'static GatewayMetrics,
}

impl UsageMeter {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        limits: PlanLimits,
        window: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            limits,
            window,
            locks: DashMap::new(),
            metrics: GatewayMetrics::global(),
        }
    }

    fn lock_for(&self, email: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Fetch the user and roll the window over if it has expired. A reset is
    /// persisted immediately. Callers must hold the user's lock.
    fn load_current(&self, email: &str) -> GatewayResult<User> {
        let mut user = self.store.find(email)?.ok_or(GatewayError::UserNotFound)?;
        if user.usage.roll_over_if_expired(self.clock.now(), self.window) {
            info!(
                "Usage window for {} rolled over, next reset at {}",
                email, user.usage.reset_at
            );
            self.store.save(&user)?;
        }
        Ok(user)
    }

    fn fits(&self, user: &User, chars: u64) -> bool {
        match self.limits.limit_for(user.plan) {
            None => true,
            Some(limit) => user.usage.used.saturating_add(chars) <= limit,
        }
    }

    /// Would `chars` more characters stay within the user's plan?
    pub fn check_limit(&self, email: &str, chars: u64) -> GatewayResult<bool> {
        let lock = self.lock_for(email);
        let _guard = lock.lock();
        let user = self.load_current(email)?;
        Ok(self.fits(&user, chars))
    }

    /// Add `chars` to the user's counter without checking the limit.
    pub fn record_usage(&self, email: &str, chars: u64) -> GatewayResult<()> {
        let lock = self.lock_for(email);
        let _guard = lock.lock();
        let mut user = self.load_current(email)?;
        user.usage.used = user.usage.used.saturating_add(chars);
        self.store.save(&user)?;
        self.metrics.record_characters(chars);
        debug!("Recorded {} characters for {}", chars, email);
        Ok(())
    }

    pub fn current_usage(&self, email: &str) -> GatewayResult<UsageSnapshot> {
        let lock = self.lock_for(email);
        let _guard = lock.lock();
        let user = self.load_current(email)?;
        Ok(UsageSnapshot {
            used: user.usage.used,
            limit: self.limits.display_limit(user.plan),
        })
    }

    /// Switch the user's plan. Usage and the reset date are left as they are.
    pub fn upgrade(&self, email: &str, plan_name: &str) -> GatewayResult<User> {
        let plan: Plan = plan_name.parse()?;
        let lock = self.lock_for(email);
        let _guard = lock.lock();
        let mut user = self.store.find(email)?.ok_or(GatewayError::UserNotFound)?;
        let previous = user.plan;
        user.plan = plan;
        self.store.save(&user)?;
        info!("User {} changed plan {} -> {}", email, previous, plan);
        Ok(user)
    }

    /// Check and record in one step.
    ///
    /// Concurrent calls for the same email are serialized, so two requests can
    /// never both pass the check and together overshoot the limit.
    pub fn consume(&self, email: &str, chars: u64) -> GatewayResult<UsageSnapshot> {
        let lock = self.lock_for(email);
        let _guard = lock.lock();
        let mut user = self.load_current(email)?;

        if !self.fits(&user, chars) {
            self.metrics.record_quota_rejection();
            let limit = self.limits.display_limit(user.plan);
            info!(
                "Quota exceeded for {}: used {} + {} > {}",
                email, user.usage.used, chars, limit
            );
            return Err(GatewayError::QuotaExceeded { limit });
        }

        user.usage.used = user.usage.used.saturating_add(chars);
        self.store.save(&user)?;
        self.metrics.record_characters(chars);

        Ok(UsageSnapshot {
            used: user.usage.used,
            limit: self.limits.display_limit(user.plan),
        })
    }

    /// Give back characters charged for a request that then failed.
    pub fn refund(&self, email: &str, chars: u64) -> GatewayResult<()> {
        let lock = self.lock_for(email);
        let _guard = lock.lock();
        let mut user = self.load_current(email)?;
        user.usage.used = user.usage.used.saturating_sub(chars);
        self.store.save(&user)?;
        debug!("Refunded {} characters to {}", chars, email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::user::UsageWindow;
    use chrono::{TimeZone, Utc};

    fn setup() -> (UsageMeter, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let meter = UsageMeter::new(
            store.clone(),
            Arc::new(clock.clone()),
            PlanLimits::default(),
            Duration::days(DEFAULT_WINDOW_DAYS),
        );
        (meter, store, clock)
    }

    fn add_user(store: &MemoryStore, clock: &ManualClock, email: &str, plan: Plan) {
        let now = clock.now();
        store
            .create(User {
                email: email.to_string(),
                name: "Alice".to_string(),
                password_hash: "x".to_string(),
                plan,
                api_key: format!("key-{}", email),
                created_at: now,
                usage: UsageWindow::starting_at(now, Duration::days(DEFAULT_WINDOW_DAYS)),
            })
            .unwrap();
    }

    // ==================== Limit Tests ====================

    #[test]
    fn test_plan_limits() {
        let limits = PlanLimits::default();
        assert_eq!(limits.limit_for(Plan::Free), Some(10_000));
        assert_eq!(limits.limit_for(Plan::Pro), Some(1_000_000));
        assert_eq!(limits.limit_for(Plan::Enterprise), None);
        assert_eq!(limits.display_limit(Plan::Enterprise), 999_999_999);
    }

    #[test]
    fn test_alice_scenario() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "alice@x", Plan::Free);

        assert!(meter.check_limit("alice@x", 10_000).unwrap());
        meter.record_usage("alice@x", 10_000).unwrap();
        assert!(!meter.check_limit("alice@x", 1).unwrap());

        meter.upgrade("alice@x", "pro").unwrap();
        assert!(meter.check_limit("alice@x", 1).unwrap());
    }

    #[test]
    fn test_quota_monotonic_within_window() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);

        meter.record_usage("a@x", 9_000).unwrap();
        assert!(!meter.check_limit("a@x", 1_001).unwrap());
        clock.advance(Duration::days(10));
        assert!(!meter.check_limit("a@x", 1_001).unwrap());
        assert!(meter.check_limit("a@x", 1_000).unwrap());
    }

    #[test]
    fn test_zero_chars_always_fits_within_limit() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);
        meter.record_usage("a@x", 10_000).unwrap();
        assert!(meter.check_limit("a@x", 0).unwrap());
    }

    #[test]
    fn test_enterprise_unbounded() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "big@x", Plan::Enterprise);

        meter.record_usage("big@x", 50_000_000).unwrap();
        assert!(meter.check_limit("big@x", u64::MAX).unwrap());

        let usage = meter.current_usage("big@x").unwrap();
        assert_eq!(usage.used, 50_000_000);
        assert_eq!(usage.limit, UNLIMITED_SENTINEL);
    }

    // ==================== Reset Tests ====================

    #[test]
    fn test_lazy_reset_after_window() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);
        meter.record_usage("a@x", 7_000).unwrap();

        clock.advance(Duration::days(31));
        let usage = meter.current_usage("a@x").unwrap();
        assert_eq!(usage.used, 0);

        let stored = store.find("a@x").unwrap().unwrap();
        assert_eq!(stored.usage.used, 0);
        assert_eq!(stored.usage.reset_at, clock.now() + Duration::days(30));
    }

    #[test]
    fn test_no_reset_exactly_at_boundary() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);
        meter.record_usage("a@x", 500).unwrap();

        clock.advance(Duration::days(30));
        assert_eq!(meter.current_usage("a@x").unwrap().used, 500);
    }

    #[test]
    fn test_reset_then_record() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);
        meter.record_usage("a@x", 10_000).unwrap();

        clock.advance(Duration::days(45));
        meter.record_usage("a@x", 25).unwrap();
        assert_eq!(meter.current_usage("a@x").unwrap().used, 25);
    }

    // ==================== Upgrade Tests ====================

    #[test]
    fn test_upgrade_preserves_usage_and_reset() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);
        meter.record_usage("a@x", 1_234).unwrap();
        let before = store.find("a@x").unwrap().unwrap();

        let upgraded = meter.upgrade("a@x", "enterprise").unwrap();
        assert_eq!(upgraded.plan, Plan::Enterprise);
        assert_eq!(upgraded.usage, before.usage);

        let stored = store.find("a@x").unwrap().unwrap();
        assert_eq!(stored.usage, before.usage);
    }

    #[test]
    fn test_upgrade_invalid_plan() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);
        let result = meter.upgrade("a@x", "platinum");
        assert!(matches!(result, Err(GatewayError::InvalidPlan(_))));
        assert_eq!(store.find("a@x").unwrap().unwrap().plan, Plan::Free);
    }

    #[test]
    fn test_downgrade_is_allowed() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Pro);
        assert_eq!(meter.upgrade("a@x", "free").unwrap().plan, Plan::Free);
    }

    #[test]
    fn test_unknown_user() {
        let (meter, _store, _clock) = setup();
        assert!(matches!(
            meter.check_limit("ghost@x", 1),
            Err(GatewayError::UserNotFound)
        ));
        assert!(matches!(
            meter.current_usage("ghost@x"),
            Err(GatewayError::UserNotFound)
        ));
        assert!(matches!(
            meter.upgrade("ghost@x", "pro"),
            Err(GatewayError::UserNotFound)
        ));
    }

    // ==================== consume / refund Tests ====================

    #[test]
    fn test_consume_rejects_with_limit() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);

        let usage = meter.consume("a@x", 9_999).unwrap();
        assert_eq!(usage.used, 9_999);

        let err = meter.consume("a@x", 2).unwrap_err();
        assert!(matches!(err, GatewayError::QuotaExceeded { limit: 10_000 }));
        assert_eq!(meter.current_usage("a@x").unwrap().used, 9_999);
    }

    #[test]
    fn test_refund_saturates() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);
        meter.consume("a@x", 100).unwrap();
        meter.refund("a@x", 40).unwrap();
        assert_eq!(meter.current_usage("a@x").unwrap().used, 60);
        meter.refund("a@x", 1_000).unwrap();
        assert_eq!(meter.current_usage("a@x").unwrap().used, 0);
    }

    #[test]
    fn test_concurrent_consume_never_exceeds_limit() {
        let (meter, store, clock) = setup();
        add_user(&store, &clock, "a@x", Plan::Free);
        let meter = Arc::new(meter);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let meter = meter.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| meter.consume("a@x", 100).is_ok())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
        assert_eq!(meter.current_usage("a@x").unwrap().used, 10_000);
    }
}
