//! Send trigger policy.
//!
//! Decides when the sync engine should run: the configured interval has
//! elapsed since the last successful send, or a prior batch left a backlog
//! behind. A negative interval disables automatic sending entirely.

use chrono::{DateTime, Utc};

use crate::config::Settings;

#[derive(Clone)]
pub struct SyncPolicy {
    settings: Settings,
}

impl SyncPolicy {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Whether a scheduled tick (new sample or timer) should fire a send.
    pub fn should_send(&self, now: DateTime<Utc>, in_flight: bool, more_pending: bool) -> bool {
        let interval = self.settings.send_interval_secs();
        if interval < 0 {
            return false;
        }
        if in_flight {
            return false;
        }
        // Backlog drains faster than the interval alone would allow.
        if more_pending {
            return true;
        }
        match self.settings.last_sent() {
            None => true,
            Some(last) => now.signed_duration_since(last).num_seconds() > interval,
        }
    }

    /// Whether an explicit flush may proceed. Bypasses the interval check
    /// but still respects the in-flight guard.
    pub fn may_flush(&self, in_flight: bool) -> bool {
        !in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn policy() -> (SyncPolicy, Settings) {
        let settings = Settings::new(Arc::new(MemoryConfig::new()));
        (SyncPolicy::new(settings.clone()), settings)
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_756_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_never_sent_fires_immediately() {
        let (p, _) = policy();
        assert!(p.should_send(t(0), false, false));
    }

    #[test]
    fn test_interval_gates_sends() {
        let (p, s) = policy();
        s.set_send_interval_secs(300);
        s.set_last_sent(t(0));

        assert!(!p.should_send(t(100), false, false));
        assert!(!p.should_send(t(300), false, false));
        assert!(p.should_send(t(301), false, false));
    }

    #[test]
    fn test_backlog_bypasses_interval() {
        let (p, s) = policy();
        s.set_send_interval_secs(300);
        s.set_last_sent(t(0));

        assert!(p.should_send(t(1), false, true));
    }

    #[test]
    fn test_in_flight_blocks_everything() {
        let (p, s) = policy();
        s.set_last_sent(t(0));
        assert!(!p.should_send(t(10_000), true, true));
        assert!(!p.may_flush(true));
        assert!(p.may_flush(false));
    }

    #[test]
    fn test_negative_interval_disables_sending() {
        let (p, s) = policy();
        s.set_send_interval_secs(-1);
        assert!(!p.should_send(t(10_000), false, true));
        // Explicit flush is still allowed.
        assert!(p.may_flush(false));
    }
}
