//! Gate checks applied before any order is submitted

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use mexcbot_core::{Error, Result, TradingWindow};
use std::sync::Mutex;
use tracing::{info, warn};

/// Daily order quota, reset at local midnight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyQuota {
    pub date: NaiveDate,
    pub orders_used: u32,
    pub max_per_day: u32,
}

/// Answers "may we trade right now" for windows and the daily order budget.
///
/// Quota days roll over in the first configured window's zone, or UTC when no
/// windows are configured.
pub struct TradingGate {
    windows: Vec<TradingWindow>,
    quota_tz: Tz,
    quota: Mutex<DailyQuota>,
}

impl TradingGate {
    pub fn new(windows: Vec<TradingWindow>, max_per_day: u32) -> Self {
        let quota_tz = windows.first().map(|w| w.tz).unwrap_or(chrono_tz::UTC);
        let quota = DailyQuota {
            date: Utc::now().with_timezone(&quota_tz).date_naive(),
            orders_used: 0,
            max_per_day,
        };
        Self {
            windows,
            quota_tz,
            quota: Mutex::new(quota),
        }
    }

    /// True when no windows are configured or any window contains `now`
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if self.windows.is_empty() {
            return true;
        }
        self.windows.iter().any(|w| w.contains(now))
    }

    pub fn check_open(&self, now: DateTime<Utc>) -> Result<()> {
        if self.is_open(now) {
            Ok(())
        } else {
            warn!("Outside trading hours, refusing order");
            Err(Error::OutsideTradingWindow)
        }
    }

    /// Error when today's order budget is exhausted; rolls the counter over
    /// on the first check of a new local date
    pub fn check_quota(&self, now: DateTime<Utc>) -> Result<()> {
        let mut quota = self.lock_quota();
        self.roll_over(&mut quota, now);
        if quota.orders_used >= quota.max_per_day {
            return Err(Error::DailyQuotaExceeded {
                used: quota.orders_used,
                max: quota.max_per_day,
            });
        }
        Ok(())
    }

    /// Count one placed order against today's budget
    pub fn record_order(&self, now: DateTime<Utc>) {
        let mut quota = self.lock_quota();
        self.roll_over(&mut quota, now);
        quota.orders_used += 1;
    }

    pub fn quota(&self) -> DailyQuota {
        self.lock_quota().clone()
    }

    fn roll_over(&self, quota: &mut DailyQuota, now: DateTime<Utc>) {
        let today = now.with_timezone(&self.quota_tz).date_naive();
        if today != quota.date {
            info!("Daily counters reset ({} -> {today})", quota.date);
            quota.date = today;
            quota.orders_used = 0;
        }
    }

    fn lock_quota(&self) -> std::sync::MutexGuard<'_, DailyQuota> {
        self.quota.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn no_windows_means_always_open() {
        let gate = TradingGate::new(Vec::new(), 10);
        assert!(gate.is_open(Utc::now()));
    }

    #[test]
    fn overnight_utc_window_boundaries() {
        let gate = TradingGate::new(
            vec![TradingWindow::new(hm(22, 0), hm(6, 0), chrono_tz::UTC)],
            10,
        );
        assert!(!gate.is_open(utc(2024, 3, 5, 21, 59)));
        assert!(gate.is_open(utc(2024, 3, 5, 22, 0)));
        assert!(gate.is_open(utc(2024, 3, 6, 5, 59)));
        assert!(gate.is_open(utc(2024, 3, 6, 6, 0)));
        assert!(!gate.is_open(utc(2024, 3, 6, 6, 1)));
    }

    #[test]
    fn overnight_new_york_window_gates_local_evening() {
        let ny: Tz = "America/New_York".parse().unwrap();
        let gate = TradingGate::new(vec![TradingWindow::new(hm(22, 0), hm(6, 0), ny)], 10);

        // 21:00 New York local: outside the window
        let nine_pm = ny
            .with_ymd_and_hms(2024, 3, 5, 21, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(gate.check_open(nine_pm).is_err());

        // 23:00 New York local: inside
        let eleven_pm = ny
            .with_ymd_and_hms(2024, 3, 5, 23, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(gate.check_open(eleven_pm).is_ok());
    }

    #[test]
    fn quota_enforced_and_reset_on_date_roll() {
        let gate = TradingGate::new(Vec::new(), 3);
        let day_one = utc(2024, 3, 5, 12, 0);
        for _ in 0..3 {
            gate.check_quota(day_one).unwrap();
            gate.record_order(day_one);
        }
        assert!(matches!(
            gate.check_quota(day_one),
            Err(Error::DailyQuotaExceeded { used: 3, max: 3 })
        ));

        // first check of the next local day resets the counter
        let day_two = utc(2024, 3, 6, 0, 1);
        assert!(gate.check_quota(day_two).is_ok());
        assert_eq!(gate.quota().orders_used, 0);
    }

    #[test]
    fn quota_rolls_in_first_window_zone() {
        let ny: Tz = "America/New_York".parse().unwrap();
        let gate = TradingGate::new(vec![TradingWindow::new(hm(0, 0), hm(23, 59), ny)], 1);

        // 2024-03-06 02:00 UTC is still 2024-03-05 in New York
        let late_utc = utc(2024, 3, 6, 2, 0);
        gate.record_order(utc(2024, 3, 5, 20, 0));
        assert!(gate.check_quota(late_utc).is_err());

        // 2024-03-06 06:00 UTC is 01:00 New York: new local day
        assert!(gate.check_quota(utc(2024, 3, 6, 6, 0)).is_ok());
    }
}
