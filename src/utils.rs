use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::LedgerError;

/// Source of "now" for calendar-day decisions. All days are UTC days.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Runs a storage call with an upper bound. Elapsed calls fail closed and are
/// not retried: a retry after a partial write could award twice.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::error!("Storage call exceeded {}ms.", limit.as_millis());
            Err(LedgerError::Storage(format!(
                "Storage call timed out after {}ms",
                limit.as_millis()
            )))
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::Clock;

    pub struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn at(year: i32, month: u32, day: u32, hour: u32) -> Self {
            FixedClock(Mutex::new(
                Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap(),
            ))
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
