use std::sync::Arc;

use rearch::CapsuleHandle;
use time::OffsetDateTime;

use crate::config::test_mode_capsule;

/// Request header honored by [`TestModeClock`].
pub const TEST_NOW_HEADER: &str = "x-test-now-ms";

/// Source of "now", in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// `test_now_ms` is the raw value of the [`TEST_NOW_HEADER`] header, if the request had one.
    fn now_ms(&self, test_now_ms: Option<&str>) -> i64;
}

pub fn clock_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> Arc<dyn Clock> {
    if *get.as_ref(test_mode_capsule) {
        Arc::new(TestModeClock)
    } else {
        Arc::new(SystemClock)
    }
}

/// Wall-clock time; ignores any override.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self, _: Option<&str>) -> i64 {
        wall_clock_ms()
    }
}

/// Uses the override when it starts with an integer, wall-clock time otherwise.
pub struct TestModeClock;

impl Clock for TestModeClock {
    fn now_ms(&self, test_now_ms: Option<&str>) -> i64 {
        test_now_ms
            .and_then(parse_leading_integer)
            .unwrap_or_else(wall_clock_ms)
    }
}

/// Parses the optionally signed run of digits at the start of `raw`, ignoring
/// leading whitespace and anything after the digits. `"12.5"` is `12`.
fn parse_leading_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim_start();
    let sign_len = usize::from(raw.starts_with(['+', '-']));
    let digits_len = raw[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    raw[..sign_len + digits_len].parse().ok()
}

fn wall_clock_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}
