use chrono::Utc;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Wall-clock seam so tests can pin deletion timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        now_ms()
    }
}
