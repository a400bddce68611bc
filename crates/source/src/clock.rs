use std::sync::Arc;
use time::UtcDateTime;

/// Source of "now" for cache freshness decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> UtcDateTime;
}

pub type ClockHandle = Arc<dyn Clock>;

/// The system's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}
