//! Identity labels for enrollments made without a naming step.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of fresh, non-colliding identity labels.
pub trait LabelSource: Send + Sync {
    fn next_label(&self) -> String;
}

/// `User_<unix-millis>` labels, strictly increasing even within one millisecond.
#[derive(Debug, Default)]
pub struct TimestampLabels {
    last: AtomicI64,
}

impl TimestampLabels {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_millis(&self, now: i64) -> i64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl LabelSource for TimestampLabels {
    fn next_label(&self) -> String {
        let millis = self.next_millis(chrono::Utc::now().timestamp_millis());
        format!("User_{millis}")
    }
}
