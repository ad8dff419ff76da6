//! Quotas for user-triggered checks.

mod quota;

pub use quota::{ManualCheckQuota, QuotaExceeded, DEFAULT_MANUAL_CHECKS_PER_MINUTE};
