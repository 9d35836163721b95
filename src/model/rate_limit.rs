use chrono::{DateTime, Duration, Utc};
use strum_macros::AsRefStr;

use super::SubscriberRows;
use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum Window {
    #[strum(serialize = "minute")]
    Minute,
    #[strum(serialize = "hour")]
    Hour,
}

impl Window {
    pub fn duration(self) -> Duration {
        match self {
            Window::Minute => Duration::minutes(1),
            Window::Hour => Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum Subject {
    #[strum(serialize = "ip")]
    Ip,
    #[strum(serialize = "email")]
    Email,
}

/// Maximum number of rows allowed per subject and window. Reaching the limit rejects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub max_per_min_ip: usize,
    pub max_per_hour_ip: usize,
    pub max_per_min_email: usize,
    pub max_per_hour_email: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        RateLimits {
            max_per_min_ip: 3,
            max_per_hour_ip: 10,
            max_per_min_email: 1,
            max_per_hour_email: 10,
        }
    }
}

impl From<&RateLimitConfig> for RateLimits {
    fn from(config: &RateLimitConfig) -> Self {
        RateLimits {
            max_per_min_ip: config.max_per_min_ip,
            max_per_hour_ip: config.max_per_hour_ip,
            max_per_min_email: config.max_per_min_email,
            max_per_hour_email: config.max_per_hour_email,
        }
    }
}

/// The trailing window counts for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    pub ip_minute: usize,
    pub ip_hour: usize,
    pub email_minute: usize,
    pub email_hour: usize,
}

impl WindowCounts {
    pub fn compute(rows: &SubscriberRows, ip: &str, email: &str, now: DateTime<Utc>) -> Self {
        WindowCounts {
            ip_minute: rows.count_ip_within(ip, Window::Minute, now),
            ip_hour: rows.count_ip_within(ip, Window::Hour, now),
            email_minute: rows.count_email_within(email, Window::Minute, now),
            email_hour: rows.count_email_within(email, Window::Hour, now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{} rate limit per {} reached: {count} >= {limit}", .subject.as_ref(), .window.as_ref())]
pub struct RateLimitExceeded {
    pub subject: Subject,
    pub window: Window,
    pub count: usize,
    pub limit: usize,
}

impl RateLimits {
    /// Fails on the first count that meets or exceeds its limit, ip limits first.
    pub fn check(&self, counts: &WindowCounts) -> Result<(), RateLimitExceeded> {
        let checks = [
            (Subject::Ip, Window::Minute, counts.ip_minute, self.max_per_min_ip),
            (Subject::Ip, Window::Hour, counts.ip_hour, self.max_per_hour_ip),
            (Subject::Email, Window::Minute, counts.email_minute, self.max_per_min_email),
            (Subject::Email, Window::Hour, counts.email_hour, self.max_per_hour_email),
        ];

        match checks
            .into_iter()
            .find(|(_, _, count, limit)| count >= limit)
        {
            Some((subject, window, count, limit)) => Err(RateLimitExceeded {
                subject,
                window,
                count,
                limit,
            }),
            None => Ok(()),
        }
    }
}
