//! Logical-expiry envelopes.
//!
//! Keys read by the logical-expiration strategy are stored without a backend
//! TTL. Freshness is carried inside the value instead, so a stale entry stays
//! readable while a single worker refreshes it.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached value paired with the instant it stops being fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub data: T,
    pub expire_at: DateTime<Utc>,
}

impl<T> Envelope<T> {
    pub fn new(data: T, expire_at: DateTime<Utc>) -> Self {
        Self { data, expire_at }
    }

    /// Wrap `data` so that it stays fresh for `ttl` from `now`.
    pub fn expiring_after(data: T, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expire_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { data, expire_at }
    }

    /// Wrap `data` so that it stays fresh for `ttl` from the current time.
    pub fn expiring_in(data: T, ttl: Duration) -> Self {
        Self::expiring_after(data, Utc::now(), ttl)
    }

    /// Fresh while `expire_at` lies strictly in the future.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at > now
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    /// How long past `expire_at` the envelope is at `now`; zero while fresh.
    pub fn staleness_at(&self, now: DateTime<Utc>) -> Duration {
        if now > self.expire_at {
            (now - self.expire_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// Map the wrapped value, keeping the expiry.
    pub fn map<U, F>(self, f: F) -> Envelope<U>
    where
        F: FnOnce(T) -> U,
    {
        Envelope {
            data: f(self.data),
            expire_at: self.expire_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_until_expire_at() {
        let now = Utc::now();
        let envelope = Envelope::expiring_after("shop", now, Duration::from_secs(20));

        assert!(envelope.is_fresh_at(now));
        assert!(envelope.is_fresh_at(now + TimeDelta::seconds(19)));
        assert!(!envelope.is_fresh_at(now + TimeDelta::seconds(20)));
        assert!(!envelope.is_fresh_at(now + TimeDelta::seconds(21)));
    }

    #[test]
    fn test_staleness() {
        let now = Utc::now();
        let envelope = Envelope::new(1, now - TimeDelta::seconds(5));
        assert_eq!(envelope.staleness_at(now), Duration::from_secs(5));

        let fresh = Envelope::new(1, now + TimeDelta::seconds(5));
        assert_eq!(fresh.staleness_at(now), Duration::ZERO);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let envelope = Envelope::expiring_in((), Duration::MAX);
        assert_eq!(envelope.expire_at, DateTime::<Utc>::MAX_UTC);
        assert!(envelope.is_fresh());
    }

    #[test]
    fn test_serialized_field_names() {
        let envelope = Envelope::new(Some(7), DateTime::<Utc>::UNIX_EPOCH);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["data"], 7);
        assert!(json.get("expireAt").is_some());

        let empty: Envelope<Option<i32>> =
            serde_json::from_value(serde_json::json!({"data": null, "expireAt": "2024-01-01T00:00:00Z"}))
                .unwrap();
        assert_eq!(empty.data, None);
    }

    #[test]
    fn test_map_keeps_expiry() {
        let now = Utc::now();
        let envelope = Envelope::new(21, now).map(|v| v * 2);
        assert_eq!(envelope.data, 42);
        assert_eq!(envelope.expire_at, now);
    }
}
