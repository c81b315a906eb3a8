//! Liveness pings.
//!
//! The tick context polls the tracker once per tick. When no ping is
//! outstanding and the interval has elapsed a fresh random payload is issued;
//! when a ping has been outstanding longer than the timeout the connection is
//! dead. Echoes that do not match the outstanding payload are ignored.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// What the tick context should do after polling a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlivePoll {
    /// Send a keepalive carrying this payload.
    Send(i64),
    /// The outstanding ping was never answered.
    Expired,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveResponse {
    /// Matched the outstanding ping; carries the round trip time.
    Accepted(Duration),
    /// No ping outstanding, or a different payload.
    Stale,
}

#[derive(Debug)]
pub struct KeepAliveTracker {
    interval: Duration,
    timeout: Duration,
    last_sent: Instant,
    outstanding: Option<(i64, Instant)>,
    latency: Option<Duration>,
}

impl KeepAliveTracker {
    pub fn new(interval: Duration, timeout: Duration, now: Instant) -> Self {
        Self {
            interval,
            timeout,
            last_sent: now,
            outstanding: None,
            latency: None,
        }
    }

    pub fn poll(&mut self, now: Instant) -> KeepAlivePoll {
        if let Some((_, sent_at)) = self.outstanding {
            if now.saturating_duration_since(sent_at) >= self.timeout {
                return KeepAlivePoll::Expired;
            }
            return KeepAlivePoll::Idle;
        }

        if now.saturating_duration_since(self.last_sent) < self.interval {
            return KeepAlivePoll::Idle;
        }

        let payload = rand::rng().random::<i64>();
        self.outstanding = Some((payload, now));
        self.last_sent = now;
        KeepAlivePoll::Send(payload)
    }

    pub fn on_response(&mut self, payload: i64, now: Instant) -> KeepAliveResponse {
        match self.outstanding {
            Some((expected, sent_at)) if expected == payload => {
                let rtt = now.saturating_duration_since(sent_at);
                self.outstanding = None;
                self.latency = Some(rtt);
                KeepAliveResponse::Accepted(rtt)
            }
            _ => KeepAliveResponse::Stale,
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Round trip time of the last answered ping.
    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(15);
    const TIMEOUT: Duration = Duration::from_secs(30);

    fn sent(poll: KeepAlivePoll) -> i64 {
        match poll {
            KeepAlivePoll::Send(payload) => payload,
            other => panic!("expected a ping, got {other:?}"),
        }
    }

    #[test]
    fn test_ping_after_interval() {
        let start = Instant::now();
        let mut tracker = KeepAliveTracker::new(INTERVAL, TIMEOUT, start);

        assert_eq!(tracker.poll(start + Duration::from_secs(5)), KeepAlivePoll::Idle);
        let payload = sent(tracker.poll(start + INTERVAL));
        assert!(tracker.is_outstanding());

        let answer = tracker.on_response(payload, start + INTERVAL + Duration::from_millis(40));
        assert_eq!(answer, KeepAliveResponse::Accepted(Duration::from_millis(40)));
        assert_eq!(tracker.latency(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_stale_echo_ignored() {
        let start = Instant::now();
        let mut tracker = KeepAliveTracker::new(INTERVAL, TIMEOUT, start);
        assert_eq!(tracker.on_response(42, start), KeepAliveResponse::Stale);

        let payload = sent(tracker.poll(start + INTERVAL));
        let wrong = payload.wrapping_add(1);
        assert_eq!(tracker.on_response(wrong, start + INTERVAL), KeepAliveResponse::Stale);
        assert!(tracker.is_outstanding());
    }

    #[test]
    fn test_unanswered_ping_expires() {
        let start = Instant::now();
        let mut tracker = KeepAliveTracker::new(INTERVAL, TIMEOUT, start);
        sent(tracker.poll(start + INTERVAL));

        assert_eq!(tracker.poll(start + INTERVAL + Duration::from_secs(29)), KeepAlivePoll::Idle);
        assert_eq!(tracker.poll(start + INTERVAL + TIMEOUT), KeepAlivePoll::Expired);
    }

    #[test]
    fn test_payloads_are_unpredictable() {
        let start = Instant::now();
        let mut tracker = KeepAliveTracker::new(INTERVAL, TIMEOUT, start);
        let mut seen = std::collections::HashSet::new();
        for round in 1..=16u32 {
            let now = start + INTERVAL * round * 2;
            let payload = sent(tracker.poll(now));
            tracker.on_response(payload, now);
            seen.insert(payload);
        }
        assert!(seen.len() > 1);
    }
}
