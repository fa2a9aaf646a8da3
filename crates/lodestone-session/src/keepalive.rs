//! Keep-alive challenges shared by the Configuration and Play listeners.

use std::time::{Duration, Instant};

use crate::error::DisconnectReason;

/// Outcome of one keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    /// Nothing to do this tick.
    Idle,
    /// Send a challenge carrying this id.
    Challenge(i64),
}

/// Challenge/response bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct KeepAlive {
    interval: Duration,
    timeout: Duration,
    last_sent: Instant,
    pending: Option<i64>,
    latency_millis: u32,
}

impl KeepAlive {
    /// Start counting from `now`; the first challenge goes out one interval later.
    pub fn new(interval: Duration, timeout: Duration, now: Instant, latency_millis: u32) -> Self {
        Self {
            interval,
            timeout,
            last_sent: now,
            pending: None,
            latency_millis,
        }
    }

    /// Smoothed round-trip latency.
    pub fn latency_millis(&self) -> u32 {
        self.latency_millis
    }

    /// Whether a challenge is outstanding.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Advance the timer. Fails with [`DisconnectReason::Timeout`] once an
    /// outstanding challenge is older than the timeout.
    pub fn tick(&mut self, now: Instant) -> Result<KeepAliveAction, DisconnectReason> {
        let elapsed = now.saturating_duration_since(self.last_sent);
        if self.pending.is_some() {
            if elapsed >= self.timeout {
                return Err(DisconnectReason::Timeout);
            }
            return Ok(KeepAliveAction::Idle);
        }
        if elapsed < self.interval {
            return Ok(KeepAliveAction::Idle);
        }
        let id = rand::random::<i64>();
        self.pending = Some(id);
        self.last_sent = now;
        Ok(KeepAliveAction::Challenge(id))
    }

    /// Check an answer. Anything but the outstanding id is treated as a timeout.
    pub fn respond(&mut self, id: i64, now: Instant) -> Result<(), DisconnectReason> {
        if self.pending != Some(id) {
            return Err(DisconnectReason::Timeout);
        }
        self.pending = None;
        let sample = u32::try_from(now.saturating_duration_since(self.last_sent).as_millis())
            .unwrap_or(u32::MAX);
        self.latency_millis = ((u64::from(self.latency_millis) * 3 + u64::from(sample)) / 4) as u32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(15);

    fn keep_alive(now: Instant) -> KeepAlive {
        KeepAlive::new(INTERVAL, INTERVAL, now, 0)
    }

    #[test]
    fn test_challenge_after_interval() {
        let start = Instant::now();
        let mut ka = keep_alive(start);
        assert_eq!(ka.tick(start + Duration::from_secs(1)).unwrap(), KeepAliveAction::Idle);
        assert!(matches!(
            ka.tick(start + INTERVAL).unwrap(),
            KeepAliveAction::Challenge(_)
        ));
        assert!(ka.is_pending());
    }

    #[test]
    fn test_answer_updates_latency() {
        let start = Instant::now();
        let mut ka = keep_alive(start);
        let KeepAliveAction::Challenge(id) = ka.tick(start + INTERVAL).unwrap() else {
            panic!("expected challenge");
        };
        ka.respond(id, start + INTERVAL + Duration::from_millis(100))
            .unwrap();
        assert_eq!(ka.latency_millis(), 25);
        assert!(!ka.is_pending());
    }

    #[test]
    fn test_unanswered_challenge_times_out() {
        let start = Instant::now();
        let mut ka = keep_alive(start);
        ka.tick(start + INTERVAL).unwrap();
        assert_eq!(
            ka.tick(start + INTERVAL * 2),
            Err(DisconnectReason::Timeout)
        );
    }

    #[test]
    fn test_wrong_id_is_a_timeout() {
        let start = Instant::now();
        let mut ka = keep_alive(start);
        let KeepAliveAction::Challenge(id) = ka.tick(start + INTERVAL).unwrap() else {
            panic!("expected challenge");
        };
        assert_eq!(
            ka.respond(id.wrapping_add(1), start + INTERVAL),
            Err(DisconnectReason::Timeout)
        );
    }

    #[test]
    fn test_unsolicited_answer_is_a_timeout() {
        let start = Instant::now();
        let mut ka = keep_alive(start);
        assert_eq!(ka.respond(7, start), Err(DisconnectReason::Timeout));
    }
}
