//! Request throttling for wearsync.
//!
//! The wearable asks its companion for fresh data only when the data it
//! holds is older than the refresh interval. Three facts drive the
//! decision:
//! - when data was last received (or produced, if the record says so)
//! - when a request was last sent successfully
//! - whether a record has arrived since that request
//!
//! A sent request stays outstanding until the next record arrives, so each
//! staleness period produces exactly one request. Callers may opt into a
//! time-based retry that re-sends an unanswered request after a delay.
//!
//! All of it is volatile; a restarted process starts with an empty throttle
//! and therefore requests on its first connected tick.

use std::time::Duration;
use sync_types::Timestamp;

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Held data is young enough; do nothing.
    Fresh {
        /// Age of the held data.
        age: Duration,
    },
    /// Data is stale but a request is still unanswered; wait for the answer.
    AwaitingResponse {
        /// When the outstanding request was sent.
        since: Timestamp,
    },
    /// Send one update request now.
    Request,
}

/// Timestamps gating outbound update requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleState {
    last_received: Option<Timestamp>,
    last_request_sent: Option<Timestamp>,
    answered: bool,
}

impl ThrottleState {
    /// Create an empty throttle (nothing received, nothing sent).
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a request is warranted at `now`.
    ///
    /// Data is fresh while `now - last_received <= refresh_interval`. Data
    /// that was never received is always stale. While stale, an unanswered
    /// request blocks further requests. With `retry_after` set, it blocks
    /// only until that much time has passed since it was sent; a clock that
    /// moved behind the send time never blocks in that mode.
    pub fn check(
        &self,
        now: Timestamp,
        refresh_interval: Duration,
        retry_after: Option<Duration>,
    ) -> ThrottleDecision {
        if let Some(received) = self.last_received {
            let age = now.saturating_since(received);
            if age <= refresh_interval {
                return ThrottleDecision::Fresh { age };
            }
        }

        match self.outstanding() {
            Some(sent) => {
                let waiting = match retry_after {
                    None => true,
                    Some(retry) => sent <= now && now.saturating_since(sent) < retry,
                };
                if waiting {
                    ThrottleDecision::AwaitingResponse { since: sent }
                } else {
                    ThrottleDecision::Request
                }
            }
            None => ThrottleDecision::Request,
        }
    }

    /// Record that a record arrived, stamped with freshness time `at`.
    ///
    /// Any arrival answers the outstanding request, whatever its stamp.
    pub fn record_received(&mut self, at: Timestamp) {
        self.last_received = Some(at);
        self.answered = true;
    }

    /// Record a successfully sent request.
    ///
    /// Failed sends must not be recorded so the next tick retries.
    pub fn record_request_sent(&mut self, at: Timestamp) {
        self.last_request_sent = Some(at);
        self.answered = false;
    }

    /// When data was last received.
    pub fn last_received(&self) -> Option<Timestamp> {
        self.last_received
    }

    /// When a request was last sent.
    pub fn last_request_sent(&self) -> Option<Timestamp> {
        self.last_request_sent
    }

    /// Send time of the request still waiting for a record, if any.
    pub fn outstanding(&self) -> Option<Timestamp> {
        self.last_request_sent.filter(|_| !self.answered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(1_800_000);
    const RETRY: Option<Duration> = Some(Duration::from_secs(60));

    fn ts(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn never_received_is_stale() {
        let throttle = ThrottleState::new();
        assert_eq!(
            throttle.check(ts(0), INTERVAL, None),
            ThrottleDecision::Request
        );
        assert_eq!(throttle.outstanding(), None);
    }

    #[test]
    fn fresh_until_interval_elapses_inclusive() {
        let mut throttle = ThrottleState::new();
        throttle.record_received(ts(0));

        assert!(matches!(
            throttle.check(ts(600_000), INTERVAL, None),
            ThrottleDecision::Fresh { .. }
        ));
        // elapsed == interval still counts as fresh
        assert!(matches!(
            throttle.check(ts(1_800_000), INTERVAL, None),
            ThrottleDecision::Fresh { .. }
        ));
        assert_eq!(
            throttle.check(ts(1_800_001), INTERVAL, None),
            ThrottleDecision::Request
        );
    }

    #[test]
    fn fresh_reports_age() {
        let mut throttle = ThrottleState::new();
        throttle.record_received(ts(5_000));

        assert_eq!(
            throttle.check(ts(600_000), INTERVAL, None),
            ThrottleDecision::Fresh {
                age: Duration::from_millis(595_000)
            }
        );
    }

    #[test]
    fn unanswered_request_blocks_until_a_record_arrives() {
        let mut throttle = ThrottleState::new();
        throttle.record_request_sent(ts(0));

        for now in [0, 30_000, 60_000, 120_000, 600_000, 86_400_000] {
            assert_eq!(
                throttle.check(ts(now), INTERVAL, None),
                ThrottleDecision::AwaitingResponse { since: ts(0) }
            );
        }

        throttle.record_received(ts(1_000));
        assert_eq!(throttle.outstanding(), None);
        assert_eq!(
            throttle.check(ts(1_801_001), INTERVAL, None),
            ThrottleDecision::Request
        );
    }

    #[test]
    fn opt_in_retry_spaces_unanswered_requests() {
        let mut throttle = ThrottleState::new();
        throttle.record_request_sent(ts(1_000));

        assert_eq!(
            throttle.check(ts(30_000), INTERVAL, RETRY),
            ThrottleDecision::AwaitingResponse { since: ts(1_000) }
        );
        assert_eq!(
            throttle.check(ts(61_000), INTERVAL, RETRY),
            ThrottleDecision::Request
        );
    }

    #[test]
    fn zero_retry_requests_every_stale_check() {
        let mut throttle = ThrottleState::new();
        throttle.record_request_sent(ts(1_000));

        assert_eq!(
            throttle.check(ts(1_000), INTERVAL, Some(Duration::ZERO)),
            ThrottleDecision::Request
        );
    }

    #[test]
    fn old_stamped_record_still_answers() {
        let mut throttle = ThrottleState::new();
        throttle.record_request_sent(ts(2_000_000));
        throttle.record_received(ts(100));

        assert_eq!(throttle.outstanding(), None);
        assert_eq!(
            throttle.check(ts(2_030_000), INTERVAL, None),
            ThrottleDecision::Request
        );
    }

    #[test]
    fn backwards_clock_does_not_gate_retry() {
        let mut throttle = ThrottleState::new();
        throttle.record_request_sent(ts(100_000));

        assert_eq!(
            throttle.check(ts(50_000), INTERVAL, RETRY),
            ThrottleDecision::Request
        );
        assert_eq!(
            throttle.check(ts(50_000), INTERVAL, None),
            ThrottleDecision::AwaitingResponse { since: ts(100_000) }
        );
    }

    #[test]
    fn received_in_the_future_is_fresh() {
        let mut throttle = ThrottleState::new();
        throttle.record_received(ts(10_000));

        assert_eq!(
            throttle.check(ts(5_000), INTERVAL, None),
            ThrottleDecision::Fresh {
                age: Duration::ZERO
            }
        );
    }

    #[test]
    fn new_record_suppresses_next_request() {
        let mut throttle = ThrottleState::new();
        throttle.record_request_sent(ts(0));
        throttle.record_received(ts(2_000_000));

        assert!(matches!(
            throttle.check(ts(2_000_100), INTERVAL, None),
            ThrottleDecision::Fresh { .. }
        ));
        assert_eq!(throttle.last_request_sent(), Some(ts(0)));
        assert_eq!(throttle.last_received(), Some(ts(2_000_000)));
    }
}
