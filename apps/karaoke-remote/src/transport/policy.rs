use std::time::Duration;

/// Automatic reconnect schedule: immediately, then 1.5s, 3s, 5s, 10s, 15s and
/// 30s. The last delay repeats until an attempt succeeds.
pub const RECONNECT_DELAYS_MS: [u64; 7] = [0, 1_500, 3_000, 5_000, 10_000, 15_000, 30_000];

pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(60);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
pub const FALLBACK_DELAY: Duration = Duration::from_millis(500);
pub const RESTART_DELAY: Duration = Duration::from_millis(1_500);

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPolicy {
    pub reconnect_delays: Vec<Duration>,
    /// `None` keeps retrying forever.
    pub max_reconnect_attempts: Option<u32>,
    pub keep_alive_interval: Duration,
    pub server_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Pause between a failed primary start and the fallback attempt.
    pub fallback_delay: Duration,
    /// Pause between a terminal close and the next connect sequence.
    pub restart_delay: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            reconnect_delays: RECONNECT_DELAYS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_reconnect_attempts: None,
            keep_alive_interval: KEEP_ALIVE_INTERVAL,
            server_timeout: SERVER_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            fallback_delay: FALLBACK_DELAY,
            restart_delay: RESTART_DELAY,
        }
    }
}

impl ConnectionPolicy {
    /// Delay before reconnect attempt `attempt` (zero based), or `None` once
    /// the attempt budget is spent.
    pub fn reconnect_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max) = self.max_reconnect_attempts {
            if attempt >= max {
                return None;
            }
        }
        let index = (attempt as usize).min(self.reconnect_delays.len().saturating_sub(1));
        Some(self.reconnect_delays.get(index).copied().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_schedule_then_repeats_last_delay() {
        let policy = ConnectionPolicy::default();
        let observed: Vec<u64> = (0..10)
            .map(|attempt| policy.reconnect_delay(attempt).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(
            observed,
            vec![0, 1_500, 3_000, 5_000, 10_000, 15_000, 30_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn attempt_budget_ends_retries() {
        let policy = ConnectionPolicy {
            max_reconnect_attempts: Some(2),
            ..ConnectionPolicy::default()
        };
        assert_eq!(policy.reconnect_delay(0), Some(Duration::ZERO));
        assert_eq!(policy.reconnect_delay(1), Some(Duration::from_millis(1_500)));
        assert_eq!(policy.reconnect_delay(2), None);
    }

    #[test]
    fn empty_schedule_retries_immediately() {
        let policy = ConnectionPolicy {
            reconnect_delays: Vec::new(),
            ..ConnectionPolicy::default()
        };
        assert_eq!(policy.reconnect_delay(5), Some(Duration::ZERO));
    }

    #[test]
    fn keep_alive_is_well_inside_server_timeout() {
        let policy = ConnectionPolicy::default();
        assert!(policy.keep_alive_interval * 2 < policy.server_timeout);
    }
}
