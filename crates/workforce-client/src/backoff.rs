use std::time::Duration;

use rand::Rng;

/// Delay between push-channel reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// How long to wait before reconnecting after the push channel drops.
///
/// Retries never stop on their own; only unmounting the session ends them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt.
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`, scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]` and capped again.
    Exponential {
        base: Duration,
        max: Duration,
        jitter: f64,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Exponential backoff from 1 s up to 30 s with 20% jitter.
    pub fn exponential() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: 0.2,
        }
    }

    /// Delay before reconnect attempt number `attempt` (0-based, reset after
    /// every successful open).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max, jitter } => {
                let factor = 2u32.saturating_pow(attempt.min(16));
                let raw = base.saturating_mul(factor).min(max);
                let jitter = jitter.clamp(0.0, 1.0);
                if jitter == 0.0 {
                    return raw;
                }
                let scale = rand::rng().random_range(1.0 - jitter..=1.0 + jitter);
                raw.mul_f64(scale).min(max)
            },
        }
    }
}
