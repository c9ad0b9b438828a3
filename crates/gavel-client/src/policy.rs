//! Reconnect timing.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay the observed client waited between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// How long to wait before each reconnect attempt.
///
/// Delays start at `initial_delay`, are multiplied by `multiplier` after every
/// failed attempt up to `max_delay`, and are spread by `jitter` (a fraction of
/// the delay, applied in both directions). A successful handshake resets the
/// delay to `initial_delay`.
///
/// Loading a policy rejects a `multiplier` or `jitter` that is not a finite
/// number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PolicyFields")]
pub struct ReconnectPolicy {
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl ReconnectPolicy {
    /// Same delay every time, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Doubling delays from `initial` up to `max`, spread by 20%.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max.max(initial),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

/// A reconnect policy that cannot be used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("reconnect {field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
}

/// Wire form of [`ReconnectPolicy`], checked before use.
#[derive(Deserialize)]
#[serde(default)]
struct PolicyFields {
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Default for PolicyFields {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            initial_delay: policy.initial_delay,
            max_delay: policy.max_delay,
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

impl TryFrom<PolicyFields> for ReconnectPolicy {
    type Error = PolicyError;

    fn try_from(fields: PolicyFields) -> Result<Self, Self::Error> {
        for (field, value) in [("multiplier", fields.multiplier), ("jitter", fields.jitter)] {
            if !value.is_finite() {
                return Err(PolicyError::NotFinite { field, value });
            }
        }
        Ok(Self {
            initial_delay: fields.initial_delay,
            max_delay: fields.max_delay,
            multiplier: fields.multiplier,
            jitter: fields.jitter,
        })
    }
}

/// Running state of a [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let current = policy.initial_delay;
        Self { policy, current }
    }

    /// Delay the next attempt will wait, before jitter.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the delay for the next attempt and grow the base for the one after.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = self.scale(base, self.multiplier());
        self.spread(base)
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial_delay;
    }

    fn multiplier(&self) -> f64 {
        let multiplier = self.policy.multiplier;
        if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        }
    }

    fn jitter(&self) -> f64 {
        let jitter = self.policy.jitter;
        if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// `base * factor`, saturating at `max_delay`.
    fn scale(&self, base: Duration, factor: f64) -> Duration {
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(self.policy.max_delay)
            .min(self.policy.max_delay)
    }

    fn spread(&self, base: Duration) -> Duration {
        let jitter = self.jitter();
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let factor = 1.0 - jitter + rand::rng().random::<f64>() * 2.0 * jitter;
        self.scale(base, factor)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
