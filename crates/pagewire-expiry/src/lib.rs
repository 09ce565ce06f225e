//! One-shot expiry timers for Pagewire pages.
//!
//! Every page gets exactly one pending timer when it is created. When the
//! timer fires it does not touch any page state itself; it posts an
//! [`Expired`] notice on the scheduler's channel, and whoever owns the
//! page registry drains that channel from its own loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* connection events */ }
//!         Some(expired) = scheduler.next_expired() => {
//!             registry.expire(&expired.key, expired.generation);
//!         }
//!     }
//! }
//! ```
//!
//! # Policies
//!
//! [`ExpiryPolicy::FixedLifetime`] (the default) never renews a timer: a
//! page dies `ttl` after it was created no matter how busy it is.
//! [`ExpiryPolicy::IdleTimeout`] asks the owner to reschedule on activity.
//! Each schedule call hands out a new generation, so a notice from a
//! superseded timer can be recognised and dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// When a page's timer is (re)started.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ExpiryPolicy {
    /// Timer starts at creation and is never renewed.
    #[default]
    FixedLifetime,
    /// Timer restarts on every join and every message.
    IdleTimeout,
}

/// Configuration for the expiry scheduler.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// How long a page lives once its timer starts. Default: 60 s.
    pub ttl: Duration,
    /// Renewal policy.
    pub policy: ExpiryPolicy,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            ttl: Self::DEFAULT_TTL,
            policy: ExpiryPolicy::default(),
        }
    }
}

impl ExpiryConfig {
    /// Lifetime of a page when nothing else is configured.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    /// Shortest lifetime accepted; a zero ttl is raised to this.
    pub const MIN_TTL: Duration = Duration::from_millis(1);

    /// Longest lifetime accepted (one year); larger values are lowered to
    /// this so deadline arithmetic cannot overflow.
    pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// A fixed-lifetime config with the given ttl.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`ExpiryScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.ttl < Self::MIN_TTL {
            warn!(
                ttl_ms = self.ttl.as_millis() as u64,
                "page ttl below minimum, clamping"
            );
            self.ttl = Self::MIN_TTL;
        } else if self.ttl > Self::MAX_TTL {
            warn!(
                ttl_secs = self.ttl.as_secs(),
                max_secs = Self::MAX_TTL.as_secs(),
                "page ttl above maximum, clamping"
            );
            self.ttl = Self::MAX_TTL;
        }
        self
    }

    /// Whether activity on a page should restart its timer.
    pub fn renews_on_activity(&self) -> bool {
        self.policy == ExpiryPolicy::IdleTimeout
    }
}

// ---------------------------------------------------------------------------
// Timer handle and notice
// ---------------------------------------------------------------------------

/// Posted on the scheduler channel when a timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired<K> {
    /// The key the timer was scheduled for.
    pub key: K,
    /// Generation of the timer that fired.
    pub generation: u64,
}

/// Handle to one pending timer.
///
/// Stored next to the page it guards. Dropping the handle aborts the
/// timer task, so a page that is removed (or a registry that is dropped
/// at shutdown) leaves no stray timers behind.
#[derive(Debug)]
pub struct ExpiryTimer {
    handle: AbortHandle,
    deadline: Instant,
    generation: u64,
}

impl ExpiryTimer {
    /// When the timer fires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The generation carried by this timer's [`Expired`] notice.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time left until the deadline (zero once it has passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Starts one-shot timers and collects their notices.
///
/// One scheduler per registry owner. The scheduler keeps a sender to its
/// own channel, so [`next_expired`](Self::next_expired) only returns
/// `None` if the scheduler is being torn down.
pub struct ExpiryScheduler<K> {
    config: ExpiryConfig,
    tx: mpsc::UnboundedSender<Expired<K>>,
    rx: mpsc::UnboundedReceiver<Expired<K>>,
    next_generation: u64,
}

impl<K> ExpiryScheduler<K>
where
    K: Clone + Send + std::fmt::Debug + 'static,
{
    /// Create a scheduler from config.
    pub fn new(config: ExpiryConfig) -> Self {
        let config = config.validated();
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(
            ttl_ms = config.ttl.as_millis() as u64,
            policy = ?config.policy,
            "expiry scheduler created"
        );
        Self {
            config,
            tx,
            rx,
            next_generation: 1,
        }
    }

    /// Start a timer for `key` that fires once after the configured ttl.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&mut self, key: K) -> ExpiryTimer {
        let generation = self.next_generation;
        self.next_generation += 1;

        let deadline = Instant::now() + self.config.ttl;
        let tx = self.tx.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            trace!(key = ?task_key, generation, "expiry timer fired");
            let _ = tx.send(Expired {
                key: task_key,
                generation,
            });
        });

        trace!(?key, generation, "expiry timer scheduled");
        ExpiryTimer {
            handle: task.abort_handle(),
            deadline,
            generation,
        }
    }

    /// Wait for the next timer to fire.
    pub async fn next_expired(&mut self) -> Option<Expired<K>> {
        self.rx.recv().await
    }

    /// The validated config in effect.
    pub fn config(&self) -> &ExpiryConfig {
        &self.config
    }

    /// The configured page lifetime.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_sixty_second_fixed_lifetime() {
        let config = ExpiryConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.policy, ExpiryPolicy::FixedLifetime);
        assert!(!config.renews_on_activity());
    }

    #[test]
    fn test_validated_clamps_zero_ttl() {
        let config = ExpiryConfig::with_ttl(Duration::ZERO).validated();
        assert_eq!(config.ttl, ExpiryConfig::MIN_TTL);
    }

    #[test]
    fn test_validated_clamps_huge_ttl() {
        let config =
            ExpiryConfig::with_ttl(Duration::from_secs(u64::MAX)).validated();
        assert_eq!(config.ttl, ExpiryConfig::MAX_TTL);
    }

    #[test]
    fn test_validated_keeps_ttl_in_range() {
        let config = ExpiryConfig::with_ttl(Duration::from_secs(300)).validated();
        assert_eq!(config.ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_idle_timeout_renews_on_activity() {
        let config = ExpiryConfig {
            policy: ExpiryPolicy::IdleTimeout,
            ..Default::default()
        };
        assert!(config.renews_on_activity());
    }
}
