//! Durable relay queue and its drain worker
//!
//! # Design
//!
//! The queue is mirrored to a [`RelayRepository`] after every change so that
//! a restart resumes where it stopped. Draining is head-of-line: the head is
//! retried (with exponential backoff) until it is delivered or exhausts its
//! attempts and moves to the dead-letter list, so successfully delivered
//! messages keep their FIFO order.
//!
//! # Single flight
//!
//! An atomic `running` flag admits one drain loop at a time. After clearing
//! the flag the loop re-checks the queue, so a message enqueued while the
//! previous loop was finishing is never stranded.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{QueuedMessage, RelayEvent, RelayTransport};
use crate::core::traits::RelayRepository;

/// Retry schedule for failed deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before a message is dead-lettered
    pub max_attempts: u32,
    /// Wait after the first failure; doubles on each further failure
    pub base_delay: Duration,
    /// Upper bound for a single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Create a policy, replacing zero values with the defaults
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        let default = Self::default();

        let max_attempts = if max_attempts == 0 {
            warn!(
                "Invalid relay max_attempts ({}), using default ({})",
                max_attempts, default.max_attempts
            );
            default.max_attempts
        } else {
            max_attempts
        };

        let base_delay = if base_delay.is_zero() {
            warn!(
                "Invalid relay base delay (0), using default ({:?})",
                default.base_delay
            );
            default.base_delay
        } else {
            base_delay
        };

        Self {
            max_attempts,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Wait before retrying after `attempts` failures
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Outcome of a drain run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub sent: usize,
    pub dead_lettered: usize,
}

enum LoopExit {
    /// Queue is empty
    Idle,
    /// Relay got disabled; remaining messages stay queued
    Paused,
}

struct RelayInner {
    repo: Arc<dyn RelayRepository>,
    transport: Arc<dyn RelayTransport>,
    policy: RetryPolicy,
    queue: Mutex<VecDeque<QueuedMessage>>,
    running: AtomicBool,
    auto_spawn: bool,
}

/// Handle to the relay queue
///
/// Cheap to clone; all clones share one queue and one worker flag.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("pending", &self.pending())
            .field("policy", &self.inner.policy)
            .field("auto_spawn", &self.inner.auto_spawn)
            .finish()
    }
}

impl Relay {
    /// Create a relay, restoring any queue persisted by a previous run
    ///
    /// With `auto_spawn` set, every enqueue spawns a drain task on the current
    /// tokio runtime (if there is one). Without it the owner calls
    /// [`Relay::drain`] explicitly.
    pub fn new(
        repo: Arc<dyn RelayRepository>,
        transport: Arc<dyn RelayTransport>,
        policy: RetryPolicy,
        auto_spawn: bool,
    ) -> Self {
        let restored = repo.relay_queue().unwrap_or_else(|e| {
            warn!("Could not load relay queue, starting empty: {}", e);
            Vec::new()
        });
        if !restored.is_empty() {
            info!(pending = restored.len(), "restored relay queue");
        }

        Relay {
            inner: Arc::new(RelayInner {
                repo,
                transport,
                policy,
                queue: Mutex::new(restored.into()),
                running: AtomicBool::new(false),
                auto_spawn,
            }),
        }
    }

    /// Queue an event for delivery
    ///
    /// Never fails: when the relay is disabled this is a no-op, and storage
    /// errors are logged.
    pub fn enqueue(&self, event: &RelayEvent) {
        match self.inner.repo.relay_settings() {
            Ok(settings) if settings.is_ready() => {}
            Ok(_) => {
                debug!("relay disabled, dropping event");
                return;
            }
            Err(e) => {
                warn!("Could not read relay settings: {}", e);
                return;
            }
        }

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(QueuedMessage::new(event.render()));
            self.persist(&queue);
        }

        if self.inner.auto_spawn {
            self.kick();
        }
    }

    /// Spawn a drain task if a tokio runtime is available
    pub fn kick(&self) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let relay = self.clone();
            handle.spawn(async move {
                relay.drain().await;
            });
        }
    }

    /// Number of messages waiting
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Copy of the waiting messages, head first
    pub fn queued(&self) -> Vec<QueuedMessage> {
        self.inner.queue.lock().iter().cloned().collect()
    }

    /// Deliver queued messages until the queue is empty or the relay is
    /// disabled
    ///
    /// Returns immediately with an empty report if another drain is running.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if self
                .inner
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return report;
            }

            let exit = self.run(&mut report).await;
            self.inner.running.store(false, Ordering::Release);

            match exit {
                LoopExit::Paused => return report,
                LoopExit::Idle if self.pending() == 0 => return report,
                // Something arrived after the loop saw an empty queue
                LoopExit::Idle => continue,
            }
        }
    }

    async fn run(&self, report: &mut DrainReport) -> LoopExit {
        loop {
            let Some(head) = self.inner.queue.lock().front().cloned() else {
                return LoopExit::Idle;
            };

            let settings = match self.inner.repo.relay_settings() {
                Ok(settings) if settings.is_ready() => settings,
                Ok(_) => return LoopExit::Paused,
                Err(e) => {
                    warn!("Could not read relay settings: {}", e);
                    return LoopExit::Paused;
                }
            };

            match self.inner.transport.send(&settings, &head.text).await {
                Ok(()) => {
                    self.pop_head(&head);
                    report.sent += 1;
                    debug!(id = %head.id, "relay message sent");
                    self.record_sync();
                }
                Err(error) => {
                    let attempts = self.record_failure(&head, &error.to_string());
                    if attempts >= self.inner.policy.max_attempts {
                        if let Some(dead) = self.pop_head(&head) {
                            warn!(
                                id = %dead.id,
                                attempts,
                                "Dropping relay message after repeated failures: {}",
                                error
                            );
                            if let Err(e) = self.inner.repo.push_dead_letter(dead) {
                                warn!("Could not store dead letter: {}", e);
                            }
                        }
                        report.dead_lettered += 1;
                    } else {
                        let delay = self.inner.policy.delay_for(attempts);
                        warn!(
                            id = %head.id,
                            attempts,
                            "Relay send failed, retrying in {:?}: {}",
                            delay,
                            error
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Remove the head if it is still `head`
    fn pop_head(&self, head: &QueuedMessage) -> Option<QueuedMessage> {
        let mut queue = self.inner.queue.lock();
        if queue.front().map(|m| m.id) != Some(head.id) {
            return None;
        }
        let popped = queue.pop_front();
        self.persist(&queue);
        popped
    }

    fn record_failure(&self, head: &QueuedMessage, error: &str) -> u32 {
        let mut queue = self.inner.queue.lock();
        let attempts = match queue.front_mut() {
            Some(front) if front.id == head.id => {
                front.attempts += 1;
                front.last_error = Some(error.to_string());
                front.attempts
            }
            _ => head.attempts + 1,
        };
        self.persist(&queue);
        attempts
    }

    fn record_sync(&self) {
        let result = self.inner.repo.relay_settings().and_then(|mut settings| {
            settings.last_sync = Some(Utc::now());
            self.inner.repo.save_relay_settings(settings)
        });
        if let Err(e) = result {
            warn!("Could not record relay sync time: {}", e);
        }
    }

    fn persist(&self, queue: &VecDeque<QueuedMessage>) {
        if let Err(e) = self
            .inner
            .repo
            .save_relay_queue(queue.iter().cloned().collect())
        {
            warn!("Could not persist relay queue: {}", e);
        }
    }
}
