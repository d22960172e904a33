//! Correlation registry: pending calls keyed by correlation id.
//!
//! The registry maps a [`CorrelationId`] to the caller waiting for its response and
//! guarantees that every pending entry is completed exactly once, by whichever
//! comes first of a resolution or its deadline.
//!
//! # Lifecycle
//!
//! ```text
//!                register(id, timeout)
//!                        │
//!                        ▼
//!                 ┌─────────────┐
//!        resolve  │   Pending   │  deadline / cancel / drop
//!      ┌──────────┤             ├────────────┐
//!      ▼          └─────────────┘            ▼
//! ┌──────────┐                        ┌────────────┐
//! │ Resolved │                        │  TimedOut  │
//! └──────────┘                        └────────────┘
//! ```
//!
//! Removing the entry from the map *is* the transition out of `Pending`. The map
//! lock is held only for that O(1) insert or remove and never across an await, so
//! whoever removes the entry wins and the loser sees nothing to do.
//!
//! # Example
//!
//! ```
//! use aether_core::CorrelationId;
//! use aether_runtime::registry::CorrelationRegistry;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CorrelationRegistry::new();
//! let id = CorrelationId::new();
//!
//! let pending = registry.register(id.clone(), Duration::from_secs(5))?;
//! assert!(registry.resolve(&id, "pong"));
//! assert_eq!(pending.wait().await?, "pong");
//! assert_eq!(registry.pending_count(), 0);
//! # Ok(())
//! # }
//! ```

use crate::metrics::BridgeMetrics;
use aether_core::CorrelationId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Errors produced by the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is already pending. Ids are generated fresh per call, so this signals
    /// a programming error rather than a user-facing condition.
    #[error("Correlation id {0} is already pending")]
    DuplicateCorrelation(CorrelationId),

    /// No response arrived before the deadline.
    #[error("No response for correlation id {correlation_id} within {timeout:?}")]
    ResponseTimeout {
        /// The call that timed out
        correlation_id: CorrelationId,
        /// The timeout it was registered with
        timeout: Duration,
    },

    /// The entry was removed without a result being delivered.
    #[error("Pending call {0} was closed without a result")]
    Closed(CorrelationId),
}

struct Entry<T> {
    token: u64,
    deadline: Instant,
    sender: oneshot::Sender<T>,
}

struct PendingTable<T> {
    entries: HashMap<CorrelationId, Entry<T>>,
    next_token: u64,
}

type Shared<T> = Arc<Mutex<PendingTable<T>>>;

fn lock<T>(table: &Shared<T>) -> MutexGuard<'_, PendingTable<T>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of pending calls awaiting a correlated response.
///
/// Cheap to clone; clones share the same table.
pub struct CorrelationRegistry<T> {
    table: Shared<T>,
}

impl<T> Clone for CorrelationRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: Send + 'static> Default for CorrelationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> CorrelationRegistry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(PendingTable {
                entries: HashMap::new(),
                next_token: 0,
            })),
        }
    }

    /// Register a pending call that expires after `timeout`.
    ///
    /// The returned [`PendingCall`] is the caller's handle: await
    /// [`PendingCall::wait`] to suspend until the call is resolved or times out.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCorrelation`] if `correlation_id` is already
    /// pending.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        timeout: Duration,
    ) -> Result<PendingCall<T>, RegistryError> {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365));
        let (sender, receiver) = oneshot::channel();

        let mut table = lock(&self.table);
        if table.entries.contains_key(&correlation_id) {
            tracing::error!(correlation_id = %correlation_id, "Duplicate correlation id registered");
            return Err(RegistryError::DuplicateCorrelation(correlation_id));
        }

        let token = table.next_token;
        table.next_token = table.next_token.wrapping_add(1);
        table.entries.insert(
            correlation_id.clone(),
            Entry {
                token,
                deadline,
                sender,
            },
        );
        let pending = table.entries.len();
        drop(table);
        BridgeMetrics::record_pending(pending);

        tracing::trace!(correlation_id = %correlation_id, timeout_ms = timeout.as_millis(), "Registered pending call");

        Ok(PendingCall {
            correlation_id,
            token,
            deadline,
            timeout,
            receiver,
            table: Arc::clone(&self.table),
            settled: false,
        })
    }

    /// Complete the pending call for `correlation_id` with `result`.
    ///
    /// Returns `true` if a waiting caller was completed. Unknown, already resolved
    /// and timed-out ids are a no-op returning `false`: late and duplicate bus
    /// deliveries are expected.
    pub fn resolve(&self, correlation_id: &CorrelationId, result: T) -> bool {
        let mut table = lock(&self.table);
        let Some(entry) = table.entries.remove(correlation_id) else {
            drop(table);
            tracing::warn!(correlation_id = %correlation_id, "No pending request for correlation id");
            return false;
        };
        let pending = table.entries.len();

        // Sent while holding the lock so a waiter whose eviction lost the race
        // always finds the value in its channel.
        let delivered = entry.sender.send(result).is_ok();
        drop(table);
        BridgeMetrics::record_pending(pending);

        if delivered {
            tracing::debug!(correlation_id = %correlation_id, "Resolved pending call");
        } else {
            tracing::warn!(correlation_id = %correlation_id, "Pending caller went away before resolution");
        }
        delivered
    }

    /// Number of calls currently pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.table).entries.len()
    }

    /// Whether `correlation_id` is currently pending.
    #[must_use]
    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        lock(&self.table).entries.contains_key(correlation_id)
    }

    /// Deadline of a pending call, if it is still pending.
    #[must_use]
    pub fn deadline_of(&self, correlation_id: &CorrelationId) -> Option<Instant> {
        lock(&self.table)
            .entries
            .get(correlation_id)
            .map(|entry| entry.deadline)
    }
}

/// Remove the entry only if it is still the one identified by `token`.
fn evict<T>(table: &Shared<T>, correlation_id: &CorrelationId, token: u64) -> bool {
    let mut table = lock(table);
    let owned = table
        .entries
        .get(correlation_id)
        .is_some_and(|entry| entry.token == token);
    if !owned {
        return false;
    }
    table.entries.remove(correlation_id);
    let pending = table.entries.len();
    drop(table);
    BridgeMetrics::record_pending(pending);
    true
}

/// Handle held by a caller waiting for a correlated response.
///
/// Dropping the handle (for example when the HTTP client disconnects) removes the
/// entry, so abandoned calls never leak.
pub struct PendingCall<T> {
    correlation_id: CorrelationId,
    token: u64,
    deadline: Instant,
    timeout: Duration,
    receiver: oneshot::Receiver<T>,
    table: Shared<T>,
    settled: bool,
}

impl<T> PendingCall<T> {
    /// The correlation id this call waits on.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Absolute expiry time.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Suspend until the call is resolved or its deadline passes.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::ResponseTimeout`] if the deadline passed first
    /// - [`RegistryError::Closed`] if the entry vanished without a result
    pub async fn wait(mut self) -> Result<T, RegistryError> {
        let outcome = tokio::time::timeout_at(self.deadline, &mut self.receiver).await;
        self.settled = true;

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(RegistryError::Closed(self.correlation_id.clone())),
            Err(_elapsed) => {
                if evict(&self.table, &self.correlation_id, self.token) {
                    tracing::warn!(
                        correlation_id = %self.correlation_id,
                        timeout_ms = self.timeout.as_millis(),
                        "Response timeout"
                    );
                    return Err(RegistryError::ResponseTimeout {
                        correlation_id: self.correlation_id.clone(),
                        timeout: self.timeout,
                    });
                }

                // Resolution removed the entry first and has already sent.
                self.receiver
                    .try_recv()
                    .map_err(|_| RegistryError::Closed(self.correlation_id.clone()))
            },
        }
    }

    /// Withdraw the call without waiting for a result.
    ///
    /// Returns `true` if the entry was still pending.
    pub fn cancel(mut self) -> bool {
        self.settled = true;
        let removed = evict(&self.table, &self.correlation_id, self.token);
        if removed {
            tracing::debug!(correlation_id = %self.correlation_id, "Cancelled pending call");
        }
        removed
    }
}

impl<T> std::fmt::Debug for PendingCall<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("correlation_id", &self.correlation_id)
            .field("deadline", &self.deadline)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for PendingCall<T> {
    fn drop(&mut self) {
        if !self.settled && evict(&self.table, &self.correlation_id, self.token) {
            tracing::debug!(correlation_id = %self.correlation_id, "Pending call abandoned by caller");
        }
    }
}
