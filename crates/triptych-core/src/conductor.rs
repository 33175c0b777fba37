//! Client conductor handle: the publication's link back to the client
//! runtime that owns its lifecycle.
//!
//! A publication never holds the conductor directly (the conductor also
//! holds the publication, and a strong cycle would leak both). Instead it
//! keeps a [`ConductorHandle`]: the sending half of a bounded command
//! queue plus the shared epoch clock and liveness window. On close the
//! publication posts a release command and forgets about it; the
//! conductor drains the queue on its own duty cycle and notifies the
//! driver.
//!
//! Posting never blocks the append path. If the queue is full or the
//! conductor is gone the command is dropped with a warning; the
//! conductor's timeout-based reclamation is the backstop.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// Millisecond wall-clock used for status-message liveness.
pub trait EpochClock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn time_millis(&self) -> i64;
}

/// [`EpochClock`] backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl EpochClock for SystemClock {
    fn time_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as i64)
    }
}

/// Commands a publication posts to its conductor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Owner released the publication; tell the driver to reclaim the log
    /// once no subscribers remain.
    ReleasePublication {
        /// Driver registration id of the publication
        registration_id: i64,
    },

    /// Add a manual destination to a multi-destination publication.
    AddDestination {
        /// Driver registration id of the publication
        registration_id: i64,
        /// Destination channel URI
        channel: String,
    },

    /// Remove a previously added destination.
    RemoveDestination {
        /// Driver registration id of the publication
        registration_id: i64,
        /// Destination channel URI
        channel: String,
    },
}

/// Sending half held by publications.
#[derive(Clone)]
pub struct ConductorHandle {
    commands: Sender<ClientCommand>,
    clock: Arc<dyn EpochClock>,
    liveness_window_ms: i64,
}

impl std::fmt::Debug for ConductorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConductorHandle")
            .field("liveness_window_ms", &self.liveness_window_ms)
            .finish_non_exhaustive()
    }
}

impl ConductorHandle {
    /// Post a command without blocking. Failure to enqueue is logged and
    /// swallowed; lifecycle commands are advisory and the conductor has
    /// timeout-based reclamation for the lost-command case.
    pub fn post(&self, command: ClientCommand) {
        match self.commands.try_send(command) {
            Ok(()) => {},
            Err(TrySendError::Full(command)) => {
                tracing::warn!(?command, "conductor command queue full, dropping command");
            },
            Err(TrySendError::Disconnected(command)) => {
                tracing::warn!(?command, "conductor gone, dropping command");
            },
        }
    }

    /// Current time from the shared epoch clock.
    #[must_use]
    pub fn time_millis(&self) -> i64 {
        self.clock.time_millis()
    }

    /// Liveness decision for a publication: is a status message stamped
    /// at `last_status_message_ms` still within the window?
    ///
    /// A zero timestamp means the driver has never seen a subscriber.
    #[must_use]
    pub fn is_publication_live(&self, last_status_message_ms: i64) -> bool {
        last_status_message_ms > 0
            && self.clock.time_millis() - last_status_message_ms <= self.liveness_window_ms
    }
}

/// Receiving half owned by the client runtime.
///
/// The full conductor duty cycle (driver protocol, keepalives, log
/// mapping) lives with the client runtime; this type carries exactly the
/// state the append engine interacts with.
pub struct ClientConductor {
    commands: Receiver<ClientCommand>,
    handle: ConductorHandle,
}

impl std::fmt::Debug for ClientConductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConductor").field("handle", &self.handle).finish_non_exhaustive()
    }
}

impl ClientConductor {
    /// Default bound on the command queue.
    pub const DEFAULT_COMMAND_CAPACITY: usize = 128;

    /// Build a conductor with the given clock and liveness window.
    #[must_use]
    pub fn new(clock: Arc<dyn EpochClock>, liveness_window: Duration) -> Self {
        Self::with_capacity(clock, liveness_window, Self::DEFAULT_COMMAND_CAPACITY)
    }

    /// As [`ClientConductor::new`] with an explicit queue capacity.
    #[must_use]
    pub fn with_capacity(
        clock: Arc<dyn EpochClock>,
        liveness_window: Duration,
        command_capacity: usize,
    ) -> Self {
        let (sender, receiver) = bounded(command_capacity);
        Self {
            commands: receiver,
            handle: ConductorHandle {
                commands: sender,
                clock,
                liveness_window_ms: liveness_window.as_millis() as i64,
            },
        }
    }

    /// Handle to give to a publication.
    #[must_use]
    pub fn handle(&self) -> ConductorHandle {
        self.handle.clone()
    }

    /// Drain all pending commands, oldest first.
    pub fn poll_commands(&self) -> Vec<ClientCommand> {
        self.commands.try_iter().collect()
    }
}
