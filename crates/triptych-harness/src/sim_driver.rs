//! In-process stand-in for the media driver.
//!
//! The real driver lives in another process: it creates and cleans log
//! buffers, advances the publication limit as subscribers consume, and
//! stamps status-message liveness into the metadata section. The
//! simulated driver performs exactly those duties over an in-process
//! log so tests can drive every publication state deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use triptych_core::{
    ClientCommand, ClientConductor, EpochClock, LogBuffers, LogMeta, PositionCounter, Publication,
    PublicationParams,
};
use triptych_proto::{DefaultFrameHeader, Result, TERM_MIN_LENGTH};

/// Deterministic, manually advanced epoch clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Start at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        self.millis.fetch_add(delta.as_millis() as i64, Ordering::Relaxed);
    }

    /// Jump the clock to an absolute time.
    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::Relaxed);
    }
}

impl EpochClock for ManualClock {
    fn time_millis(&self) -> i64 {
        self.millis.load(Ordering::Relaxed)
    }
}

/// Log geometry and client settings for a simulated driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Term partition length.
    pub term_length: usize,
    /// MTU bounding single frames.
    pub mtu_length: usize,
    /// First term id of the stream.
    pub initial_term_id: i32,
    /// Session id the driver assigns the publication.
    pub session_id: i32,
    /// Stream id the publication was added for.
    pub stream_id: i32,
    /// Status-message liveness window for `is_connected`.
    pub liveness_window: Duration,
    /// Initial publication limit.
    pub initial_limit: i64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            term_length: TERM_MIN_LENGTH,
            mtu_length: 4096,
            initial_term_id: 0,
            session_id: 1,
            stream_id: 1001,
            liveness_window: Duration::from_secs(5),
            initial_limit: i64::MAX,
        }
    }
}

/// The driver side of one publication's log.
pub struct SimDriver {
    config: DriverConfig,
    buffers: LogBuffers,
    meta: LogMeta,
    limit: PositionCounter,
    conductor: ClientConductor,
    clock: Arc<ManualClock>,
}

impl std::fmt::Debug for SimDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDriver").field("config", &self.config).finish_non_exhaustive()
    }
}

impl SimDriver {
    /// Create and initialize a log the way the driver does on a
    /// successful add-publication command.
    pub fn launch(config: DriverConfig) -> Result<Self> {
        let buffers = LogBuffers::allocate(config.term_length)?;
        let meta = LogMeta::new(buffers.meta_buffer());
        meta.initialize(
            config.initial_term_id,
            config.term_length,
            config.mtu_length,
            &DefaultFrameHeader::new(config.session_id, config.stream_id),
        );
        meta.set_is_connected(true);

        let clock = Arc::new(ManualClock::new());
        let conductor =
            ClientConductor::new(Arc::<ManualClock>::clone(&clock) as Arc<dyn EpochClock>, config.liveness_window);

        tracing::debug!(?config, "simulated driver launched");
        Ok(Self {
            limit: PositionCounter::new(config.initial_limit),
            buffers,
            meta,
            conductor,
            clock,
            config,
        })
    }

    /// Hand the client its publication over this log.
    pub fn add_publication(&self, channel: &str, registration_id: i64) -> Result<Publication> {
        Publication::new(
            PublicationParams { channel: channel.to_string(), registration_id },
            &self.buffers,
            self.limit.clone(),
            self.conductor.handle(),
        )
    }

    /// The shared log region.
    #[must_use]
    pub fn buffers(&self) -> &LogBuffers {
        &self.buffers
    }

    /// The metadata view.
    #[must_use]
    pub fn meta(&self) -> &LogMeta {
        &self.meta
    }

    /// The manual clock behind `is_connected`.
    #[must_use]
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Geometry this driver was launched with.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Move the publication limit, as consuming subscribers would.
    pub fn set_publication_limit(&self, limit: i64) {
        self.limit.set_ordered(limit);
    }

    /// Record a subscriber status message: advances the limit and stamps
    /// liveness at the current clock.
    pub fn on_status_message(&self, new_limit: i64) {
        self.limit.set_ordered(new_limit);
        self.meta.set_time_of_last_status_message(self.clock.time_millis());
        self.meta.set_is_connected(true);
    }

    /// Driver cleaning duty: zero a partition so it can be reused.
    pub fn clean_partition(&self, partition_index: usize) {
        let term = self.buffers.term_buffer(partition_index);
        term.set_memory(0, term.capacity(), 0);
    }

    /// Drain client commands (releases, destination changes).
    pub fn poll_commands(&self) -> Vec<ClientCommand> {
        self.conductor.poll_commands()
    }
}
