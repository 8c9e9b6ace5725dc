//! Heartbeat scheduler: evaluates every registered ticker once per heartbeat

use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{CronConfig, StaleBoundary};
use crate::dispatcher::{EventDispatcher, Listener};
use crate::error::CronError;
use crate::metrics::{CronMetrics, MetricsCollector};
use crate::period::Step;
use crate::registry::{window_start, TickerRegistry, TickerSpec, TickerState};
use crate::time::{SystemTimeSource, TimeSource, Timestamp};

/// Outcome of one heartbeat pass
#[derive(Debug, Default)]
pub struct PassReport {
    /// Time the pass was evaluated at
    pub now: Timestamp,
    /// The pass overlapped a running pass and did nothing
    pub skipped: bool,
    /// Tickers emitted, in evaluation order
    pub emitted: Vec<String>,
    /// Tickers removed after reaching their emit limit
    pub removed: Vec<String>,
    /// Stale boundaries passed over without emitting
    pub stale_skipped: u64,
    /// Per-ticker failures; none of them stopped the pass
    pub failures: Vec<TickerFailure>,
}

/// A failure confined to one ticker during a pass
#[derive(Debug)]
pub struct TickerFailure {
    pub id: String,
    pub error: CronError,
}

impl PassReport {
    fn new(now: Timestamp) -> Self {
        Self { now, ..Default::default() }
    }

    fn skipped(now: Timestamp) -> Self {
        Self { now, skipped: true, ..Default::default() }
    }
}

/// Registry and listeners, always locked together
#[derive(Debug)]
struct CronState {
    registry: TickerRegistry,
    dispatcher: EventDispatcher,
}

impl CronState {
    fn remove_ticker(&mut self, id: &str) -> Option<TickerState> {
        let removed = self.registry.unregister(id)?;
        if let Some(callback) = &removed.spec.callback {
            self.dispatcher.unsubscribe(id, callback);
        }
        Some(removed)
    }
}

struct Heartbeat {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    heartbeat_interval_ms: u64,
    stale_boundary: StaleBoundary,
    state: Mutex<CronState>,
    // Held for the duration of a pass; a pass that cannot take it is skipped.
    pass_lock: Mutex<()>,
    heartbeat: Mutex<Option<Heartbeat>>,
    time: Arc<dyn TimeSource>,
    metrics: MetricsCollector,
}

/// Heartbeat-driven ticker scheduler.
///
/// Cloning yields another handle to the same scheduler, so listeners can hold one and
/// register or unregister tickers while a pass is running.
#[derive(Clone)]
pub struct CronScheduler {
    inner: Arc<Inner>,
}

impl CronScheduler {
    /// Create a scheduler and register the configured tickers.
    ///
    /// Any invalid initial ticker fails the whole construction.
    pub fn new(config: CronConfig, time: Arc<dyn TimeSource>) -> Result<Self, CronError> {
        if config.heartbeat_interval_ms == 0 {
            return Err(CronError::ZeroHeartbeat);
        }
        if i64::try_from(config.heartbeat_interval_ms).is_err() {
            return Err(CronError::HeartbeatOutOfRange {
                heartbeat_ms: config.heartbeat_interval_ms,
            });
        }

        let scheduler = Self {
            inner: Arc::new(Inner {
                heartbeat_interval_ms: config.heartbeat_interval_ms,
                stale_boundary: config.stale_boundary,
                state: Mutex::new(CronState {
                    registry: TickerRegistry::new(config.heartbeat_interval_ms),
                    dispatcher: EventDispatcher::new(),
                }),
                pass_lock: Mutex::new(()),
                heartbeat: Mutex::new(None),
                time,
                metrics: MetricsCollector::new(),
            }),
        };

        for ticker in config.tickers {
            scheduler.register(ticker)?;
        }

        tracing::info!(
            "Created cron scheduler with {}ms heartbeat and {} tickers",
            config.heartbeat_interval_ms,
            scheduler.len()
        );

        Ok(scheduler)
    }

    /// Create a scheduler on the host wall clock
    pub fn with_system_clock(config: CronConfig) -> Result<Self, CronError> {
        Self::new(config, Arc::new(SystemTimeSource))
    }

    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.inner.heartbeat_interval_ms
    }

    /// Register a ticker, replacing any ticker with the same id
    pub fn register(&self, spec: TickerSpec) -> Result<(), CronError> {
        let now = self.inner.time.now_ms();
        let id = spec.id.clone();
        let callback = spec.callback.clone();

        let mut state = self.inner.state.lock();
        let replaced = state.registry.register(spec, now)?;

        if let Some(previous) = replaced.as_ref().and_then(|r| r.spec.callback.as_ref()) {
            state.dispatcher.unsubscribe(&id, previous);
        }
        if let Some(callback) = callback {
            state.dispatcher.subscribe(&id, callback);
        }
        self.inner.metrics.update_active_tickers(state.registry.len());

        if let Some(entry) = state.registry.get(&id) {
            tracing::info!(
                ticker = %id,
                next_emit_time = entry.next_emit_time,
                replaced = replaced.is_some(),
                "Registered ticker"
            );
        }

        Ok(())
    }

    /// Remove a ticker and its registration callback; unknown ids are ignored
    pub fn unregister(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let removed = state.remove_ticker(id).is_some();
        self.inner.metrics.update_active_tickers(state.registry.len());

        if removed {
            tracing::info!(ticker = %id, "Unregistered ticker");
        }
        removed
    }

    /// Add a listener to a ticker's event; it stays subscribed until removed explicitly
    pub fn subscribe(&self, id: &str, listener: Listener) {
        self.inner.state.lock().dispatcher.subscribe(id, listener);
    }

    pub fn unsubscribe(&self, id: &str, listener: &Listener) -> bool {
        self.inner.state.lock().dispatcher.unsubscribe(id, listener)
    }

    /// Copy of a ticker's current state
    pub fn ticker(&self, id: &str) -> Option<TickerState> {
        self.inner.state.lock().registry.get(id).cloned()
    }

    /// Registered ticker ids in registration order
    pub fn ticker_ids(&self) -> Vec<String> {
        self.inner.state.lock().registry.ids()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CronMetrics {
        self.inner.metrics.get_metrics()
    }

    /// Start the heartbeat timer on the current tokio runtime
    pub fn start(&self) -> Result<(), CronError> {
        let mut heartbeat = self.inner.heartbeat.lock();
        if heartbeat.is_some() {
            return Err(CronError::AlreadyRunning);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CronError::Config(format!("No tokio runtime available: {e}")))?;

        let heartbeat_ms = self.inner.heartbeat_interval_ms;
        let period = std::time::Duration::from_millis(heartbeat_ms);
        let first_fire = tokio::time::Instant::now()
            .checked_add(period)
            .ok_or(CronError::HeartbeatOutOfRange { heartbeat_ms })?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(run_heartbeat(
            Arc::downgrade(&self.inner),
            first_fire,
            period,
            stop_rx,
        ));
        *heartbeat = Some(Heartbeat { stop_tx, handle });

        tracing::info!("CronService: ready");
        Ok(())
    }

    /// Cancel the heartbeat timer; returns false if it was not running
    pub fn stop(&self) -> bool {
        let Some(heartbeat) = self.inner.heartbeat.lock().take() else {
            return false;
        };

        // Passes run without awaiting, so a pass in progress completes before the abort lands.
        let _ = heartbeat.stop_tx.send(true);
        heartbeat.handle.abort();

        tracing::info!("Cron scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.heartbeat.lock().is_some()
    }

    /// Evaluate a heartbeat pass at the current time
    pub fn tick(&self) -> PassReport {
        let now = self.inner.time.now_ms();
        self.evaluate(now)
    }

    /// Evaluate every ticker against `now`.
    ///
    /// Entries are snapshotted when the pass starts. A ticker unregistered or replaced by a
    /// listener earlier in the same pass is not evaluated against its old state.
    pub fn evaluate(&self, now: Timestamp) -> PassReport {
        let Some(_pass) = self.inner.pass_lock.try_lock() else {
            tracing::warn!("Heartbeat pass at {} skipped, previous pass still running", now);
            self.inner.metrics.record_skipped_pass();
            return PassReport::skipped(now);
        };

        let pass_start = Instant::now();
        let snapshot = self.inner.state.lock().registry.snapshot();
        let mut report = PassReport::new(now);

        tracing::debug!("Cron pass at {} over {} tickers", now, snapshot.len());

        for entry in &snapshot {
            if let Err(error) = self.evaluate_ticker(entry, now, &mut report) {
                self.record_failure(&mut report, entry.id(), error);
            }
        }

        self.inner.metrics.record_pass(pass_start.elapsed());
        report
    }

    fn evaluate_ticker(
        &self,
        entry: &TickerState,
        now: Timestamp,
        report: &mut PassReport,
    ) -> Result<(), CronError> {
        let id = entry.id();
        let heartbeat_ms = self.inner.heartbeat_interval_ms;

        let (boundary, listeners) = {
            let mut state = self.inner.state.lock();
            let Some(live) = state
                .registry
                .get_mut(id)
                .filter(|live| live.generation() == entry.generation())
            else {
                return Ok(());
            };

            tracing::trace!(
                ticker = %id,
                emits = live.emit_count,
                limit = ?live.spec.emit_limit,
                next_emit_time = live.next_emit_time,
                "Ticker eval"
            );

            if self.inner.stale_boundary == StaleBoundary::Realign
                && live.is_stale(now, heartbeat_ms)
                && live.next_emit_time != live.previous_emit_time
            {
                let skipped = realign(live, now, heartbeat_ms)?;
                report.stale_skipped += skipped;
                self.inner.metrics.record_stale_skipped(skipped);
                tracing::debug!(
                    ticker = %id,
                    skipped,
                    next_emit_time = live.next_emit_time,
                    "Skipped stale boundaries"
                );
            }

            if !live.is_due(now, heartbeat_ms) {
                return Ok(());
            }

            if live.limit_reached() {
                tracing::info!(
                    ticker = %id,
                    emits = live.emit_count,
                    "Limit reached, removing ticker"
                );
                state.remove_ticker(id);
                self.inner.metrics.record_exhausted();
                self.inner.metrics.update_active_tickers(state.registry.len());
                report.removed.push(id.to_string());
                return Ok(());
            }

            let boundary = live.next_emit_time;
            let listeners = state.dispatcher.listeners(id);
            (boundary, listeners)
        };

        // Listeners run without the state lock so they may call back into the scheduler.
        tracing::debug!(ticker = %id, boundary, "Tick");
        let dispatched = EventDispatcher::invoke(id, &listeners, &[]);
        self.inner.metrics.record_emission();
        report.emitted.push(id.to_string());

        let scheduled = {
            let mut state = self.inner.state.lock();
            match state.registry.get_mut(id).filter(|live| {
                live.generation() == entry.generation() && live.next_emit_time == boundary
            }) {
                Some(live) => live.record_emission(),
                None => Ok(()),
            }
        };

        if let Err(error) = dispatched {
            self.record_failure(report, id, error.into());
        }
        scheduled
    }

    fn record_failure(&self, report: &mut PassReport, id: &str, error: CronError) {
        tracing::error!(ticker = %id, "Ticker evaluation failed: {}", error);
        match error {
            CronError::Dispatch(_) => self.inner.metrics.record_dispatch_failure(),
            _ => self.inner.metrics.record_schedule_failure(),
        }
        report.failures.push(TickerFailure { id: id.to_string(), error });
    }
}

/// Move a stale boundary forward until it is no longer behind the catch-up window
fn realign(state: &mut TickerState, now: Timestamp, heartbeat_ms: u64) -> Result<u64, CronError> {
    let window_start_ms = window_start(now, heartbeat_ms);

    if let Step::Fixed(step_ms) = state.step {
        let step_ms = step_ms as i64;
        let steps = (window_start_ms - state.next_emit_time) / step_ms + 1;
        state.next_emit_time = steps
            .checked_mul(step_ms)
            .and_then(|offset| state.next_emit_time.checked_add(offset))
            .ok_or(CronError::TimestampOutOfRange { timestamp: state.next_emit_time })?;
        return Ok(steps as u64);
    }

    let mut skipped = 0;
    while state.is_stale(now, heartbeat_ms) {
        state.next_emit_time = state.following_emit_time()?;
        skipped += 1;
    }
    Ok(skipped)
}

async fn run_heartbeat(
    inner: Weak<Inner>,
    first_fire: tokio::time::Instant,
    period: std::time::Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval_at(first_fire, period);
    // A pass that overruns the heartbeat drops the overlapping firing instead of queueing it.
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let report = CronScheduler { inner }.tick();
                if !report.emitted.is_empty() || !report.failures.is_empty() {
                    tracing::debug!(
                        emitted = report.emitted.len(),
                        removed = report.removed.len(),
                        failures = report.failures.len(),
                        "Heartbeat pass complete"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("heartbeat_interval_ms", &self.inner.heartbeat_interval_ms)
            .field("stale_boundary", &self.inner.stale_boundary)
            .finish_non_exhaustive()
    }
}
