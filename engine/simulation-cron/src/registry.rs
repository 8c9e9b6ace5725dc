//! Ticker registry: owns every registered ticker's schedule state

use serde::{Deserialize, Serialize};

use crate::dispatcher::Listener;
use crate::error::CronError;
use crate::period::{self, Step};
use crate::time::Timestamp;

/// Caller-supplied ticker definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickerSpec {
    /// Unique key, also the event name listeners subscribe to
    pub id: String,

    /// Number of units per step (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_count: Option<i64>,

    /// One of `ms`, `s`, `m`, `h`, `d`, `w`, `M`, `y` (defaults to `s`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_unit: Option<String>,

    /// Emissions after which the ticker removes itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emit_limit: Option<u64>,

    /// Listener subscribed to the ticker's event on registration
    #[serde(skip)]
    pub callback: Option<Listener>,
}

impl TickerSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    pub fn every(mut self, count: i64, unit: &str) -> Self {
        self.period_count = Some(count);
        self.period_unit = Some(unit.to_string());
        self
    }

    pub fn limit(mut self, emit_limit: u64) -> Self {
        self.emit_limit = Some(emit_limit);
        self
    }

    pub fn on_tick(mut self, callback: Listener) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Schedule state of one registered ticker
#[derive(Debug, Clone)]
pub struct TickerState {
    pub spec: TickerSpec,
    pub step: Step,
    pub start_time: Timestamp,
    pub next_emit_time: Timestamp,
    /// Last boundary evaluated, 0 before the first emission
    pub previous_emit_time: Timestamp,
    pub emit_count: u64,
    generation: u64,
}

impl TickerState {
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Registration sequence number; changes when the id is registered again
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn limit_reached(&self) -> bool {
        self.spec.emit_limit.is_some_and(|limit| self.emit_count >= limit)
    }

    /// Whether the next boundary falls in `(now - heartbeat, now]` and has not fired yet
    pub fn is_due(&self, now: Timestamp, heartbeat_interval_ms: u64) -> bool {
        let window_start = window_start(now, heartbeat_interval_ms);
        self.next_emit_time > window_start
            && self.next_emit_time <= now
            && self.next_emit_time != self.previous_emit_time
    }

    /// Whether the next boundary is older than the catch-up window
    pub fn is_stale(&self, now: Timestamp, heartbeat_interval_ms: u64) -> bool {
        self.next_emit_time <= window_start(now, heartbeat_interval_ms)
    }

    /// Boundary that follows the current `next_emit_time`
    pub fn following_emit_time(&self) -> Result<Timestamp, CronError> {
        period::next_emit_time(self.step, self.next_emit_time)
    }

    /// Record an emission at the current boundary and schedule the next one.
    ///
    /// The boundary is consumed even when the next one cannot be computed, so the entry is
    /// no longer due and the failure surfaces once.
    pub fn record_emission(&mut self) -> Result<(), CronError> {
        self.previous_emit_time = self.next_emit_time;
        self.emit_count += 1;
        self.next_emit_time = self.following_emit_time()?;
        Ok(())
    }
}

/// Start of the catch-up window `(now - heartbeat, now]`
pub(crate) fn window_start(now: Timestamp, heartbeat_interval_ms: u64) -> Timestamp {
    now.saturating_sub(i64::try_from(heartbeat_interval_ms).unwrap_or(i64::MAX))
}

/// Registered tickers in registration order
#[derive(Debug)]
pub struct TickerRegistry {
    heartbeat_interval_ms: u64,
    entries: Vec<TickerState>,
    next_generation: u64,
}

impl TickerRegistry {
    pub fn new(heartbeat_interval_ms: u64) -> Self {
        Self { heartbeat_interval_ms, entries: Vec::new(), next_generation: 1 }
    }

    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    /// Validate and store a ticker, returning the entry it replaced.
    ///
    /// The first boundary is one step after `now`. A ticker registered under an existing id
    /// keeps that id's position in the iteration order.
    pub fn register(
        &mut self,
        spec: TickerSpec,
        now: Timestamp,
    ) -> Result<Option<TickerState>, CronError> {
        let step = period::validate_period(
            &spec.id,
            spec.period_count,
            spec.period_unit.as_deref(),
            self.heartbeat_interval_ms,
        )?;

        if matches!(step, Step::Calendar(_)) && spec.period_count.is_some_and(|count| count > 1) {
            tracing::warn!(
                "Ticker {} period count {} ignored, calendar periods advance one unit per boundary",
                spec.id,
                spec.period_count.unwrap_or_default()
            );
        }

        let next_emit_time = period::next_emit_time(step, now)?;
        let generation = self.next_generation;
        self.next_generation += 1;

        let state = TickerState {
            spec,
            step,
            start_time: now,
            next_emit_time,
            previous_emit_time: 0,
            emit_count: 0,
            generation,
        };

        match self.entries.iter_mut().find(|entry| entry.id() == state.id()) {
            Some(existing) => Ok(Some(std::mem::replace(existing, state))),
            None => {
                self.entries.push(state);
                Ok(None)
            }
        }
    }

    /// Remove a ticker; absent ids are ignored
    pub fn unregister(&mut self, id: &str) -> Option<TickerState> {
        let index = self.entries.iter().position(|entry| entry.id() == id)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&TickerState> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TickerState> {
        self.entries.iter_mut().find(|entry| entry.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &TickerState)> + '_ {
        self.entries.iter().map(|entry| (entry.id(), entry))
    }

    /// Owned copy of every entry, unaffected by later registry changes
    pub fn snapshot(&self) -> Vec<TickerState> {
        self.entries.clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.spec.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
