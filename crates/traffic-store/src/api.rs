use std::collections::VecDeque;

use apikey_core_types::{RateUnit, TrafficEvent, TrafficScope};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::errors::TrafficError;

pub type TrafficStoreResult<T> = Result<T, TrafficError>;

/// Read and write interface of the traffic aggregation store.
#[async_trait]
pub trait TrafficStore: Send + Sync {
    /// Events recorded for `scope`, restricted to those at or after `since`
    /// when given.
    async fn count(
        &self,
        scope: &TrafficScope,
        since: Option<DateTime<Utc>>,
    ) -> TrafficStoreResult<u64>;

    async fn record(&self, event: TrafficEvent) -> TrafficStoreResult<()>;
}

/// Process-local store.
///
/// Each scope keeps a running total for quota checks and only the timestamps
/// still inside `retention` for rate checks, so memory stays bounded by the
/// request rate rather than by uptime.
pub struct InMemoryTrafficStore {
    scopes: DashMap<TrafficScope, ScopeTraffic>,
    retention: Duration,
}

#[derive(Debug, Default)]
struct ScopeTraffic {
    total: u64,
    recent: VecDeque<DateTime<Utc>>,
}

impl ScopeTraffic {
    fn record(&mut self, time: DateTime<Utc>, horizon: DateTime<Utc>) {
        self.total += 1;
        if time >= horizon {
            let at = self.recent.partition_point(|held| *held <= time);
            self.recent.insert(at, time);
        }
        let expired = self.recent.partition_point(|held| *held < horizon);
        self.recent.drain(..expired);
    }

    fn since(&self, since: DateTime<Utc>) -> u64 {
        let older = self.recent.partition_point(|held| *held < since);
        (self.recent.len() - older) as u64
    }
}

impl Default for InMemoryTrafficStore {
    fn default() -> Self {
        Self::with_retention(longest_rate_window())
    }
}

fn longest_rate_window() -> Duration {
    Duration::seconds(RateUnit::Hour.window().as_secs() as i64)
}

impl InMemoryTrafficStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Windowed counts are only exact for `since` no older than `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            scopes: DashMap::new(),
            retention,
        }
    }

    /// Total events recorded across all scopes.
    pub fn len(&self) -> u64 {
        self.scopes.iter().map(|entry| entry.value().total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamps currently held for rate windows, across all scopes.
    pub fn retained(&self) -> usize {
        self.scopes.iter().map(|entry| entry.value().recent.len()).sum()
    }
}

#[async_trait]
impl TrafficStore for InMemoryTrafficStore {
    async fn count(
        &self,
        scope: &TrafficScope,
        since: Option<DateTime<Utc>>,
    ) -> TrafficStoreResult<u64> {
        let Some(traffic) = self.scopes.get(scope) else {
            return Ok(0);
        };
        Ok(match since {
            Some(since) => traffic.since(since),
            None => traffic.total,
        })
    }

    async fn record(&self, event: TrafficEvent) -> TrafficStoreResult<()> {
        let horizon = Utc::now() - self.retention;
        self.scopes
            .entry(event.scope)
            .or_default()
            .record(event.time, horizon);
        Ok(())
    }
}
