//! Run identifiers and timestamps.
//!
//! Both are injected into the orchestrator so tests can pin them.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::domain::RunId;

/// Source of wall-clock timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant (used for deterministic tests).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of unique run identifiers.
pub trait RunIdGenerator: Send + Sync {
    fn next_id(&self) -> RunId;
}

/// UUIDv7 identifiers: unique and sortable by creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRunIds;

impl RunIdGenerator for UuidRunIds {
    fn next_id(&self) -> RunId {
        RunId(format!("run-{}", uuid::Uuid::now_v7()))
    }
}

/// Sequential identifiers `<prefix>-000001`, `<prefix>-000002`, ...
#[derive(Debug)]
pub struct SequentialRunIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialRunIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl RunIdGenerator for SequentialRunIds {
    fn next_id(&self) -> RunId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        RunId(format!("{}-{:06}", self.prefix, n))
    }
}
